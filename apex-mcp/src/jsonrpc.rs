//! JSON-RPC message framing over stdio.
//!
//! The wire contract is line-delimited JSON, but LSP-style
//! `Content-Length` blocks are decoded too so editor-embedded clients can
//! connect unchanged. Each response is encoded with whatever framing its
//! request arrived in.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, BufRead, Read, Write};

/// JSON-RPC request structure
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Request id; absent for notifications
    pub id: Option<Value>,
    /// Method name
    pub method: String,
    /// Method parameters
    pub params: Option<Value>,
}

/// JSON-RPC response structure
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// A successful response.
    #[must_use]
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// An error response.
    #[must_use]
    pub fn failure(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// JSON-RPC error structure
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// How a message arrived on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One JSON object per line
    Line,
    /// LSP-style header block announcing the payload length
    ContentLength,
}

/// One decoded inbound message.
#[derive(Debug)]
pub struct Frame {
    /// Raw JSON text of the message
    pub body: String,
    /// Framing to mirror on the response
    pub framing: Framing,
}

/// What a single inbound line turned out to be.
enum LineKind {
    /// A bare JSON object, complete on this line
    Json(String),
    /// A `Content-Length` header opening an LSP-style block
    Length(usize),
    /// Stray output on the channel; dropped
    Noise,
}

fn classify(line: &str) -> LineKind {
    let line = line.trim();
    if line.starts_with('{') {
        return LineKind::Json(line.to_string());
    }
    if let Some((name, value)) = line.split_once(':') {
        if name.trim().eq_ignore_ascii_case("content-length") {
            if let Ok(length) = value.trim().parse::<usize>() {
                return LineKind::Length(length);
            }
        }
    }
    LineKind::Noise
}

/// Decoder for inbound frames.
///
/// Both framings may be interleaved on one stream; noise lines between
/// messages are skipped rather than killing the connection.
pub struct FrameReader<R> {
    input: R,
}

impl<R: BufRead> FrameReader<R> {
    /// Wrap a buffered input stream.
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Decode the next frame. `Ok(None)` means clean EOF.
    pub fn next_frame(&mut self) -> io::Result<Option<Frame>> {
        loop {
            let Some(line) = self.take_line()? else {
                return Ok(None);
            };
            match classify(&line) {
                LineKind::Json(body) => {
                    return Ok(Some(Frame {
                        body,
                        framing: Framing::Line,
                    }));
                }
                LineKind::Length(length) => {
                    if let Some(body) = self.finish_length_block(length)? {
                        return Ok(Some(Frame {
                            body,
                            framing: Framing::ContentLength,
                        }));
                    }
                    // Empty payload: keep decoding.
                }
                LineKind::Noise => {}
            }
        }
    }

    fn take_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        match self.input.read_line(&mut line)? {
            0 => Ok(None),
            _ => Ok(Some(line)),
        }
    }

    /// Consume the remaining headers of a length-framed block, then its
    /// payload. A repeated `Content-Length` header overrides the first;
    /// the block ends at the blank separator line.
    fn finish_length_block(&mut self, announced: usize) -> io::Result<Option<String>> {
        let mut length = announced;
        while let Some(header) = self.take_line()? {
            if header.trim().is_empty() {
                break;
            }
            if let LineKind::Length(updated) = classify(&header) {
                length = updated;
            }
        }
        if length == 0 {
            return Ok(None);
        }
        let mut payload = Vec::with_capacity(length);
        self.input
            .by_ref()
            .take(length as u64)
            .read_to_end(&mut payload)?;
        Ok(Some(String::from_utf8_lossy(&payload).into_owned()))
    }
}

/// Encode one outbound frame with the given framing.
pub fn write_frame<W: Write>(output: &mut W, framing: Framing, body: &str) -> io::Result<()> {
    if framing == Framing::ContentLength {
        write!(output, "Content-Length: {}\r\n\r\n", body.len())?;
    }
    output.write_all(body.as_bytes())?;
    output.write_all(b"\n")?;
    output.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    fn frames(input: &str) -> Vec<Frame> {
        let mut reader = FrameReader::new(BufReader::new(input.as_bytes()));
        let mut out = Vec::new();
        while let Some(frame) = reader.next_frame().unwrap() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn test_mixed_framings_on_one_stream() {
        let body = r#"{"jsonrpc":"2.0","method":"b"}"#;
        let input = format!(
            "{{\"jsonrpc\":\"2.0\",\"method\":\"a\"}}\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let decoded = frames(&input);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].framing, Framing::Line);
        assert_eq!(decoded[1].framing, Framing::ContentLength);
        assert!(decoded[1].body.contains("\"b\""));
    }

    #[test]
    fn test_header_case_and_extra_headers() {
        let body = r#"{"method":"x"}"#;
        let input = format!(
            "content-length: {}\r\nContent-Type: application/json\r\n\r\n{}",
            body.len(),
            body
        );
        let decoded = frames(&input);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].body, body);
    }

    #[test]
    fn test_repeated_length_header_overrides() {
        let body = r#"{"method":"x"}"#;
        let input = format!(
            "Content-Length: 4\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let decoded = frames(&input);
        assert_eq!(decoded[0].body, body);
    }

    #[test]
    fn test_noise_and_zero_length_blocks_skipped() {
        let input = "warning: something logged here\nContent-Length: 0\r\n\r\n{\"method\":\"x\"}\n";
        let decoded = frames(input);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].framing, Framing::Line);
    }

    #[test]
    fn test_empty_stream_is_clean_eof() {
        assert!(frames("").is_empty());
    }

    #[test]
    fn test_write_frame_mirrors_framing() {
        let mut line_out = Vec::new();
        write_frame(&mut line_out, Framing::Line, "{}").unwrap();
        assert_eq!(line_out, b"{}\n");

        let mut length_out = Vec::new();
        write_frame(&mut length_out, Framing::ContentLength, "{}").unwrap();
        let text = String::from_utf8(length_out).unwrap();
        assert!(text.starts_with("Content-Length: 2\r\n\r\n"));
        assert!(text.ends_with("{}\n"));
    }
}
