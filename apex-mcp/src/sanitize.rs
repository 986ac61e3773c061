//! Error message sanitization at the transport boundary.
//!
//! Every error leaving the server is a single line of at most 200 chars
//! with absolute paths reduced to file names and credential-looking values
//! redacted.

use regex::Regex;
use std::sync::LazyLock;

/// Maximum length of an outbound error message.
const MESSAGE_LIMIT: usize = 200;

/// `key=value` credential assignments.
static SECRET_ASSIGN_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    let re =
        Regex::new(r"(?i)\b(token|secret|password|passwd|api[_-]?key|authorization)\s*[=:]\s*\S+")
            .unwrap();
    re
});

/// Bearer-style and provider-prefixed credentials.
static SECRET_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    let re = Regex::new(r"\b(Bearer\s+\S+|sk-[A-Za-z0-9_-]{8,}|ghp_[A-Za-z0-9]{8,})").unwrap();
    re
});

/// Absolute filesystem paths.
static ABSOLUTE_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    let re = Regex::new(r"(?:^|[\s('\[=])(/[\w.@-]+(?:/[\w.@-]+)+)").unwrap();
    re
});

/// Sanitize an error message for the wire.
#[must_use]
pub fn sanitize_message(message: &str) -> String {
    // Collapse to a single line first.
    let single_line = message
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let redacted = SECRET_ASSIGN_RE.replace_all(&single_line, "[redacted]");
    let redacted = SECRET_VALUE_RE.replace_all(&redacted, "[redacted]");

    // Reduce absolute paths to their final component.
    let mut cleaned = String::with_capacity(redacted.len());
    let mut cursor = 0;
    for captures in ABSOLUTE_PATH_RE.captures_iter(&redacted) {
        if let Some(path) = captures.get(1) {
            cleaned.push_str(&redacted[cursor..path.start()]);
            let basename = path.as_str().rsplit('/').next().unwrap_or("");
            cleaned.push_str(basename);
            cursor = path.end();
        }
    }
    cleaned.push_str(&redacted[cursor..]);

    if cleaned.chars().count() > MESSAGE_LIMIT {
        let kept: String = cleaned.chars().take(MESSAGE_LIMIT - 3).collect();
        format!("{kept}...")
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiline_collapsed() {
        let sanitized = sanitize_message("first line\n  stack frame 1\n  stack frame 2");
        assert!(!sanitized.contains('\n'));
    }

    #[test]
    fn test_secrets_redacted() {
        let sanitized = sanitize_message("auth failed: token=abc123secret for user");
        assert!(!sanitized.contains("abc123secret"));
        assert!(sanitized.contains("[redacted]"));

        let bearer = sanitize_message("header was Bearer eyJhbGciOiJIUzI1NiJ9");
        assert!(!bearer.contains("eyJhbGci"));
    }

    #[test]
    fn test_absolute_paths_reduced() {
        let sanitized = sanitize_message("cannot open /home/dev/secrets/apex.db today");
        assert!(!sanitized.contains("/home/dev"));
        assert!(sanitized.contains("apex.db"));
    }

    #[test]
    fn test_length_capped() {
        let long = "x".repeat(500);
        let sanitized = sanitize_message(&long);
        assert!(sanitized.chars().count() <= 200);
        assert!(sanitized.ends_with("..."));
    }
}
