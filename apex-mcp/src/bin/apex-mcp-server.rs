//! The APEX MCP server binary: stdio JSON-RPC loop.
//!
//! Logging goes to stderr so stdout stays a clean protocol channel. A
//! clean stdin close exits 0.

use std::io::{self, BufReader, Write};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use apex_mcp::config::ServerConfig;
use apex_mcp::jsonrpc::{FrameReader, JsonRpcRequest, JsonRpcResponse, write_frame};
use apex_mcp::server::ApexServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let config = ServerConfig::from_env();
    info!(db = %config.database_path, "starting apex-mcp-server");
    let server = ApexServer::start(config).await?;

    let stdin = io::stdin();
    let mut reader = FrameReader::new(BufReader::new(stdin.lock()));
    let stdout = io::stdout();
    let mut writer = stdout.lock();

    loop {
        let Some(frame) = reader.next_frame()? else {
            info!("stdin closed, shutting down");
            for (tool, metrics) in server.metrics_snapshot() {
                info!(
                    tool,
                    requests = metrics.requests,
                    errors = metrics.errors,
                    avg_latency_ms = metrics.avg_latency_ms(),
                    "tool metrics"
                );
            }
            break;
        };

        let response = match serde_json::from_str::<JsonRpcRequest>(&frame.body) {
            Ok(request) => server.handle_request(request).await,
            Err(e) => Some(JsonRpcResponse::failure(
                None,
                -32700,
                format!("Parse error: {e}"),
            )),
        };

        let Some(response) = response else {
            continue; // notification
        };
        let body = serde_json::to_string(&response)?;
        write_frame(&mut writer, frame.framing, &body)?;
    }

    if let Err(e) = writer.flush() {
        error!("final flush failed: {e}");
    }
    Ok(())
}
