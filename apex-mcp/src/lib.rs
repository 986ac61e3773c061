#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

//! # APEX MCP
//!
//! MCP tool server exposing the APEX pattern-knowledge service over stdio.
//!
//! This crate provides:
//! - Line-delimited JSON-RPC framing (with LSP Content-Length fallback)
//! - The tool catalog and per-tool request handlers
//! - The reflection pipeline
//! - Response caching, per-tool rate limiting, and request metrics
//!
//! The server trusts its local caller; there is no authentication layer.

pub mod cache;
pub mod config;
pub mod jsonrpc;
pub mod metrics;
pub mod rate_limiter;
pub mod reflection;
pub mod sanitize;
pub mod server;

pub use cache::ResponseCache;
pub use config::ServerConfig;
pub use metrics::MetricsCollector;
pub use rate_limiter::RateLimiter;
pub use server::ApexServer;
