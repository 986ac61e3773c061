//! The APEX MCP server: tool dispatch, response envelope, and the MCP
//! protocol handlers.

use parking_lot::RwLock;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

use apex_core::error::{Error, ErrorCode, Result};
use apex_core::ranking::Ranker;
use apex_core::trust::TrustModel;

use crate::cache::ResponseCache;
use crate::config::ServerConfig;
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::metrics::MetricsCollector;
use crate::rate_limiter::RateLimiter;
use crate::sanitize::sanitize_message;
use apex_storage::ApexStorage;

pub mod tool_definitions;
pub mod tools;

use tool_definitions::{CACHED_TOOLS, WRITE_TOOLS, create_tools};

/// MCP protocol version advertised on initialize.
const PROTOCOL_VERSION: &str = "2025-06-18";

/// TTL for the per-task similar-tasks cache, in seconds.
const SIMILAR_CACHE_TTL_SECS: u64 = 300;

/// The APEX MCP server instance.
///
/// Owns every shared resource (storage handle, cache, rate limiter,
/// metrics); nothing lives in process globals.
pub struct ApexServer {
    pub(crate) storage: Arc<ApexStorage>,
    pub(crate) config: ServerConfig,
    pub(crate) cache: ResponseCache,
    pub(crate) rate_limiter: RateLimiter,
    pub(crate) metrics: MetricsCollector,
    pub(crate) trust: TrustModel,
    pub(crate) ranker: Ranker,
    /// `find_similar` results cached per task id
    pub(crate) similar_cache: RwLock<HashMap<String, (Instant, Value)>>,
}

impl ApexServer {
    /// Create a server over an opened storage backend.
    #[must_use]
    pub fn new(storage: Arc<ApexStorage>, config: ServerConfig) -> Self {
        let cache = ResponseCache::new(config.cache_max_entries, config.cache_ttl);
        let rate_limiter = RateLimiter::new(config.rate_limit_max, config.rate_limit_window);
        Self {
            storage,
            config,
            cache,
            rate_limiter,
            metrics: MetricsCollector::default(),
            trust: TrustModel::default(),
            ranker: Ranker::default(),
            similar_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Open storage from config and initialize the schema.
    pub async fn start(config: ServerConfig) -> Result<Self> {
        let storage = ApexStorage::open(&config.database_path).await?;
        storage.initialize_schema().await?;
        Ok(Self::new(Arc::new(storage), config))
    }

    /// Execute one tool call and produce the response body.
    ///
    /// The body always carries `request_id` and `latency_ms`; cacheable
    /// tools additionally carry `cache_hit`. Errors come back as
    /// `{ error: { code, message }, ... }` with a sanitized single-line
    /// message.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Value {
        let request_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let cacheable = CACHED_TOOLS.contains(&name);

        // Rate limit before anything else.
        let decision = self.rate_limiter.check(name);
        if !decision.allowed {
            let latency_ms = started.elapsed().as_millis() as u64;
            self.metrics.record(name, latency_ms, true, false);
            return error_body(
                &request_id,
                latency_ms,
                ErrorCode::RateLimited,
                &format!(
                    "rate limit exceeded for {name}: {} requests per window",
                    decision.limit
                ),
            );
        }

        // Cache probe: reads only, never writes or reflections.
        if WRITE_TOOLS.contains(&name) {
            debug!(tool = name, "write tool, response cache bypassed");
        }
        let cache_key = cacheable.then(|| ResponseCache::key(name, &arguments));
        if let Some(key) = cache_key.as_deref() {
            if let Some(mut cached) = self.cache.get(key) {
                let latency_ms = started.elapsed().as_millis() as u64;
                if let Some(body) = cached.as_object_mut() {
                    body.insert("request_id".to_string(), json!(request_id));
                    body.insert("latency_ms".to_string(), json!(latency_ms));
                    body.insert("cache_hit".to_string(), json!(true));
                }
                self.metrics.record(name, latency_ms, false, true);
                return cached;
            }
        }

        let result = tools::dispatch(self, name, arguments).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(mut body) => {
                if let Some(key) = cache_key {
                    self.cache.put(key, body.clone());
                }
                if let Some(object) = body.as_object_mut() {
                    object.insert("request_id".to_string(), json!(request_id));
                    object.insert("latency_ms".to_string(), json!(latency_ms));
                    if cacheable {
                        object.insert("cache_hit".to_string(), json!(false));
                    }
                }
                self.metrics.record(name, latency_ms, false, false);
                body
            }
            Err(err) => {
                debug!(tool = name, error = %err, "tool call failed");
                self.metrics.record(name, latency_ms, true, false);
                let mut body = error_body(
                    &request_id,
                    latency_ms,
                    err.code(),
                    &sanitize_message(&err.to_string()),
                );
                if let Some(issues) = err.issues() {
                    if let Some(object) = body.as_object_mut() {
                        if let Ok(issues) = serde_json::to_value(issues) {
                            if let Some(error_object) =
                                object.get_mut("error").and_then(Value::as_object_mut)
                            {
                                error_object.insert("issues".to_string(), issues);
                            }
                        }
                    }
                }
                body
            }
        }
    }

    /// Handle one JSON-RPC request. `None` means a notification with no
    /// response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        match request.method.as_str() {
            "initialize" => {
                request.id.as_ref()?;
                info!("Handling initialize request");
                Some(JsonRpcResponse::success(
                    request.id,
                    json!({
                        "protocolVersion": PROTOCOL_VERSION,
                        "capabilities": { "tools": { "listChanged": false } },
                        "serverInfo": {
                            "name": "apex-mcp-server",
                            "version": env!("CARGO_PKG_VERSION"),
                        },
                    }),
                ))
            }
            "tools/list" => {
                request.id.as_ref()?;
                match serde_json::to_value(create_tools()) {
                    Ok(tools) => Some(JsonRpcResponse::success(
                        request.id,
                        json!({ "tools": tools }),
                    )),
                    Err(e) => {
                        error!("Failed to serialize tool list: {e}");
                        Some(JsonRpcResponse::failure(request.id, -32603, "Internal error"))
                    }
                }
            }
            "tools/call" => {
                request.id.as_ref()?;
                let params = request.params.unwrap_or(Value::Null);
                let name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if name.is_empty() {
                    return Some(JsonRpcResponse::failure(
                        request.id,
                        -32602,
                        "Missing tool name",
                    ));
                }
                let arguments = params
                    .get("arguments")
                    .cloned()
                    .unwrap_or_else(|| json!({}));

                let body = self.call_tool(&name, arguments).await;
                let is_error = body.get("error").is_some();
                let text = body.to_string();
                Some(JsonRpcResponse::success(
                    request.id,
                    json!({
                        "content": [{ "type": "text", "text": text }],
                        "isError": is_error,
                    }),
                ))
            }
            "ping" => {
                request.id.as_ref()?;
                Some(JsonRpcResponse::success(request.id, json!({})))
            }
            "shutdown" => {
                request.id.as_ref()?;
                Some(JsonRpcResponse::success(request.id, Value::Null))
            }
            other => {
                // Notifications for unknown methods are dropped silently.
                request.id.as_ref()?;
                debug!(method = other, "unknown method");
                Some(JsonRpcResponse::failure(request.id, -32601, "Method not found"))
            }
        }
    }

    /// Snapshot of the per-tool request metrics.
    #[must_use]
    pub fn metrics_snapshot(&self) -> std::collections::HashMap<String, crate::metrics::ToolMetrics> {
        self.metrics.snapshot()
    }

    /// Probe the per-task similar cache.
    pub(crate) fn similar_cached(&self, task_id: &str) -> Option<Value> {
        let cache = self.similar_cache.read();
        let (stored_at, value) = cache.get(task_id)?;
        (stored_at.elapsed().as_secs() < SIMILAR_CACHE_TTL_SECS).then(|| value.clone())
    }

    /// Store a similar-tasks result for a task.
    pub(crate) fn cache_similar(&self, task_id: String, value: Value) {
        self.similar_cache
            .write()
            .insert(task_id, (Instant::now(), value));
    }
}

/// Build an error response body.
fn error_body(request_id: &str, latency_ms: u64, code: ErrorCode, message: &str) -> Value {
    json!({
        "error": {
            "code": code.as_str(),
            "message": message,
        },
        "request_id": request_id,
        "latency_ms": latency_ms,
    })
}

/// Convenience used by handlers to surface absent entities.
pub(crate) fn not_found(what: &str, key: &str) -> Error {
    Error::NotFound(format!("{what} {key}"))
}
