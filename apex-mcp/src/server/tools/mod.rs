//! Tool handlers and dispatch.

use serde_json::Value;

use apex_core::error::{Error, Result};

use crate::server::ApexServer;

mod discover;
mod explain;
mod lookup;
mod overview;
mod tasks;

/// Route one tool call to its handler.
pub(crate) async fn dispatch(server: &ApexServer, name: &str, args: Value) -> Result<Value> {
    match name {
        "apex_patterns_lookup" => lookup::handle_lookup(server, args).await,
        "apex_patterns_discover" => discover::handle_discover(server, args).await,
        "apex_patterns_explain" => explain::handle_explain(server, args).await,
        "apex_patterns_overview" => overview::handle_overview(server, args).await,
        "apex_reflect" => {
            crate::reflection::handle_reflect(
                &server.storage,
                &server.trust,
                &server.config.allowed_repos,
                args,
            )
            .await
        }
        "apex_task_create" => tasks::handle_create(server, args).await,
        "apex_task_find" => tasks::handle_find(server, args).await,
        "apex_task_find_similar" => tasks::handle_find_similar(server, args).await,
        "apex_task_current" => tasks::handle_current(server, args).await,
        "apex_task_update" => tasks::handle_update(server, args).await,
        "apex_task_checkpoint" => tasks::handle_checkpoint(server, args).await,
        "apex_task_complete" => tasks::handle_complete(server, args).await,
        "apex_task_context" => tasks::handle_context(server, args).await,
        "apex_task_append_evidence" => tasks::handle_append_evidence(server, args).await,
        "apex_task_get_evidence" => tasks::handle_get_evidence(server, args).await,
        "apex_task_get_phase" => tasks::handle_get_phase(server, args).await,
        "apex_task_set_phase" => tasks::handle_set_phase(server, args).await,
        other => Err(Error::NotFound(format!("tool {other}"))),
    }
}

/// Required string argument.
pub(crate) fn require_str(args: &Value, field: &str) -> Result<String> {
    args.get(field)
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| {
            Error::invalid_param(field, "required", format!("missing required field: {field}"))
        })
}

/// Optional string argument.
pub(crate) fn opt_str(args: &Value, field: &str) -> Option<String> {
    args.get(field)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

/// Optional unsigned integer with default.
pub(crate) fn opt_u64(args: &Value, field: &str, default: u64) -> u64 {
    args.get(field).and_then(Value::as_u64).unwrap_or(default)
}

/// Optional float argument.
pub(crate) fn opt_f64(args: &Value, field: &str) -> Option<f64> {
    args.get(field).and_then(Value::as_f64)
}

/// Optional string list argument.
pub(crate) fn str_list(args: &Value, field: &str) -> Vec<String> {
    args.get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}
