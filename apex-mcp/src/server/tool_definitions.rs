//! Tool definitions for the APEX MCP server.
//!
//! Names are part of the wire contract; clients dispatch on them verbatim.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// One tool advertised through `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Wire name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON schema for the arguments object
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl Tool {
    fn new(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

/// Tool names that mutate state. These bypass the response cache and are
/// never served from it.
pub const WRITE_TOOLS: &[&str] = &[
    "apex_reflect",
    "apex_task_create",
    "apex_task_update",
    "apex_task_checkpoint",
    "apex_task_complete",
    "apex_task_append_evidence",
    "apex_task_set_phase",
];

/// Read tools whose responses are cacheable.
pub const CACHED_TOOLS: &[&str] = &[
    "apex_patterns_lookup",
    "apex_patterns_discover",
    "apex_patterns_explain",
    "apex_patterns_overview",
];

/// Create the full tool catalog.
#[must_use]
pub fn create_tools() -> Vec<Tool> {
    vec![
        Tool::new(
            "apex_patterns_lookup",
            "Rank stored engineering patterns against a task context and return a size-bounded pack",
            json!({
                "type": "object",
                "properties": {
                    "task": {
                        "type": "string",
                        "minLength": 1,
                        "maxLength": 1000,
                        "description": "Free-text description of the task at hand"
                    },
                    "current_file": {"type": "string"},
                    "language": {"type": "string"},
                    "framework": {"type": "string", "description": "name@version or name==version"},
                    "recent_errors": {"type": "array", "items": {"type": "string"}},
                    "repo_path": {"type": "string"},
                    "task_intent": {"type": "object"},
                    "code_context": {"type": "object"},
                    "error_context": {"type": "array", "items": {"type": "object"}},
                    "session_context": {"type": "object"},
                    "project_signals": {"type": "object"},
                    "workflow_phase": {"type": "string"},
                    "max_size": {
                        "type": "integer",
                        "minimum": 1024,
                        "maximum": 65536,
                        "default": 8192,
                        "description": "Response pack byte budget"
                    },
                    "min_score": {
                        "type": "number",
                        "minimum": 0,
                        "maximum": 1,
                        "description": "Drop candidates scoring below this floor"
                    }
                },
                "required": ["task"]
            }),
        ),
        Tool::new(
            "apex_patterns_discover",
            "Natural-language full-text search over stored patterns",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "minLength": 3, "maxLength": 500},
                    "types": {"type": "array", "items": {"type": "string"}},
                    "tags": {"type": "array", "items": {"type": "string"}, "maxItems": 15},
                    "min_trust": {"type": "number", "minimum": 0, "maximum": 1},
                    "max_results": {"type": "integer", "minimum": 1, "maximum": 50, "default": 10}
                },
                "required": ["query"]
            }),
        ),
        Tool::new(
            "apex_patterns_explain",
            "Explain one pattern: trust state, usage guidance, common mistakes, related patterns",
            json!({
                "type": "object",
                "properties": {
                    "pattern_id": {"type": "string", "description": "Pattern id or alias"}
                },
                "required": ["pattern_id"]
            }),
        ),
        Tool::new(
            "apex_patterns_overview",
            "Paginated, filtered listing of stored patterns with aggregate statistics",
            json!({
                "type": "object",
                "properties": {
                    "types": {"type": "array", "items": {"type": "string"}},
                    "tags": {"type": "array", "items": {"type": "string"}, "maxItems": 15},
                    "min_trust": {"type": "number", "minimum": 0, "maximum": 1},
                    "status": {"type": "string", "enum": ["active", "quarantined", "all"], "default": "active"},
                    "order_by": {"type": "string", "enum": ["trust_score", "created_at", "updated_at", "usage_count", "title"]},
                    "order": {"type": "string", "enum": ["asc", "desc"], "default": "desc"},
                    "page": {"type": "integer", "minimum": 1, "default": 1},
                    "page_size": {"type": "integer", "minimum": 1, "maximum": 100, "default": 50}
                }
            }),
        ),
        Tool::new(
            "apex_reflect",
            "Post a task reflection: evidence-backed claims that adjust pattern trust and create patterns",
            json!({
                "type": "object",
                "properties": {
                    "task": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "string"},
                            "title": {"type": "string"}
                        },
                        "required": ["id"]
                    },
                    "outcome": {"type": "string", "enum": ["success", "partial", "failure"]},
                    "claims": {
                        "type": "object",
                        "properties": {
                            "patterns_used": {"type": "array", "items": {"type": "object"}},
                            "trust_updates": {"type": "array", "items": {"type": "object"}},
                            "new_patterns": {"type": "array", "items": {"type": "object"}},
                            "anti_patterns": {"type": "array", "items": {"type": "object"}},
                            "learnings": {"type": "array", "items": {"type": "object"}}
                        }
                    },
                    "artifacts": {"type": "object"},
                    "dry_run": {"type": "boolean", "default": false},
                    "auto_mine": {"type": "boolean", "default": false},
                    "explain": {"type": "boolean", "default": false}
                },
                "required": ["task", "outcome", "claims"]
            }),
        ),
        Tool::new(
            "apex_task_create",
            "Create a task with a generated brief; the task starts in the ARCHITECT phase",
            json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string", "minLength": 1, "maxLength": 1000},
                    "intent": {"type": "string", "minLength": 1, "maxLength": 1000},
                    "task_type": {"type": "string", "enum": ["bug", "feature", "refactor", "test", "docs", "perf"]},
                    "identifier": {"type": "string"},
                    "tags": {"type": "array", "items": {"type": "string"}, "maxItems": 15}
                },
                "required": ["intent", "task_type"]
            }),
        ),
        Tool::new(
            "apex_task_find",
            "Find tasks by identifier, title substring, status, or type",
            json!({
                "type": "object",
                "properties": {
                    "identifier": {"type": "string"},
                    "title": {"type": "string"},
                    "status": {"type": "string", "enum": ["active", "completed", "failed", "blocked"]},
                    "task_type": {"type": "string", "enum": ["bug", "feature", "refactor", "test", "docs", "perf"]},
                    "limit": {"type": "integer", "minimum": 1, "maximum": 100, "default": 20}
                }
            }),
        ),
        Tool::new(
            "apex_task_find_similar",
            "Rank previous tasks by similarity to one task (tags, title, files, type)",
            json!({
                "type": "object",
                "properties": {
                    "task_id": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1, "maximum": 50, "default": 5}
                },
                "required": ["task_id"]
            }),
        ),
        Tool::new(
            "apex_task_current",
            "The most recently active task, if any",
            json!({"type": "object", "properties": {}}),
        ),
        Tool::new(
            "apex_task_update",
            "Update task fields; phase moves require a handoff when returning to an earlier phase",
            json!({
                "type": "object",
                "properties": {
                    "task_id": {"type": "string"},
                    "title": {"type": "string"},
                    "status": {"type": "string", "enum": ["active", "completed", "failed", "blocked"]},
                    "phase": {"type": "string", "enum": ["ARCHITECT", "BUILDER", "VALIDATOR", "REVIEWER", "DOCUMENTER"]},
                    "handoff": {"type": "string"},
                    "confidence": {"type": "number", "minimum": 0, "maximum": 1},
                    "files_touched": {"type": "array", "items": {"type": "string"}},
                    "errors_encountered": {"type": "array", "items": {"type": "string"}},
                    "tags": {"type": "array", "items": {"type": "string"}, "maxItems": 15}
                },
                "required": ["task_id"]
            }),
        ),
        Tool::new(
            "apex_task_checkpoint",
            "Append a timestamped progress line to the task's in-flight log",
            json!({
                "type": "object",
                "properties": {
                    "task_id": {"type": "string"},
                    "message": {"type": "string", "minLength": 1, "maxLength": 1000},
                    "confidence": {"type": "number", "minimum": 0, "maximum": 1}
                },
                "required": ["task_id", "message"]
            }),
        ),
        Tool::new(
            "apex_task_complete",
            "Complete a task; only permitted from the DOCUMENTER phase",
            json!({
                "type": "object",
                "properties": {
                    "task_id": {"type": "string"},
                    "outcome": {"type": "string", "enum": ["success", "partial", "failure"]}
                },
                "required": ["task_id"]
            }),
        ),
        Tool::new(
            "apex_task_context",
            "Assemble a size-bounded context pack for a task: data, evidence, similar tasks, patterns, statistics",
            json!({
                "type": "object",
                "properties": {
                    "task_id": {"type": "string"},
                    "packs": {
                        "type": "array",
                        "items": {"type": "string", "enum": ["evidence", "similar_tasks", "patterns", "statistics"]},
                        "description": "Sections to include; all when omitted"
                    },
                    "max_size_bytes": {"type": "integer", "minimum": 1024, "maximum": 65536, "default": 28672}
                },
                "required": ["task_id"]
            }),
        ),
        Tool::new(
            "apex_task_append_evidence",
            "Append one evidence row to a task's append-only log",
            json!({
                "type": "object",
                "properties": {
                    "task_id": {"type": "string"},
                    "type": {"type": "string", "enum": ["file", "pattern", "error", "decision", "learning"]},
                    "content": {"type": "string", "minLength": 1},
                    "metadata": {"type": "object"}
                },
                "required": ["task_id", "type", "content"]
            }),
        ),
        Tool::new(
            "apex_task_get_evidence",
            "Read a task's evidence log in timestamp order",
            json!({
                "type": "object",
                "properties": {
                    "task_id": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1, "maximum": 500, "default": 100}
                },
                "required": ["task_id"]
            }),
        ),
        Tool::new(
            "apex_task_get_phase",
            "The task's current phase and handoff history",
            json!({
                "type": "object",
                "properties": {
                    "task_id": {"type": "string"}
                },
                "required": ["task_id"]
            }),
        ),
        Tool::new(
            "apex_task_set_phase",
            "Move the task to a new phase with a handoff entry",
            json!({
                "type": "object",
                "properties": {
                    "task_id": {"type": "string"},
                    "phase": {"type": "string", "enum": ["ARCHITECT", "BUILDER", "VALIDATOR", "REVIEWER", "DOCUMENTER"]},
                    "handoff": {"type": "string"}
                },
                "required": ["task_id", "phase"]
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names_are_the_wire_contract() {
        let names: Vec<String> = create_tools().into_iter().map(|t| t.name).collect();
        for expected in [
            "apex_patterns_lookup",
            "apex_patterns_discover",
            "apex_patterns_explain",
            "apex_patterns_overview",
            "apex_reflect",
            "apex_task_create",
            "apex_task_find",
            "apex_task_find_similar",
            "apex_task_current",
            "apex_task_update",
            "apex_task_checkpoint",
            "apex_task_complete",
            "apex_task_context",
            "apex_task_append_evidence",
            "apex_task_get_evidence",
            "apex_task_get_phase",
            "apex_task_set_phase",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn test_write_and_cached_tools_disjoint() {
        for tool in WRITE_TOOLS {
            assert!(!CACHED_TOOLS.contains(tool));
        }
    }
}
