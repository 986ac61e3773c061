//! Task lifecycle tool handlers.

use chrono::Utc;
use serde_json::{Value, json};
use std::sync::LazyLock;
use tracing::{debug, info};
use uuid::Uuid;

use apex_core::brief::basic_brief;
use apex_core::error::{Error, Result};
use apex_core::pack::DEFAULT_CONTEXT_MAX_SIZE;
use apex_core::ranking::similar::rank_similar;
use apex_core::types::task::{
    Checkpoint, EvidenceType, Phase, PhaseHandoff, TaskEvidence, TaskStatus, TaskType,
};
use apex_core::validation::{Constraint, FieldSpec, FieldType, Validator, sanitize_tags};
use apex_storage::TaskQuery;

use crate::server::{ApexServer, not_found};
use crate::server::tools::{opt_f64, opt_str, opt_u64, require_str, str_list};

static CREATE_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    Validator::new(vec![
        FieldSpec::required("intent", FieldType::String)
            .with(Constraint::Length { min: 1, max: 1000 }),
        FieldSpec::required("task_type", FieldType::String).with(Constraint::OneOf(vec![
            "bug", "feature", "refactor", "test", "docs", "perf",
        ])),
        FieldSpec::optional("title", FieldType::String)
            .with(Constraint::Length { min: 1, max: 1000 }),
        FieldSpec::optional("identifier", FieldType::String),
        FieldSpec::optional("tags", FieldType::Array).with(Constraint::MaxItems(15)),
    ])
});

static CHECKPOINT_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    Validator::new(vec![
        FieldSpec::required("task_id", FieldType::String),
        FieldSpec::required("message", FieldType::String)
            .with(Constraint::Length { min: 1, max: 1000 }),
        FieldSpec::optional("confidence", FieldType::Number)
            .with(Constraint::Range { min: 0.0, max: 1.0 }),
    ])
});

fn task_json(task: &apex_core::types::task::Task) -> Result<Value> {
    serde_json::to_value(task).map_err(Error::Serialization)
}

pub(crate) async fn handle_create(server: &ApexServer, args: Value) -> Result<Value> {
    CREATE_VALIDATOR.validate(&args)?;

    let intent = require_str(&args, "intent")?;
    let task_type = TaskType::parse(&require_str(&args, "task_type")?)?;
    // The basic brief is deterministic and never blocks creation; any
    // enhancement pass happens after the task exists.
    let brief = basic_brief(&intent);
    let title = opt_str(&args, "title").unwrap_or_else(|| brief.tl_dr.clone());
    let tags = sanitize_tags(&str_list(&args, "tags"));

    let task = apex_storage::new_task(
        title,
        intent,
        task_type,
        opt_str(&args, "identifier"),
        tags,
        brief,
    );
    server.storage.insert_task(&task).await?;
    info!(task_id = %task.id, "task created");
    Ok(json!({ "task": task_json(&task)? }))
}

pub(crate) async fn handle_find(server: &ApexServer, args: Value) -> Result<Value> {
    let query = TaskQuery {
        identifier: opt_str(&args, "identifier"),
        title_contains: opt_str(&args, "title"),
        status: opt_str(&args, "status")
            .map(|raw| TaskStatus::parse(&raw))
            .transpose()?,
        task_type: opt_str(&args, "task_type")
            .map(|raw| TaskType::parse(&raw))
            .transpose()?,
        limit: opt_u64(&args, "limit", 20).clamp(1, 100),
    };
    let tasks = server.storage.find_tasks(&query).await?;
    let rows: Vec<Value> = tasks.iter().map(task_json).collect::<Result<_>>()?;
    Ok(json!({ "total": rows.len(), "tasks": rows }))
}

pub(crate) async fn handle_find_similar(server: &ApexServer, args: Value) -> Result<Value> {
    let task_id = require_str(&args, "task_id")?;
    let limit = opt_u64(&args, "limit", 5).clamp(1, 50) as usize;

    if let Some(cached) = server.similar_cached(&task_id) {
        debug!(task_id, "similar tasks served from per-task cache");
        return Ok(cached);
    }

    let reference = server
        .storage
        .get_task(&task_id)
        .await?
        .ok_or_else(|| not_found("task", &task_id))?;
    let candidates = server
        .storage
        .find_tasks(&TaskQuery {
            limit: 100,
            ..Default::default()
        })
        .await?;

    let similar: Vec<Value> = rank_similar(&reference, candidates, limit)
        .into_iter()
        .map(|scored| {
            Ok(json!({
                "score": scored.score,
                "task": task_json(&scored.task)?,
            }))
        })
        .collect::<Result<_>>()?;

    let body = json!({ "task_id": reference.id, "similar": similar });
    server.cache_similar(reference.id.clone(), body.clone());
    Ok(body)
}

pub(crate) async fn handle_current(server: &ApexServer, _args: Value) -> Result<Value> {
    match server.storage.current_task().await? {
        Some(task) => Ok(json!({ "task": task_json(&task)? })),
        None => Ok(json!({ "task": Value::Null })),
    }
}

pub(crate) async fn handle_update(server: &ApexServer, args: Value) -> Result<Value> {
    let task_id = require_str(&args, "task_id")?;
    let mut task = server
        .storage
        .get_task(&task_id)
        .await?
        .ok_or_else(|| not_found("task", &task_id))?;

    if let Some(title) = opt_str(&args, "title") {
        task.title = title;
    }
    if let Some(status) = opt_str(&args, "status") {
        task.status = TaskStatus::parse(&status)?;
    }
    if let Some(confidence) = opt_f64(&args, "confidence") {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::invalid_param(
                "confidence",
                "out_of_range",
                "must be between 0 and 1",
            ));
        }
        task.confidence = confidence;
    }
    let tags = str_list(&args, "tags");
    if !tags.is_empty() {
        task.tags = sanitize_tags(&tags);
    }
    // File and error logs only grow.
    for file in str_list(&args, "files_touched") {
        if !task.files_touched.contains(&file) {
            task.files_touched.push(file);
        }
    }
    for error in str_list(&args, "errors_encountered") {
        if !task.errors_encountered.contains(&error) {
            task.errors_encountered.push(error);
        }
    }

    let handoff = opt_str(&args, "handoff");
    if let Some(raw_phase) = opt_str(&args, "phase") {
        let to = Phase::parse(&raw_phase)?;
        task.check_transition(to, handoff.as_deref())?;
        if to != task.phase {
            task.phase_handoffs.push(PhaseHandoff {
                phase: task.phase,
                handoff: handoff.unwrap_or_default(),
                timestamp: Utc::now(),
            });
            task.phase = to;
        }
    }

    server.storage.update_task(&task).await?;
    Ok(json!({ "task": task_json(&task)? }))
}

pub(crate) async fn handle_checkpoint(server: &ApexServer, args: Value) -> Result<Value> {
    CHECKPOINT_VALIDATOR.validate(&args)?;
    let task_id = require_str(&args, "task_id")?;
    let task = server
        .storage
        .append_checkpoint(
            &task_id,
            Checkpoint {
                message: require_str(&args, "message")?,
                confidence: opt_f64(&args, "confidence"),
                timestamp: Utc::now(),
            },
        )
        .await?;
    Ok(json!({
        "task_id": task.id,
        "checkpoints": task.in_flight.len(),
        "confidence": task.confidence,
    }))
}

pub(crate) async fn handle_complete(server: &ApexServer, args: Value) -> Result<Value> {
    let task_id = require_str(&args, "task_id")?;
    let mut task = server
        .storage
        .get_task(&task_id)
        .await?
        .ok_or_else(|| not_found("task", &task_id))?;

    if !task.can_complete() {
        return Err(Error::PhaseViolation(format!(
            "task {} is in phase {}; completion requires DOCUMENTER",
            task.id, task.phase
        )));
    }

    let outcome = opt_str(&args, "outcome").unwrap_or_else(|| "success".to_string());
    task.status = match outcome.as_str() {
        "failure" => TaskStatus::Failed,
        _ => TaskStatus::Completed,
    };
    server.storage.update_task(&task).await?;
    info!(task_id = %task.id, outcome, "task completed");
    Ok(json!({ "task": task_json(&task)? }))
}

pub(crate) async fn handle_append_evidence(server: &ApexServer, args: Value) -> Result<Value> {
    let task_id = require_str(&args, "task_id")?;
    server
        .storage
        .get_task(&task_id)
        .await?
        .ok_or_else(|| not_found("task", &task_id))?;

    let evidence = TaskEvidence {
        id: format!("EV_{}", Uuid::new_v4().simple()),
        task_id: task_id.clone(),
        evidence_type: EvidenceType::parse(&require_str(&args, "type")?)?,
        content: require_str(&args, "content")?,
        metadata: args.get("metadata").cloned(),
        timestamp: Utc::now(),
    };
    server.storage.insert_evidence(&evidence).await?;
    Ok(json!({ "evidence_id": evidence.id, "task_id": task_id }))
}

pub(crate) async fn handle_get_evidence(server: &ApexServer, args: Value) -> Result<Value> {
    let task_id = require_str(&args, "task_id")?;
    let limit = opt_u64(&args, "limit", 100).clamp(1, 500);
    let evidence = server.storage.get_evidence(&task_id, limit).await?;
    let rows: Vec<Value> = evidence
        .iter()
        .map(|e| serde_json::to_value(e).map_err(Error::Serialization))
        .collect::<Result<_>>()?;
    Ok(json!({ "task_id": task_id, "total": rows.len(), "evidence": rows }))
}

pub(crate) async fn handle_get_phase(server: &ApexServer, args: Value) -> Result<Value> {
    let task_id = require_str(&args, "task_id")?;
    let task = server
        .storage
        .get_task(&task_id)
        .await?
        .ok_or_else(|| not_found("task", &task_id))?;
    Ok(json!({
        "task_id": task.id,
        "phase": task.phase.as_str(),
        "handoffs": serde_json::to_value(&task.phase_handoffs).map_err(Error::Serialization)?,
    }))
}

pub(crate) async fn handle_set_phase(server: &ApexServer, args: Value) -> Result<Value> {
    let task_id = require_str(&args, "task_id")?;
    let to = Phase::parse(&require_str(&args, "phase")?)?;
    let handoff = opt_str(&args, "handoff");

    let task = server
        .storage
        .get_task(&task_id)
        .await?
        .ok_or_else(|| not_found("task", &task_id))?;
    task.check_transition(to, handoff.as_deref())?;

    if to == task.phase {
        return Ok(json!({ "task": task_json(&task)? }));
    }
    let updated = server
        .storage
        .append_handoff(
            &task.id,
            to,
            PhaseHandoff {
                phase: task.phase,
                handoff: handoff.unwrap_or_default(),
                timestamp: Utc::now(),
            },
        )
        .await?;
    Ok(json!({ "task": task_json(&updated)? }))
}

/// Section order for the context pack; later sections are dropped first
/// when the serialized pack exceeds the byte budget.
const CONTEXT_SECTIONS: [&str; 4] = ["evidence", "similar_tasks", "patterns", "statistics"];

pub(crate) async fn handle_context(server: &ApexServer, args: Value) -> Result<Value> {
    let task_id = require_str(&args, "task_id")?;
    let max_size_bytes =
        opt_u64(&args, "max_size_bytes", DEFAULT_CONTEXT_MAX_SIZE as u64) as usize;
    let requested = str_list(&args, "packs");
    let wants = |section: &str| requested.is_empty() || requested.iter().any(|p| p == section);

    let task = server
        .storage
        .get_task(&task_id)
        .await?
        .ok_or_else(|| not_found("task", &task_id))?;

    let mut body = json!({
        "task_data": task_json(&task)?,
        "included_packs": [],
    });

    if wants("evidence") {
        let evidence = server.storage.get_evidence(&task.id, 100).await?;
        body["evidence"] = serde_json::to_value(&evidence).map_err(Error::Serialization)?;
    }
    if wants("similar_tasks") {
        let candidates = server
            .storage
            .find_tasks(&TaskQuery {
                limit: 100,
                ..Default::default()
            })
            .await?;
        let similar: Vec<Value> = rank_similar(&task, candidates, 5)
            .into_iter()
            .map(|scored| {
                Ok(json!({
                    "task_id": scored.task.id,
                    "title": scored.task.title,
                    "score": scored.score,
                }))
            })
            .collect::<Result<_>>()?;
        body["similar_tasks"] = Value::Array(similar);
    }
    if wants("patterns") {
        let hits = server
            .storage
            .search_patterns(&task.intent, &[], &[], 5)
            .await?;
        let patterns: Vec<Value> = hits
            .iter()
            .map(|hit| {
                json!({
                    "id": hit.pattern.id,
                    "type": hit.pattern.pattern_type.as_str(),
                    "title": hit.pattern.title,
                    "summary": hit.pattern.summary,
                    "trust_score": hit.pattern.trust_score,
                })
            })
            .collect();
        body["patterns"] = Value::Array(patterns);
    }
    if wants("statistics") {
        let stats = server
            .storage
            .aggregate_stats(&apex_storage::PatternFilter::default())
            .await?;
        body["statistics"] = serde_json::to_value(&stats).map_err(Error::Serialization)?;
    }

    // Enforce the byte budget by dropping sections, least important first.
    // task_data always survives.
    for section in CONTEXT_SECTIONS.iter().rev() {
        if body.to_string().len() <= max_size_bytes {
            break;
        }
        if let Some(object) = body.as_object_mut() {
            object.remove(*section);
        }
    }
    let included: Vec<&str> = CONTEXT_SECTIONS
        .iter()
        .copied()
        .filter(|section| body.get(section).is_some())
        .collect();
    body["included_packs"] = json!(included);

    Ok(body)
}
