//! The reflection pipeline: atomic acceptance of a reflection event.
//!
//! Validation failures are returned as data in `rejected[]` so callers can
//! correct and retry; only structural schema failures surface as
//! `INVALID_PARAMS`. Once validation passes, every write happens inside a
//! single storage transaction.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use apex_core::error::{Error, Result};
use apex_core::trust::TrustModel;
use apex_core::types::pattern::{Pattern, PatternType};
use apex_core::types::reflection::{
    AuditEvent, AuditKind, Claims, NewPatternSpec, Reflection, ReflectionArtifacts,
    ReflectionOutcome, TaskRef, TrustOutcome,
};
use apex_core::validation::{FieldSpec, FieldType, Validator, closest_match, sanitize_tags};
use apex_storage::{ApexStorage, ReflectionApply, TrustWrite, claims_content_hash};

pub mod evidence;
pub mod miner;

use evidence::{Rejection, validate_evidence};

/// Schema version reported in the response meta block.
const SCHEMA_VERSION: &str = "1.0";

/// Rolling window for anti-pattern candidate gathering.
const ANTI_CANDIDATE_WINDOW_DAYS: u32 = 30;

/// Structural validator for the reflect request envelope.
static REFLECT_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    Validator::new(vec![
        FieldSpec::required("task", FieldType::Object),
        FieldSpec::required("outcome", FieldType::String),
        FieldSpec::required("claims", FieldType::Object),
        FieldSpec::optional("artifacts", FieldType::Object),
        FieldSpec::optional("dry_run", FieldType::Boolean),
        FieldSpec::optional("auto_mine", FieldType::Boolean),
        FieldSpec::optional("explain", FieldType::Boolean),
    ])
});

/// The reflect request as received on the wire.
#[derive(Debug, Deserialize)]
pub struct ReflectRequest {
    /// The reflected task
    pub task: TaskRef,
    /// Overall outcome string, validated against the closed enum
    pub outcome: String,
    /// Claims payload
    pub claims: Claims,
    /// Optional build artifacts
    #[serde(default)]
    pub artifacts: ReflectionArtifacts,
    /// Validate without persisting
    #[serde(default)]
    pub dry_run: bool,
    /// Run the commit miner over artifacts
    #[serde(default)]
    pub auto_mine: bool,
    /// Include the explain block in the response
    #[serde(default)]
    pub explain: bool,
}

/// Where a pattern reference resolved to.
#[derive(Debug, Clone)]
enum ResolvedRef {
    /// An existing stored pattern
    Existing(String),
    /// Index into the combined new+anti pattern list being created
    Pending(usize),
}

/// Mutable trust state for one existing pattern during the pipeline.
#[derive(Debug, Clone)]
struct TrustState {
    alpha: f64,
    beta: f64,
    pattern_type: PatternType,
    decay_applied: bool,
    touched: bool,
    record_usage: bool,
    usage_success: bool,
}

/// Handle `apex_reflect`.
pub async fn handle_reflect(
    storage: &ApexStorage,
    trust: &TrustModel,
    allowed_repos: &[String],
    args: Value,
) -> Result<Value> {
    let received_at = Utc::now();
    let validation_started = Instant::now();

    REFLECT_VALIDATOR.validate(&args)?;
    let request: ReflectRequest = serde_json::from_value(args)
        .map_err(|e| Error::invalid_param("", "parse_error", e.to_string()))?;

    let mut rejections: Vec<Rejection> = Vec::new();

    let outcome = validate_outcome(&request.outcome, &mut rejections);
    validate_claim_evidence(&request.claims, allowed_repos, &mut rejections);
    let trust_outcomes = validate_trust_outcomes(&request.claims, &mut rejections);

    // Combined list of patterns this reflection creates; trust updates may
    // target them by title before they have an id.
    let pending_specs: Vec<(&NewPatternSpec, PatternType)> = request
        .claims
        .new_patterns
        .iter()
        .map(|spec| (spec, spec.pattern_type.unwrap_or(PatternType::Codebase)))
        .chain(
            request
                .claims
                .anti_patterns
                .iter()
                .map(|spec| (spec, PatternType::Anti)),
        )
        .collect();

    let resolution =
        resolve_references(storage, &request.claims, &pending_specs, &mut rejections).await?;

    let validated_in_ms = validation_started.elapsed().as_millis() as u64;

    if !rejections.is_empty() {
        debug!(count = rejections.len(), "reflection rejected during validation");
        return Ok(json!({
            "ok": false,
            "persisted": false,
            "outcome": request.outcome,
            "accepted": empty_accepted(),
            "rejected": rejections,
            "drafts_created": [],
            "anti_candidates": [],
            "meta": meta_block(received_at, validated_in_ms, 0),
        }));
    }
    // Rejections are empty, so the outcome parsed.
    let outcome = outcome.unwrap_or(ReflectionOutcome::Partial);

    if request.dry_run {
        return Ok(json!({
            "ok": true,
            "persisted": false,
            "dry_run": true,
            "outcome": outcome.as_str(),
            "accepted": empty_accepted(),
            "rejected": [],
            "drafts_created": [],
            "anti_candidates": [],
            "meta": meta_block(received_at, validated_in_ms, 0),
        }));
    }

    let persist_started = Instant::now();

    // Materialize pending patterns with generated ids.
    let mut pending: Vec<Pattern> = pending_specs
        .iter()
        .map(|(spec, pattern_type)| build_pattern(spec, *pattern_type))
        .collect();

    // Pre-read trust state for every referenced existing pattern before the
    // write transaction opens; decay lands on the first touch.
    let mut states: HashMap<String, TrustState> = HashMap::new();
    for resolved in resolution.values() {
        if let ResolvedRef::Existing(id) = resolved {
            if states.contains_key(id) {
                continue;
            }
            let pattern = storage
                .get_pattern(id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("pattern {id}")))?;
            let (alpha, beta, decay_applied) = trust.apply_decay(
                pattern.pattern_type,
                pattern.alpha,
                pattern.beta,
                pattern.updated_at,
                received_at,
            )?;
            states.insert(
                id.clone(),
                TrustState {
                    alpha,
                    beta,
                    pattern_type: pattern.pattern_type,
                    decay_applied,
                    touched: decay_applied,
                    record_usage: false,
                    usage_success: false,
                },
            );
        }
    }

    // Apply trust deltas in request order.
    for (update, alias) in request.claims.trust_updates.iter().zip(&trust_outcomes) {
        let Some(alias) = alias else { continue };
        let (delta_alpha, delta_beta) = alias.deltas();
        match resolution.get(&update.pattern_id) {
            Some(ResolvedRef::Existing(id)) => {
                if let Some(state) = states.get_mut(id) {
                    let (alpha, beta) = trust.update_with_delta(
                        state.alpha,
                        state.beta,
                        delta_alpha,
                        delta_beta,
                    )?;
                    state.alpha = alpha;
                    state.beta = beta;
                    state.touched = true;
                }
            }
            Some(ResolvedRef::Pending(index)) => {
                if let Some(pattern) = pending.get_mut(*index) {
                    pattern.alpha += delta_alpha;
                    pattern.beta += delta_beta;
                    pattern.trust_score = pattern.alpha / (pattern.alpha + pattern.beta);
                }
            }
            None => {}
        }
    }

    // Record usage and build one audit event per used pattern.
    let mut audit_events = Vec::new();
    let mut used_ids = Vec::new();
    for usage in &request.claims.patterns_used {
        let success = usage_success(&request.claims, &trust_outcomes, &usage.pattern_id, outcome);
        let pattern_id = match resolution.get(&usage.pattern_id) {
            Some(ResolvedRef::Existing(id)) => {
                if let Some(state) = states.get_mut(id) {
                    state.record_usage = true;
                    state.usage_success = success;
                    state.touched = true;
                }
                id.clone()
            }
            Some(ResolvedRef::Pending(index)) => {
                let Some(pattern) = pending.get_mut(*index) else {
                    continue;
                };
                pattern.usage_count += 1;
                if success {
                    pattern.success_count += 1;
                }
                pattern.id.clone()
            }
            None => continue,
        };
        used_ids.push(pattern_id.clone());
        audit_events.push(AuditEvent {
            task_id: request.task.id.clone(),
            kind: AuditKind::PatternUsed,
            pattern_id: Some(pattern_id),
            details: json!({
                "success": success,
                "evidence_count": usage.evidence.len(),
            }),
            timestamp: received_at,
        });
    }

    let mut trust_writes = Vec::new();
    for (id, state) in &states {
        if !state.touched {
            continue;
        }
        trust_writes.push(TrustWrite {
            pattern_id: id.clone(),
            alpha: state.alpha,
            beta: state.beta,
            trust_score: state.alpha / (state.alpha + state.beta),
            record_usage: state.record_usage,
            success: state.usage_success,
        });
    }
    // Deterministic write order inside the transaction.
    trust_writes.sort_by(|a, b| a.pattern_id.cmp(&b.pattern_id));

    let new_count = request.claims.new_patterns.len();
    let new_ids: Vec<String> = pending[..new_count].iter().map(|p| p.id.clone()).collect();
    let anti_ids: Vec<String> = pending[new_count..].iter().map(|p| p.id.clone()).collect();

    // Draft mining on request.
    let drafts = if request.auto_mine {
        miner::mine_commits(&request.artifacts.commits)
    } else {
        Vec::new()
    };
    let draft_ids: Vec<String> = drafts.iter().map(|d| d.id.clone()).collect();

    let mut all_new = pending;
    all_new.extend(drafts);

    let content_hash = claims_content_hash(&request.task.id, &request.claims)?;
    let apply = ReflectionApply {
        reflection: Reflection {
            id: format!("R_{}", Uuid::new_v4().simple()),
            task_id: request.task.id.clone(),
            content_hash,
            outcome,
            claims: request.claims.clone(),
            artifacts: request.artifacts.clone(),
            received_at,
        },
        trust_writes: trust_writes.clone(),
        new_patterns: all_new,
        metadata: Vec::new(),
        audit_events,
    };

    let persisted = storage.apply_reflection(&apply).await?;
    let persisted_in_ms = persist_started.elapsed().as_millis() as u64;

    let anti_candidates = storage.anti_candidates(ANTI_CANDIDATE_WINDOW_DAYS).await?;

    let accepted_trust: Vec<Value> = trust_writes
        .iter()
        .map(|write| {
            json!({
                "pattern_id": write.pattern_id,
                "alpha": write.alpha,
                "beta": write.beta,
                "trust_score": write.trust_score,
            })
        })
        .collect();

    let mut response = json!({
        "ok": true,
        "persisted": persisted,
        "outcome": outcome.as_str(),
        "accepted": {
            "patterns_used": used_ids,
            "new_patterns": new_ids,
            "anti_patterns": anti_ids,
            "learnings": request.claims.learnings.len(),
            "trust_updates": accepted_trust,
        },
        "rejected": [],
        "drafts_created": draft_ids,
        "anti_candidates": anti_candidates,
        "meta": meta_block(received_at, validated_in_ms, persisted_in_ms),
    });

    if request.explain {
        let decay: Vec<Value> = states
            .iter()
            .map(|(id, state)| {
                json!({
                    "pattern_id": id,
                    "type": state.pattern_type.as_str(),
                    "decay_applied": state.decay_applied,
                })
            })
            .collect();
        response["explain"] = json!({
            "evidence_items": request
                .claims
                .patterns_used
                .iter()
                .map(|u| u.evidence.len())
                .sum::<usize>(),
            "decay": decay,
        });
    }

    info!(task_id = %request.task.id, persisted, "reflection processed");
    Ok(response)
}

fn empty_accepted() -> Value {
    json!({
        "patterns_used": [],
        "new_patterns": [],
        "anti_patterns": [],
        "learnings": 0,
        "trust_updates": [],
    })
}

fn meta_block(received_at: chrono::DateTime<Utc>, validated_in_ms: u64, persisted_in_ms: u64) -> Value {
    json!({
        "received_at": received_at.to_rfc3339(),
        "validated_in_ms": validated_in_ms,
        "persisted_in_ms": persisted_in_ms,
        "schema_version": SCHEMA_VERSION,
    })
}

/// Validate the top-level outcome, appending a rejection on failure.
fn validate_outcome(raw: &str, rejections: &mut Vec<Rejection>) -> Option<ReflectionOutcome> {
    match ReflectionOutcome::parse(raw) {
        Ok(outcome) => Some(outcome),
        Err(_) => {
            const VALID: [&str; 3] = ["success", "partial", "failure"];
            let mut message = format!(
                "invalid outcome {raw:?}; valid values are {}",
                VALID.join(", ")
            );
            if let Some(best) = closest_match(raw, &VALID) {
                message.push_str(&format!("; did you mean {best:?}?"));
            }
            rejections.push(Rejection::new("outcome", "invalid_enum", message));
            None
        }
    }
}

/// Every used pattern needs at least one valid evidence item; new and anti
/// pattern evidence is validated when present.
fn validate_claim_evidence(
    claims: &Claims,
    allowed_repos: &[String],
    rejections: &mut Vec<Rejection>,
) {
    for (i, usage) in claims.patterns_used.iter().enumerate() {
        let base = format!("claims.patterns_used[{i}]");
        if usage.evidence.is_empty() {
            rejections.push(Rejection::new(
                format!("{base}.evidence"),
                "evidence_required",
                format!("claim for {} carries no evidence", usage.pattern_id),
            ));
        }
        for (j, item) in usage.evidence.iter().enumerate() {
            validate_evidence(item, &format!("{base}.evidence[{j}]"), allowed_repos, rejections);
        }
    }
    for (kind, specs) in [
        ("new_patterns", &claims.new_patterns),
        ("anti_patterns", &claims.anti_patterns),
    ] {
        for (i, spec) in specs.iter().enumerate() {
            for (j, item) in spec.evidence.iter().enumerate() {
                validate_evidence(
                    item,
                    &format!("claims.{kind}[{i}].evidence[{j}]"),
                    allowed_repos,
                    rejections,
                );
            }
        }
    }
    for (i, learning) in claims.learnings.iter().enumerate() {
        for (j, item) in learning.evidence.iter().enumerate() {
            validate_evidence(
                item,
                &format!("claims.learnings[{i}].evidence[{j}]"),
                allowed_repos,
                rejections,
            );
        }
    }
}

/// Validate the five-alias trust outcomes, with a best-match suggestion on
/// failure.
fn validate_trust_outcomes(
    claims: &Claims,
    rejections: &mut Vec<Rejection>,
) -> Vec<Option<TrustOutcome>> {
    const ALIASES: [&str; 5] = [
        "worked-perfectly",
        "worked-with-tweaks",
        "partial-success",
        "failed-minor-issues",
        "failed-completely",
    ];
    claims
        .trust_updates
        .iter()
        .enumerate()
        .map(|(i, update)| match TrustOutcome::parse(&update.outcome) {
            Ok(alias) => Some(alias),
            Err(_) => {
                let mut message = format!(
                    "invalid outcome {:?}; valid values are {}",
                    update.outcome,
                    ALIASES.join(", ")
                );
                if let Some(best) = closest_match(&update.outcome, &ALIASES) {
                    message.push_str(&format!("; did you mean {best:?}?"));
                }
                rejections.push(Rejection::new(
                    format!("claims.trust_updates[{i}].outcome"),
                    "invalid_enum",
                    message,
                ));
                None
            }
        })
        .collect()
}

/// Resolve every referenced pattern to an existing id or a pending create.
async fn resolve_references(
    storage: &ApexStorage,
    claims: &Claims,
    pending_specs: &[(&NewPatternSpec, PatternType)],
    rejections: &mut Vec<Rejection>,
) -> Result<HashMap<String, ResolvedRef>> {
    let mut resolution = HashMap::new();
    let references = claims
        .patterns_used
        .iter()
        .map(|u| (format!("claims.patterns_used referencing {}", u.pattern_id), &u.pattern_id))
        .chain(claims.trust_updates.iter().map(|u| {
            (
                format!("claims.trust_updates referencing {}", u.pattern_id),
                &u.pattern_id,
            )
        }));

    for (path, reference) in references {
        if resolution.contains_key(reference) {
            continue;
        }
        if let Some(id) = storage.resolve_pattern_id(reference).await? {
            resolution.insert(reference.clone(), ResolvedRef::Existing(id));
            continue;
        }
        // A reference may name a pattern this same reflection creates.
        let pending = pending_specs.iter().position(|(spec, _)| {
            spec.title.eq_ignore_ascii_case(reference)
        });
        if let Some(index) = pending {
            resolution.insert(reference.clone(), ResolvedRef::Pending(index));
            continue;
        }
        rejections.push(Rejection::new(
            path,
            "unknown_pattern",
            format!("pattern {reference:?} does not resolve via id or alias"),
        ));
    }
    Ok(resolution)
}

/// Whether a used pattern counts as a success: its own trust update wins,
/// the reflection outcome is the fallback.
fn usage_success(
    claims: &Claims,
    trust_outcomes: &[Option<TrustOutcome>],
    pattern_ref: &str,
    outcome: ReflectionOutcome,
) -> bool {
    for (update, alias) in claims.trust_updates.iter().zip(trust_outcomes) {
        if update.pattern_id == pattern_ref {
            if let Some(alias) = alias {
                return alias.is_success();
            }
        }
    }
    outcome == ReflectionOutcome::Success
}

/// Build a pattern row from a creation spec.
fn build_pattern(spec: &NewPatternSpec, pattern_type: PatternType) -> Pattern {
    let mut pattern = Pattern::new(
        format!("PAT:{}", Uuid::new_v4().simple()),
        pattern_type,
        spec.title.clone(),
        spec.summary.clone(),
    );
    pattern.tags = sanitize_tags(&spec.tags);
    if !spec.snippets.is_empty() {
        pattern.json_canonical = json!({ "snippets": spec.snippets });
    }
    pattern
}
