//! `apex_patterns_lookup`: signal extraction, ranking, pack assembly.

use chrono::Utc;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

use apex_core::error::{Error, Result};
use apex_core::pack::{DEFAULT_MAX_SIZE, PackBuilder};
use apex_core::ranking::Candidate;
use apex_core::signals::{LookupContext, Signals, extract};
use apex_core::types::pattern::{PatternTrigger, TriggerType};
use apex_core::validation::{Constraint, FieldSpec, FieldType, Validator};

use crate::server::ApexServer;
use crate::server::tools::opt_u64;

/// Candidate set size handed to the ranker.
const CANDIDATE_LIMIT: u64 = 50;

static LOOKUP_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    Validator::new(vec![
        FieldSpec::required("task", FieldType::String)
            .with(Constraint::Length { min: 1, max: 1000 }),
        FieldSpec::optional("max_size", FieldType::Integer).with(Constraint::Range {
            min: 1024.0,
            max: 65536.0,
        }),
        FieldSpec::optional("min_score", FieldType::Number)
            .with(Constraint::Range { min: 0.0, max: 1.0 }),
        FieldSpec::optional("language", FieldType::String),
        FieldSpec::optional("framework", FieldType::String),
        FieldSpec::optional("recent_errors", FieldType::Array),
        FieldSpec::optional("error_context", FieldType::Array),
    ])
});

/// Facet tags derived from signals for candidate retrieval.
fn facet_tags(signals: &Signals) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let mut push = |value: String| {
        let value = value.to_lowercase();
        if !value.is_empty() && !tags.contains(&value) {
            tags.push(value);
        }
    };
    for language in &signals.languages {
        push(language.clone());
    }
    for framework in &signals.frameworks {
        push(framework.name.clone());
    }
    for error in &signals.error_types {
        push(error.clone());
    }
    tags
}

pub(crate) async fn handle_lookup(server: &ApexServer, args: Value) -> Result<Value> {
    LOOKUP_VALIDATOR.validate(&args)?;
    let max_size = opt_u64(&args, "max_size", DEFAULT_MAX_SIZE as u64) as usize;
    let min_score = args.get("min_score").and_then(Value::as_f64);

    let context: LookupContext = serde_json::from_value(args)
        .map_err(|e| Error::invalid_param("", "parse_error", e.to_string()))?;
    let signals = extract(&context);
    debug!(
        languages = signals.languages.len(),
        errors = signals.error_types.len(),
        "lookup signals extracted"
    );

    let hits = server
        .storage
        .lookup_patterns(&context.task, &facet_tags(&signals), &[], CANDIDATE_LIMIT)
        .await?;

    let ids: Vec<String> = hits.iter().map(|h| h.pattern.id.clone()).collect();
    let mut triggers = server.storage.get_triggers(&ids).await?;
    let metadata = server.storage.get_metadata(&ids).await?;

    // Vocabulary terms expand each candidate's keyword triggers, weighted
    // into the trigger priority.
    for (id, terms) in server.storage.get_vocab(&ids).await? {
        let expanded = terms.into_iter().map(|term| PatternTrigger {
            pattern_id: term.pattern_id,
            trigger_type: TriggerType::Keyword,
            trigger_value: term.term,
            priority: (term.weight * 10.0) as i64,
        });
        triggers.entry(id).or_default().extend(expanded);
    }

    let candidates: Vec<Candidate> = hits
        .into_iter()
        .map(|hit| Candidate {
            pattern: hit.pattern,
            fts_rank: hit.fts_rank,
        })
        .collect();

    let mut ranked = server.ranker.rank(
        candidates,
        &signals,
        &triggers,
        &metadata,
        &server.trust,
        Utc::now(),
    )?;
    if let Some(floor) = min_score {
        ranked.retain(|candidate| candidate.score >= floor);
    }

    let pack = PackBuilder::new(max_size).build(&ranked);
    let body = serde_json::to_value(&pack).map_err(Error::Serialization)?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_core::signals::FrameworkSignal;
    use serde_json::json;

    #[test]
    fn test_facet_tags_deduplicated_lowercase() {
        let signals = Signals {
            languages: vec!["typescript".to_string()],
            frameworks: vec![FrameworkSignal {
                name: "react".to_string(),
                version: Some("18".to_string()),
            }],
            error_types: vec!["SqliteError".to_string(), "sqliteerror".to_string()],
            ..Default::default()
        };
        assert_eq!(
            facet_tags(&signals),
            vec!["typescript", "react", "sqliteerror"]
        );
    }

    #[test]
    fn test_validator_rejects_long_task() {
        let issues = LOOKUP_VALIDATOR.check(&json!({"task": "x".repeat(1001)}));
        assert_eq!(issues[0].code, "too_long");
    }

    #[test]
    fn test_validator_rejects_small_budget() {
        let issues = LOOKUP_VALIDATOR.check(&json!({"task": "t", "max_size": 512}));
        assert_eq!(issues[0].code, "out_of_range");
    }
}
