//! `apex_patterns_explain`: one pattern's trust state, guidance, and
//! relationships.

use chrono::Utc;
use serde_json::{Value, json};

use apex_core::error::Result;
use apex_core::types::pattern::PatternMetadataRecord;

use crate::server::{ApexServer, not_found};
use crate::server::tools::require_str;

/// Pull one metadata value by key.
fn metadata_value<'a>(records: &'a [PatternMetadataRecord], key: &str) -> Option<&'a Value> {
    records
        .iter()
        .find(|record| record.key == key)
        .map(|record| &record.value)
}

pub(crate) async fn handle_explain(server: &ApexServer, args: Value) -> Result<Value> {
    let reference = require_str(&args, "pattern_id")?;
    let pattern = server
        .storage
        .get_pattern(&reference)
        .await?
        .ok_or_else(|| not_found("pattern", &reference))?;

    let ids = vec![pattern.id.clone()];
    let metadata_map = server.storage.get_metadata(&ids).await?;
    let triggers_map = server.storage.get_triggers(&ids).await?;
    let vocab_map = server.storage.get_vocab(&ids).await?;
    let empty = Vec::new();
    let records = metadata_map.get(&pattern.id).unwrap_or(&empty);

    let trust = server.trust.score_from_parameters(
        pattern.pattern_type,
        pattern.alpha,
        pattern.beta,
        pattern.updated_at,
        false,
    )?;

    // Trigger-keyed error-fix guidance lives under error_fix_<trigger> /
    // error_code_<trigger> metadata keys.
    let error_fixes: Vec<Value> = records
        .iter()
        .filter(|record| {
            record.key.starts_with("error_fix_") || record.key.starts_with("error_code_")
        })
        .map(|record| json!({ "key": record.key, "value": record.value }))
        .collect();

    let triggers: Vec<Value> = triggers_map
        .get(&pattern.id)
        .map(|list| {
            list.iter()
                .map(|t| {
                    json!({
                        "type": t.trigger_type.as_str(),
                        "value": t.trigger_value,
                        "priority": t.priority,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let vocabulary: Vec<Value> = vocab_map
        .get(&pattern.id)
        .map(|terms| {
            terms
                .iter()
                .map(|t| {
                    json!({
                        "term": t.term,
                        "term_type": t.term_type,
                        "weight": t.weight,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let age_days = (Utc::now() - pattern.updated_at).num_days();
    Ok(json!({
        "pattern": {
            "id": pattern.id,
            "alias": pattern.alias,
            "type": pattern.pattern_type.as_str(),
            "title": pattern.title,
            "summary": pattern.summary,
            "tags": pattern.tags,
            "key_insight": pattern.key_insight,
            "when_to_use": pattern.when_to_use,
            "json_canonical": pattern.json_canonical,
            "invalid": pattern.invalid,
            "usage_count": pattern.usage_count,
            "success_count": pattern.success_count,
            "updated_days_ago": age_days,
        },
        "trust": {
            "value": trust.value,
            "confidence": trust.confidence,
            "samples": trust.samples,
            "interval": trust.interval,
            "wilson_lower": trust.wilson_lower,
            "alpha": trust.alpha,
            "beta": trust.beta,
        },
        "usage_guidance": metadata_value(records, "usage_guidance"),
        "common_mistakes": metadata_value(records, "common_mistakes"),
        "related_patterns": metadata_value(records, "related_patterns"),
        "complementary_patterns": metadata_value(records, "complementary_patterns"),
        "error_fixes": error_fixes,
        "triggers": triggers,
        "vocabulary": vocabulary,
    }))
}
