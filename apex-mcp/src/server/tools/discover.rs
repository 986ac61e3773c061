//! `apex_patterns_discover`: natural-language pattern search.

use serde_json::{Value, json};
use std::sync::LazyLock;

use apex_core::error::Result;
use apex_core::types::pattern::PatternType;
use apex_core::validation::{Constraint, FieldSpec, FieldType, Validator, sanitize_tags};

use crate::server::ApexServer;
use crate::server::tools::{opt_f64, opt_u64, require_str, str_list};

static DISCOVER_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    Validator::new(vec![
        FieldSpec::required("query", FieldType::String)
            .with(Constraint::Length { min: 3, max: 500 }),
        FieldSpec::optional("max_results", FieldType::Integer)
            .with(Constraint::Range { min: 1.0, max: 50.0 }),
        FieldSpec::optional("min_trust", FieldType::Number)
            .with(Constraint::Range { min: 0.0, max: 1.0 }),
        FieldSpec::optional("types", FieldType::Array),
        FieldSpec::optional("tags", FieldType::Array).with(Constraint::MaxItems(15)),
    ])
});

pub(crate) async fn handle_discover(server: &ApexServer, args: Value) -> Result<Value> {
    DISCOVER_VALIDATOR.validate(&args)?;

    let query = require_str(&args, "query")?;
    let max_results = opt_u64(&args, "max_results", 10).clamp(1, 50);
    let min_trust = opt_f64(&args, "min_trust");

    let types: Vec<PatternType> = str_list(&args, "types")
        .iter()
        .map(|raw| PatternType::parse(raw))
        .collect::<Result<_>>()?;
    let tags = sanitize_tags(&str_list(&args, "tags"));

    let hits = server
        .storage
        .search_patterns(&query, &types, &tags, max_results)
        .await?;

    let patterns: Vec<Value> = hits
        .iter()
        .filter(|hit| min_trust.is_none_or(|floor| hit.pattern.trust_score >= floor))
        .map(|hit| {
            let p = &hit.pattern;
            json!({
                "id": p.id,
                "alias": p.alias,
                "type": p.pattern_type.as_str(),
                "title": p.title,
                "summary": p.summary,
                "tags": p.tags,
                "trust_score": p.trust_score,
                "fts_rank": hit.fts_rank,
            })
        })
        .collect();

    Ok(json!({
        "query": query,
        "total": patterns.len(),
        "patterns": patterns,
    }))
}
