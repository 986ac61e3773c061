//! `apex_patterns_overview`: paginated filtered listing with statistics.

use serde_json::{Value, json};
use std::sync::LazyLock;

use apex_core::error::Result;
use apex_core::types::pattern::PatternType;
use apex_core::validation::{Constraint, FieldSpec, FieldType, Page, Validator, sanitize_tags};

use crate::server::ApexServer;
use apex_storage::{PatternFilter, PatternOrder};

use crate::server::tools::{opt_f64, opt_str, opt_u64, str_list};

static OVERVIEW_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    Validator::new(vec![
        FieldSpec::optional("page", FieldType::Integer)
            .with(Constraint::Range { min: 1.0, max: 1e9 }),
        FieldSpec::optional("page_size", FieldType::Integer)
            .with(Constraint::Range { min: 1.0, max: 100.0 }),
        FieldSpec::optional("min_trust", FieldType::Number)
            .with(Constraint::Range { min: 0.0, max: 1.0 }),
        FieldSpec::optional("status", FieldType::String).with(Constraint::OneOf(vec![
            "active",
            "quarantined",
            "all",
        ])),
        FieldSpec::optional("order", FieldType::String)
            .with(Constraint::OneOf(vec!["asc", "desc"])),
        FieldSpec::optional("types", FieldType::Array),
        FieldSpec::optional("tags", FieldType::Array).with(Constraint::MaxItems(15)),
    ])
});

pub(crate) async fn handle_overview(server: &ApexServer, args: Value) -> Result<Value> {
    OVERVIEW_VALIDATOR.validate(&args)?;

    let page_number = opt_u64(&args, "page", 1).max(1);
    // Accept both snake_case spellings seen in the wild.
    let page_size = args
        .get("page_size")
        .or_else(|| args.get("pageSize"))
        .and_then(Value::as_u64)
        .unwrap_or(50)
        .clamp(1, 100);

    let types: Vec<PatternType> = str_list(&args, "types")
        .iter()
        .map(|raw| PatternType::parse(raw))
        .collect::<Result<_>>()?;
    let valid = match opt_str(&args, "status").as_deref() {
        Some("quarantined") => Some(false),
        Some("all") => None,
        // Default listing hides quarantined patterns.
        _ => Some(true),
    };
    let filter = PatternFilter {
        types,
        min_trust: opt_f64(&args, "min_trust"),
        tags: sanitize_tags(&str_list(&args, "tags")),
        valid,
    };

    let order = opt_str(&args, "order_by")
        .map_or(PatternOrder::TrustScore, |raw| PatternOrder::parse(&raw));
    let descending = opt_str(&args, "order").as_deref() != Some("asc");

    let total_items = server.storage.count_patterns(&filter).await?;
    let page = Page::new(page_number, page_size, total_items);
    let patterns = server
        .storage
        .list_patterns(&filter, order, descending, page.page_size, page.offset())
        .await?;
    let statistics = server.storage.aggregate_stats(&filter).await?;

    let rows: Vec<Value> = patterns
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "alias": p.alias,
                "type": p.pattern_type.as_str(),
                "title": p.title,
                "summary": p.summary,
                "tags": p.tags,
                "trust_score": p.trust_score,
                "usage_count": p.usage_count,
                "invalid": p.invalid,
                "updated_at": p.updated_at.to_rfc3339(),
            })
        })
        .collect();

    Ok(json!({
        "patterns": rows,
        "pagination": page,
        "statistics": statistics,
    }))
}
