//! Request validation: a small schema IR compiled to validators that
//! return issue lists as data, plus the shared sanitizers and pagination
//! helpers used across the tool surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result, ValidationIssue};

/// Maximum number of tags accepted on any request.
pub const MAX_TAGS: usize = 15;

/// Expected JSON type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }
}

/// A constraint attached to a field spec.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// String length in `[min, max]` chars
    Length { min: usize, max: usize },
    /// Numeric range in `[min, max]`
    Range { min: f64, max: f64 },
    /// Array length at most `max`
    MaxItems(usize),
    /// Value must be one of the listed strings
    OneOf(Vec<&'static str>),
}

/// Declarative description of one request field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Field name at the object root
    pub name: &'static str,
    /// Expected type
    pub field_type: FieldType,
    /// Whether the field must be present
    pub required: bool,
    /// Constraints checked when the field is present
    pub constraints: Vec<Constraint>,
}

impl FieldSpec {
    /// A required field with no constraints.
    #[must_use]
    pub fn required(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: true,
            constraints: Vec::new(),
        }
    }

    /// An optional field with no constraints.
    #[must_use]
    pub fn optional(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: false,
            constraints: Vec::new(),
        }
    }

    /// Attach a constraint.
    #[must_use]
    pub fn with(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}

/// A compiled validator over a list of field specs.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    fields: Vec<FieldSpec>,
}

impl Validator {
    /// Build a validator from field specs.
    #[must_use]
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Validate a request object, returning every issue found.
    #[must_use]
    pub fn check(&self, request: &Value) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let Some(object) = request.as_object() else {
            issues.push(ValidationIssue::new(
                "",
                "invalid_type",
                "request body must be a JSON object",
            ));
            return issues;
        };

        for field in &self.fields {
            let Some(value) = object.get(field.name) else {
                if field.required {
                    issues.push(ValidationIssue::new(
                        field.name,
                        "required",
                        format!("missing required field: {}", field.name),
                    ));
                }
                continue;
            };
            if value.is_null() {
                if field.required {
                    issues.push(ValidationIssue::new(
                        field.name,
                        "required",
                        format!("field must not be null: {}", field.name),
                    ));
                }
                continue;
            }
            if !field.field_type.matches(value) {
                issues.push(ValidationIssue::new(
                    field.name,
                    "invalid_type",
                    format!("expected {}", field.field_type.name()),
                ));
                continue;
            }
            for constraint in &field.constraints {
                check_constraint(field.name, constraint, value, &mut issues);
            }
        }
        issues
    }

    /// Validate and convert issues into an `InvalidParams` error.
    pub fn validate(&self, request: &Value) -> Result<()> {
        let issues = self.check(request);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidParams(issues))
        }
    }
}

fn check_constraint(
    name: &str,
    constraint: &Constraint,
    value: &Value,
    issues: &mut Vec<ValidationIssue>,
) {
    match constraint {
        Constraint::Length { min, max } => {
            if let Some(text) = value.as_str() {
                let length = text.chars().count();
                if length < *min {
                    issues.push(ValidationIssue::new(
                        name,
                        "too_short",
                        format!("must be at least {min} chars"),
                    ));
                } else if length > *max {
                    issues.push(ValidationIssue::new(
                        name,
                        "too_long",
                        format!("must be at most {max} chars"),
                    ));
                }
            }
        }
        Constraint::Range { min, max } => {
            if let Some(number) = value.as_f64() {
                if number < *min || number > *max {
                    issues.push(ValidationIssue::new(
                        name,
                        "out_of_range",
                        format!("must be between {min} and {max}"),
                    ));
                }
            }
        }
        Constraint::MaxItems(max) => {
            if let Some(array) = value.as_array() {
                if array.len() > *max {
                    issues.push(ValidationIssue::new(
                        name,
                        "too_many_items",
                        format!("must have at most {max} items"),
                    ));
                }
            }
        }
        Constraint::OneOf(allowed) => {
            if let Some(text) = value.as_str() {
                if !allowed.contains(&text) {
                    let suggestion = closest_match(text, allowed);
                    let mut message = format!(
                        "invalid value {text:?}; valid values are {}",
                        allowed.join(", ")
                    );
                    if let Some(best) = suggestion {
                        message.push_str(&format!("; did you mean {best:?}?"));
                    }
                    issues.push(ValidationIssue::new(name, "invalid_enum", message));
                }
            }
        }
    }
}

/// Find the closest allowed value to a rejected input.
///
/// Uses Sørensen–Dice bigram similarity: shared bigrams reward partial
/// token overlap, so `maybe-worked` lands on `worked-with-tweaks` rather
/// than on whatever shares a raw edit distance.
#[must_use]
pub fn closest_match(input: &str, allowed: &[&'static str]) -> Option<&'static str> {
    let input = input.trim().to_ascii_lowercase();
    if input.is_empty() {
        return None;
    }
    let mut best: Option<(&'static str, f64)> = None;
    for candidate in allowed {
        let score = strsim::sorensen_dice(&input, candidate);
        let better = match best {
            Some((_, best_score)) => score > best_score,
            None => true,
        };
        if better {
            best = Some((candidate, score));
        }
    }
    best.filter(|(_, score)| *score > 0.3).map(|(name, _)| name)
}

/// Sanitize one tag to lowercase `[a-z0-9-]+`.
///
/// Idempotent: sanitizing a sanitized tag returns it unchanged. Returns
/// `None` when nothing valid remains.
#[must_use]
pub fn sanitize_tag(tag: &str) -> Option<String> {
    let mut out = String::with_capacity(tag.len());
    let mut last_dash = false;
    for ch in tag.trim().to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            out.push(ch);
            last_dash = false;
        } else if (ch == '-' || ch == '_' || ch.is_whitespace()) && !last_dash && !out.is_empty()
        {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() { None } else { Some(out) }
}

/// Sanitize a tag list: invalid entries dropped, duplicates removed,
/// oversized lists truncated to [`MAX_TAGS`].
#[must_use]
pub fn sanitize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        if let Some(clean) = sanitize_tag(tag) {
            if !out.contains(&clean) {
                out.push(clean);
            }
        }
        if out.len() == MAX_TAGS {
            break;
        }
    }
    out
}

/// Pagination block carried on listing responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page: u64,
    pub page_size: u64,
    pub total_items: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Page {
    /// Build a pagination block from a 1-based page, page size, and total.
    ///
    /// Out-of-range pages produce an empty page with accurate totals.
    #[must_use]
    pub fn new(page: u64, page_size: u64, total_items: u64) -> Self {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let total_pages = total_items.div_ceil(page_size);
        Self {
            page,
            page_size,
            total_items,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1 && total_items > 0,
        }
    }

    /// Row offset for this page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.page_size
    }
}
