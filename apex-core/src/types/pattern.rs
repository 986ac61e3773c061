//! Pattern entity and its auxiliary records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Category of a stored pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternType {
    /// Repository-specific convention or structure
    Codebase,
    /// Language-level idiom
    Lang,
    /// Known-bad approach to avoid
    Anti,
    /// Recurring failure mode and its signature
    Failure,
    /// Team or org policy
    Policy,
    /// Testing technique
    Test,
    /// Migration recipe
    Migration,
}

impl PatternType {
    /// All pattern types, in stable order.
    pub const ALL: [PatternType; 7] = [
        PatternType::Codebase,
        PatternType::Lang,
        PatternType::Anti,
        PatternType::Failure,
        PatternType::Policy,
        PatternType::Test,
        PatternType::Migration,
    ];

    /// Wire representation of this type
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::Codebase => "CODEBASE",
            PatternType::Lang => "LANG",
            PatternType::Anti => "ANTI",
            PatternType::Failure => "FAILURE",
            PatternType::Policy => "POLICY",
            PatternType::Test => "TEST",
            PatternType::Migration => "MIGRATION",
        }
    }

    /// Parse a wire representation, case-insensitively.
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_uppercase().as_str() {
            "CODEBASE" => Ok(PatternType::Codebase),
            "LANG" => Ok(PatternType::Lang),
            "ANTI" => Ok(PatternType::Anti),
            "FAILURE" => Ok(PatternType::Failure),
            "POLICY" => Ok(PatternType::Policy),
            "TEST" => Ok(PatternType::Test),
            "MIGRATION" => Ok(PatternType::Migration),
            other => Err(Error::invalid_param(
                "type",
                "invalid_enum",
                format!("unknown pattern type: {other}"),
            )),
        }
    }
}

impl std::fmt::Display for PatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reusable piece of engineering knowledge with attached trust state.
///
/// Patterns are never deleted; administrative quarantine sets `invalid`
/// and the storage layer rejects further writes until the flag is cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Opaque unique identifier (at least 8 chars)
    pub id: String,
    /// Optional human-readable alias, unique when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Pattern category
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    /// Short title
    pub title: String,
    /// One-paragraph summary
    pub summary: String,
    /// Authoritative structured form including code snippets
    pub json_canonical: serde_json::Value,
    /// Sanitized lowercase tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Derived projection of `(alpha, beta)` at last update
    pub trust_score: f64,
    /// Beta distribution success parameter (>= 1)
    pub alpha: f64,
    /// Beta distribution failure parameter (>= 1)
    pub beta: f64,
    /// Number of recorded applications
    pub usage_count: u64,
    /// Number of successful applications (<= `usage_count`)
    pub success_count: u64,
    /// Quarantine flag
    #[serde(default)]
    pub invalid: bool,
    /// The one thing to remember about this pattern
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_insight: Option<String>,
    /// Guidance on when to reach for this pattern
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when_to_use: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Pattern {
    /// Create a fresh pattern with uniform trust priors.
    #[must_use]
    pub fn new(id: String, pattern_type: PatternType, title: String, summary: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            alias: None,
            pattern_type,
            title,
            summary,
            json_canonical: serde_json::json!({}),
            tags: Vec::new(),
            trust_score: 0.5,
            alpha: 1.0,
            beta: 1.0,
            usage_count: 0,
            success_count: 0,
            invalid: false,
            key_insight: None,
            when_to_use: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// File paths referenced by this pattern's canonical snippets.
    ///
    /// Used for locality scoring against request paths.
    #[must_use]
    pub fn snippet_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        if let Some(snippets) = self.json_canonical.get("snippets").and_then(|v| v.as_array()) {
            for snippet in snippets {
                if let Some(file) = snippet.get("file").and_then(|v| v.as_str()) {
                    if !paths.iter().any(|p| p == file) {
                        paths.push(file.to_string());
                    }
                }
            }
        }
        paths
    }

    /// First code snippet body, if the canonical form carries one.
    #[must_use]
    pub fn first_snippet(&self) -> Option<&str> {
        self.json_canonical
            .get("snippets")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|s| s.get("code"))
            .and_then(|v| v.as_str())
    }

    /// Check the structural invariants persisted rows must satisfy.
    pub fn check_invariants(&self) -> Result<()> {
        if !self.alpha.is_finite() || !self.beta.is_finite() {
            return Err(Error::InvalidState(format!(
                "non-finite trust parameters for pattern {}",
                self.id
            )));
        }
        if self.alpha < 1.0 || self.beta < 1.0 {
            return Err(Error::InvalidState(format!(
                "trust parameters below prior for pattern {}: alpha={}, beta={}",
                self.id, self.alpha, self.beta
            )));
        }
        if !(0.0..=1.0).contains(&self.trust_score) {
            return Err(Error::InvalidState(format!(
                "trust score out of range for pattern {}: {}",
                self.id, self.trust_score
            )));
        }
        if self.success_count > self.usage_count {
            return Err(Error::InvalidState(format!(
                "success count exceeds usage count for pattern {}",
                self.id
            )));
        }
        Ok(())
    }
}

/// Typed key/value metadata attached to a pattern.
///
/// Well-known keys: `usage_guidance`, `common_mistakes`, `related_patterns`,
/// `complementary_patterns`, `error_fix_<trigger>`, `error_code_<trigger>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMetadataRecord {
    /// Owning pattern
    pub pattern_id: String,
    /// Metadata key
    pub key: String,
    /// String or small structured blob, stored as JSON
    pub value: serde_json::Value,
}

/// Kind of retrieval trigger attached to a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    /// Matches extracted error types/codes
    Error,
    /// Matches task description scenarios
    Scenario,
    /// Matches task keywords
    Keyword,
}

impl TriggerType {
    /// Wire representation of this trigger type
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Error => "error",
            TriggerType::Scenario => "scenario",
            TriggerType::Keyword => "keyword",
        }
    }

    /// Parse a wire representation.
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "error" => Ok(TriggerType::Error),
            "scenario" => Ok(TriggerType::Scenario),
            "keyword" => Ok(TriggerType::Keyword),
            other => Err(Error::invalid_param(
                "trigger_type",
                "invalid_enum",
                format!("unknown trigger type: {other}"),
            )),
        }
    }
}

/// A retrieval trigger, ordered by descending priority at fetch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternTrigger {
    /// Owning pattern
    pub pattern_id: String,
    /// Trigger kind
    pub trigger_type: TriggerType,
    /// Value to match against extracted signals
    pub trigger_value: String,
    /// Match priority (higher wins)
    pub priority: i64,
}

/// A weighted vocabulary term used for semantic expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternVocabTerm {
    /// Owning pattern
    pub pattern_id: String,
    /// Expansion term
    pub term: String,
    /// Term category (`verb`, `noun`, `concept`, ...)
    pub term_type: String,
    /// Expansion weight
    pub weight: f64,
}
