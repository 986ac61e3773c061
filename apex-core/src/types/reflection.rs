//! Reflection events, evidence claims, and audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::pattern::PatternType;

/// Overall outcome of a reflected task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReflectionOutcome {
    Success,
    Partial,
    Failure,
}

impl ReflectionOutcome {
    /// Wire representation of this outcome
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ReflectionOutcome::Success => "success",
            ReflectionOutcome::Partial => "partial",
            ReflectionOutcome::Failure => "failure",
        }
    }

    /// Parse a wire representation.
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "success" => Ok(ReflectionOutcome::Success),
            "partial" => Ok(ReflectionOutcome::Partial),
            "failure" => Ok(ReflectionOutcome::Failure),
            other => Err(Error::invalid_param(
                "outcome",
                "invalid_enum",
                format!("unknown outcome: {other}; valid values are success, partial, failure"),
            )),
        }
    }
}

/// Natural-language trust outcome aliases accepted in `trust_updates`.
///
/// Each alias maps onto a fixed `(delta_alpha, delta_beta)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustOutcome {
    #[serde(rename = "worked-perfectly")]
    WorkedPerfectly,
    #[serde(rename = "worked-with-tweaks")]
    WorkedWithTweaks,
    #[serde(rename = "partial-success")]
    PartialSuccess,
    #[serde(rename = "failed-minor-issues")]
    FailedMinorIssues,
    #[serde(rename = "failed-completely")]
    FailedCompletely,
}

impl TrustOutcome {
    /// All aliases, in descending success order.
    pub const ALL: [TrustOutcome; 5] = [
        TrustOutcome::WorkedPerfectly,
        TrustOutcome::WorkedWithTweaks,
        TrustOutcome::PartialSuccess,
        TrustOutcome::FailedMinorIssues,
        TrustOutcome::FailedCompletely,
    ];

    /// Wire representation of this alias
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustOutcome::WorkedPerfectly => "worked-perfectly",
            TrustOutcome::WorkedWithTweaks => "worked-with-tweaks",
            TrustOutcome::PartialSuccess => "partial-success",
            TrustOutcome::FailedMinorIssues => "failed-minor-issues",
            TrustOutcome::FailedCompletely => "failed-completely",
        }
    }

    /// Parse a wire representation. The error message enumerates the valid
    /// aliases; closest-match suggestion is layered on by the validator.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "worked-perfectly" => Ok(TrustOutcome::WorkedPerfectly),
            "worked-with-tweaks" => Ok(TrustOutcome::WorkedWithTweaks),
            "partial-success" => Ok(TrustOutcome::PartialSuccess),
            "failed-minor-issues" => Ok(TrustOutcome::FailedMinorIssues),
            "failed-completely" => Ok(TrustOutcome::FailedCompletely),
            other => Err(Error::invalid_param(
                "outcome",
                "invalid_enum",
                format!(
                    "unknown trust outcome: {other}; valid values are {}",
                    TrustOutcome::ALL
                        .iter()
                        .map(TrustOutcome::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            )),
        }
    }

    /// The `(delta_alpha, delta_beta)` this alias applies.
    #[must_use]
    pub fn deltas(&self) -> (f64, f64) {
        match self {
            TrustOutcome::WorkedPerfectly => (1.0, 0.0),
            TrustOutcome::WorkedWithTweaks => (0.7, 0.3),
            TrustOutcome::PartialSuccess => (0.5, 0.5),
            TrustOutcome::FailedMinorIssues => (0.3, 0.7),
            TrustOutcome::FailedCompletely => (0.0, 1.0),
        }
    }

    /// Whether this alias counts toward `success_count`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TrustOutcome::WorkedPerfectly | TrustOutcome::WorkedWithTweaks
        )
    }
}

/// A single evidence item supporting a reflection claim.
///
/// `sha` may be the literal `HEAD` to refer to the working tree; any other
/// value must be a full 40-hex commit SHA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    /// A line range in a file at a specific revision
    GitLines {
        file: String,
        sha: String,
        start: u64,
        end: u64,
    },
    /// A commit reference
    Commit { sha: String },
    /// A pull request reference
    Pr { number: u64, repo: String },
    /// A CI run reference
    CiRun { id: String, provider: String },
}

/// Reference to a task inside a reflection request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRef {
    /// Task identifier
    pub id: String,
    /// Task title (informational)
    #[serde(default)]
    pub title: String,
}

/// A claim that a pattern was applied during the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternUsage {
    /// Pattern id or alias
    pub pattern_id: String,
    /// Supporting evidence; at least one item required
    pub evidence: Vec<Evidence>,
    /// Optional application notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A requested trust adjustment for one pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustUpdate {
    /// Pattern id or alias
    pub pattern_id: String,
    /// Natural-language outcome alias
    pub outcome: String,
}

/// Specification of a pattern to create from a reflection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPatternSpec {
    /// Pattern title
    pub title: String,
    /// Pattern summary
    pub summary: String,
    /// Pattern category; defaults by claim kind (`CODEBASE` for new,
    /// `ANTI` for anti patterns)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub pattern_type: Option<PatternType>,
    /// Code snippets carried into `json_canonical`
    #[serde(default)]
    pub snippets: Vec<serde_json::Value>,
    /// Tags (sanitized on insert)
    #[serde(default)]
    pub tags: Vec<String>,
    /// Supporting evidence
    #[serde(default)]
    pub evidence: Vec<Evidence>,
}

/// A free-standing learning captured by the reflection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Learning {
    /// The assertion learned
    pub assertion: String,
    /// Supporting evidence
    #[serde(default)]
    pub evidence: Vec<Evidence>,
}

/// The claims payload of a reflection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Patterns applied during the task
    #[serde(default)]
    pub patterns_used: Vec<PatternUsage>,
    /// Trust adjustments
    #[serde(default)]
    pub trust_updates: Vec<TrustUpdate>,
    /// Patterns to create
    #[serde(default)]
    pub new_patterns: Vec<NewPatternSpec>,
    /// Anti-patterns to create
    #[serde(default)]
    pub anti_patterns: Vec<NewPatternSpec>,
    /// Free-standing learnings
    #[serde(default)]
    pub learnings: Vec<Learning>,
}

impl Claims {
    /// Whether the claims payload carries no work at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns_used.is_empty()
            && self.trust_updates.is_empty()
            && self.new_patterns.is_empty()
            && self.anti_patterns.is_empty()
            && self.learnings.is_empty()
    }
}

/// Build artifacts accompanying a reflection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReflectionArtifacts {
    /// Commit subjects/shas available to the pattern miner
    #[serde(default)]
    pub commits: Vec<String>,
}

/// A stored reflection event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    /// Reflection row id
    pub id: String,
    /// Reflected task
    pub task_id: String,
    /// Content hash over `(task_id, claims)` used for idempotence
    pub content_hash: String,
    /// Overall outcome
    pub outcome: ReflectionOutcome,
    /// Claims payload as received
    pub claims: Claims,
    /// Accompanying artifacts
    #[serde(default)]
    pub artifacts: ReflectionArtifacts,
    /// When the reflection was received
    pub received_at: DateTime<Utc>,
}

/// Kind of audit event written for traceability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// A pattern was used by a task
    PatternUsed,
    /// A pattern was created
    PatternCreated,
    /// A pattern's trust parameters changed
    TrustUpdated,
    /// A pattern was quarantined
    PatternQuarantined,
}

impl AuditKind {
    /// Wire representation of this kind
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::PatternUsed => "pattern_used",
            AuditKind::PatternCreated => "pattern_created",
            AuditKind::TrustUpdated => "trust_updated",
            AuditKind::PatternQuarantined => "pattern_quarantined",
        }
    }

    /// Parse a wire representation.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "pattern_used" => Ok(AuditKind::PatternUsed),
            "pattern_created" => Ok(AuditKind::PatternCreated),
            "trust_updated" => Ok(AuditKind::TrustUpdated),
            "pattern_quarantined" => Ok(AuditKind::PatternQuarantined),
            other => Err(Error::InvalidState(format!(
                "unknown audit kind: {other}"
            ))),
        }
    }
}

/// An audit trail entry for trust changes, pattern creation, and quarantines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Task the event belongs to
    pub task_id: String,
    /// Event kind
    pub kind: AuditKind,
    /// Pattern involved, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<String>,
    /// Event details blob
    #[serde(default)]
    pub details: serde_json::Value,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_outcome_deltas() {
        assert_eq!(TrustOutcome::WorkedPerfectly.deltas(), (1.0, 0.0));
        assert_eq!(TrustOutcome::PartialSuccess.deltas(), (0.5, 0.5));
        assert_eq!(TrustOutcome::FailedCompletely.deltas(), (0.0, 1.0));
    }

    #[test]
    fn test_trust_outcome_parse_lists_valid_values() {
        let err = TrustOutcome::parse("maybe-worked").unwrap_err();
        let msg = err.to_string();
        for alias in TrustOutcome::ALL {
            assert!(msg.contains(alias.as_str()), "missing {}", alias.as_str());
        }
    }

    #[test]
    fn test_evidence_serde_tagging() {
        let ev = Evidence::GitLines {
            file: "a.ts".to_string(),
            sha: "HEAD".to_string(),
            start: 1,
            end: 2,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["kind"], "git_lines");
        let back: Evidence = serde_json::from_value(json).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn test_empty_claims() {
        assert!(Claims::default().is_empty());
    }
}
