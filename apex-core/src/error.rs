//! Error types for the APEX pattern-knowledge system.

use serde::{Deserialize, Serialize};

/// Result type alias for APEX operations
pub type Result<T> = std::result::Result<T, Error>;

/// Stable machine-readable error codes surfaced on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Request failed schema validation
    InvalidParams,
    /// Referenced task or pattern absent
    NotFound,
    /// Token bucket empty
    RateLimited,
    /// Attempted transition or completion from the wrong phase
    PhaseViolation,
    /// Constraint breach (duplicate alias, negative trust, quarantined write)
    InvalidState,
    /// Operation-specific failure
    ToolExecution,
    /// Unexpected storage or computation error
    Internal,
}

impl ErrorCode {
    /// Wire representation of this code
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidParams => "INVALID_PARAMS",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::PhaseViolation => "PHASE_VIOLATION",
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::ToolExecution => "TOOL_EXECUTION",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// A single schema validation failure, kept as data so callers can
/// correct and retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// JSON path of the offending field (e.g. `claims.trust_updates[0].outcome`)
    pub path: String,
    /// Short machine code (e.g. `too_long`, `invalid_enum`)
    pub code: String,
    /// Human-readable description
    pub message: String,
}

impl ValidationIssue {
    /// Create a new validation issue
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Error types for APEX operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid parameters: {}", summarize_issues(.0))]
    InvalidParams(Vec<ValidationIssue>),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("phase violation: {0}")]
    PhaseViolation(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("tool execution failed: {0}")]
    ToolExecution(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error onto its stable wire code.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidParams(_) => ErrorCode::InvalidParams,
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::RateLimited(_) => ErrorCode::RateLimited,
            Error::PhaseViolation(_) => ErrorCode::PhaseViolation,
            Error::InvalidState(_) => ErrorCode::InvalidState,
            Error::ToolExecution(_) => ErrorCode::ToolExecution,
            Error::Storage(_) | Error::Serialization(_) | Error::Internal(_) => {
                ErrorCode::Internal
            }
        }
    }

    /// Validation issues carried by an `InvalidParams` error, if any.
    #[must_use]
    pub fn issues(&self) -> Option<&[ValidationIssue]> {
        match self {
            Error::InvalidParams(issues) => Some(issues),
            _ => None,
        }
    }

    /// Single-issue convenience constructor.
    #[must_use]
    pub fn invalid_param(
        path: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::InvalidParams(vec![ValidationIssue::new(path, code, message)])
    }
}

fn summarize_issues(issues: &[ValidationIssue]) -> String {
    if issues.is_empty() {
        return "schema validation failed".to_string();
    }
    issues
        .iter()
        .map(|i| format!("{}: {}", i.path, i.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            Error::NotFound("PAT:X".to_string()).code().as_str(),
            "NOT_FOUND"
        );
        assert_eq!(
            Error::Storage("disk full".to_string()).code().as_str(),
            "INTERNAL"
        );
        assert_eq!(
            Error::PhaseViolation("complete from BUILDER".to_string())
                .code()
                .as_str(),
            "PHASE_VIOLATION"
        );
    }

    #[test]
    fn test_invalid_params_carries_issues() {
        let err = Error::invalid_param("task", "too_long", "exceeds 1000 chars");
        let issues = err.issues().unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "task");
        assert!(err.to_string().contains("exceeds 1000 chars"));
    }
}
