//! Task lifecycle entities: phases, evidence, checkpoints, and briefs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Category of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Bug,
    Feature,
    Refactor,
    Test,
    Docs,
    Perf,
}

impl TaskType {
    /// All task types, in stable order.
    pub const ALL: [TaskType; 6] = [
        TaskType::Bug,
        TaskType::Feature,
        TaskType::Refactor,
        TaskType::Test,
        TaskType::Docs,
        TaskType::Perf,
    ];

    /// Wire representation of this task type
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Bug => "bug",
            TaskType::Feature => "feature",
            TaskType::Refactor => "refactor",
            TaskType::Test => "test",
            TaskType::Docs => "docs",
            TaskType::Perf => "perf",
        }
    }

    /// Parse a wire representation, case-insensitively.
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "bug" => Ok(TaskType::Bug),
            "feature" => Ok(TaskType::Feature),
            "refactor" => Ok(TaskType::Refactor),
            "test" => Ok(TaskType::Test),
            "docs" => Ok(TaskType::Docs),
            "perf" => Ok(TaskType::Perf),
            other => Err(Error::invalid_param(
                "task_type",
                "invalid_enum",
                format!("unknown task type: {other}"),
            )),
        }
    }
}

/// Task execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Completed,
    Failed,
    Blocked,
}

impl TaskStatus {
    /// Wire representation of this status
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Active => "active",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Blocked => "blocked",
        }
    }

    /// Parse a wire representation.
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "active" => Ok(TaskStatus::Active),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "blocked" => Ok(TaskStatus::Blocked),
            other => Err(Error::invalid_param(
                "status",
                "invalid_enum",
                format!("unknown task status: {other}"),
            )),
        }
    }
}

/// Workflow phase of a task.
///
/// Phases form a strict forward order; a task may only return to an
/// earlier phase through an explicit update carrying a handoff entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Architect,
    Builder,
    Validator,
    Reviewer,
    Documenter,
}

impl Phase {
    /// All phases, in lifecycle order.
    pub const ALL: [Phase; 5] = [
        Phase::Architect,
        Phase::Builder,
        Phase::Validator,
        Phase::Reviewer,
        Phase::Documenter,
    ];

    /// Position of this phase in the lifecycle order.
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            Phase::Architect => 0,
            Phase::Builder => 1,
            Phase::Validator => 2,
            Phase::Reviewer => 3,
            Phase::Documenter => 4,
        }
    }

    /// The next phase in forward order, if any.
    #[must_use]
    pub fn next(&self) -> Option<Phase> {
        Phase::ALL.get(self.rank() as usize + 1).copied()
    }

    /// Whether a transition from `self` to `to` moves forward exactly one
    /// step. Backward moves require an explicit handoff and are checked
    /// separately.
    #[must_use]
    pub fn is_forward_step(&self, to: Phase) -> bool {
        to.rank() == self.rank() + 1
    }

    /// Wire representation of this phase
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Architect => "ARCHITECT",
            Phase::Builder => "BUILDER",
            Phase::Validator => "VALIDATOR",
            Phase::Reviewer => "REVIEWER",
            Phase::Documenter => "DOCUMENTER",
        }
    }

    /// Parse a wire representation, case-insensitively.
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_uppercase().as_str() {
            "ARCHITECT" => Ok(Phase::Architect),
            "BUILDER" => Ok(Phase::Builder),
            "VALIDATOR" => Ok(Phase::Validator),
            "REVIEWER" => Ok(Phase::Reviewer),
            "DOCUMENTER" => Ok(Phase::Documenter),
            other => Err(Error::invalid_param(
                "phase",
                "invalid_enum",
                format!("unknown phase: {other}"),
            )),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only checkpoint line in a task's `in_flight` log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Free-text progress note
    pub message: String,
    /// Optional confidence at checkpoint time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// When the checkpoint was recorded
    pub timestamp: DateTime<Utc>,
}

/// One entry in a task's ordered phase-handoff log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseHandoff {
    /// Phase being handed off from
    pub phase: Phase,
    /// Handoff summary written by the outgoing phase
    pub handoff: String,
    /// When the handoff was recorded
    pub timestamp: DateTime<Utc>,
}

/// Structured brief derived from a task's intent at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskBrief {
    /// One-line summary, at most 50 chars (ellipsized)
    pub tl_dr: String,
    /// Concrete objectives (populated by the enhancement pass)
    #[serde(default)]
    pub objectives: Vec<String>,
    /// Plan steps
    #[serde(default)]
    pub plan: Vec<String>,
    /// Known constraints
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Placeholder for a generated test scaffold
    pub test_scaffold: String,
}

/// An in-progress or completed work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Opaque unique identifier
    pub id: String,
    /// Optional external identifier (issue key, ticket id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Short task title
    pub title: String,
    /// What the caller intends to do
    pub intent: String,
    /// Task category
    pub task_type: TaskType,
    /// Sanitized tags, at most 15
    #[serde(default)]
    pub tags: Vec<String>,
    /// Execution status
    pub status: TaskStatus,
    /// Current workflow phase
    pub phase: Phase,
    /// Caller-reported confidence in [0, 1]
    pub confidence: f64,
    /// Files touched so far
    #[serde(default)]
    pub files_touched: Vec<String>,
    /// Errors encountered so far
    #[serde(default)]
    pub errors_encountered: Vec<String>,
    /// Ordered checkpoint log
    #[serde(default)]
    pub in_flight: Vec<Checkpoint>,
    /// Ordered phase-handoff log
    #[serde(default)]
    pub phase_handoffs: Vec<PhaseHandoff>,
    /// Structured brief
    pub brief: TaskBrief,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Whether the task may be completed from its current phase.
    #[must_use]
    pub fn can_complete(&self) -> bool {
        self.phase == Phase::Documenter
    }

    /// Validate a phase transition request.
    ///
    /// Forward moves must advance exactly one step. Backward moves are
    /// permitted only when a handoff entry accompanies them.
    pub fn check_transition(&self, to: Phase, handoff: Option<&str>) -> Result<()> {
        if to == self.phase {
            return Ok(());
        }
        if self.phase.is_forward_step(to) {
            return Ok(());
        }
        if to.rank() < self.phase.rank() {
            if handoff.is_some() {
                return Ok(());
            }
            return Err(Error::PhaseViolation(format!(
                "returning from {} to {} requires a handoff entry",
                self.phase, to
            )));
        }
        Err(Error::PhaseViolation(format!(
            "illegal transition from {} to {}",
            self.phase, to
        )))
    }
}

/// Kind of evidence appended to a task log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceType {
    File,
    Pattern,
    Error,
    Decision,
    Learning,
}

impl EvidenceType {
    /// Wire representation of this evidence type
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceType::File => "file",
            EvidenceType::Pattern => "pattern",
            EvidenceType::Error => "error",
            EvidenceType::Decision => "decision",
            EvidenceType::Learning => "learning",
        }
    }

    /// Parse a wire representation.
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "file" => Ok(EvidenceType::File),
            "pattern" => Ok(EvidenceType::Pattern),
            "error" => Ok(EvidenceType::Error),
            "decision" => Ok(EvidenceType::Decision),
            "learning" => Ok(EvidenceType::Learning),
            other => Err(Error::invalid_param(
                "type",
                "invalid_enum",
                format!("unknown evidence type: {other}"),
            )),
        }
    }
}

/// Append-only evidence row attached to a task, ordered by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvidence {
    /// Evidence row id
    pub id: String,
    /// Owning task
    pub task_id: String,
    /// Evidence kind
    #[serde(rename = "type")]
    pub evidence_type: EvidenceType,
    /// Free-form content
    pub content: String,
    /// Opaque metadata blob
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// When the evidence was appended
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_in_phase(phase: Phase) -> Task {
        Task {
            id: "T_test001".to_string(),
            identifier: None,
            title: "t".to_string(),
            intent: "i".to_string(),
            task_type: TaskType::Feature,
            tags: vec![],
            status: TaskStatus::Active,
            phase,
            confidence: 0.5,
            files_touched: vec![],
            errors_encountered: vec![],
            in_flight: vec![],
            phase_handoffs: vec![],
            brief: TaskBrief {
                tl_dr: "t".to_string(),
                objectives: vec![],
                plan: vec![],
                constraints: vec![],
                test_scaffold: String::new(),
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_phase_order_is_total() {
        let ranks: Vec<u8> = Phase::ALL.iter().map(Phase::rank).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3, 4]);
        assert_eq!(Phase::Architect.next(), Some(Phase::Builder));
        assert_eq!(Phase::Documenter.next(), None);
    }

    #[test]
    fn test_forward_step_allowed() {
        let task = task_in_phase(Phase::Builder);
        assert!(task.check_transition(Phase::Validator, None).is_ok());
    }

    #[test]
    fn test_phase_skip_rejected() {
        let task = task_in_phase(Phase::Architect);
        let err = task.check_transition(Phase::Reviewer, None).unwrap_err();
        assert!(matches!(err, Error::PhaseViolation(_)));
    }

    #[test]
    fn test_backward_requires_handoff() {
        let task = task_in_phase(Phase::Validator);
        assert!(task.check_transition(Phase::Builder, None).is_err());
        assert!(task
            .check_transition(Phase::Builder, Some("tests exposed a design gap"))
            .is_ok());
    }

    #[test]
    fn test_complete_only_from_documenter() {
        assert!(!task_in_phase(Phase::Builder).can_complete());
        assert!(task_in_phase(Phase::Documenter).can_complete());
    }
}
