//! Common entity types shared across the APEX system.

pub mod pattern;
pub mod reflection;
pub mod task;

pub use pattern::{
    Pattern, PatternMetadataRecord, PatternTrigger, PatternType, PatternVocabTerm, TriggerType,
};
pub use reflection::{
    AuditEvent, AuditKind, Claims, Evidence, Learning, NewPatternSpec, PatternUsage, Reflection,
    ReflectionArtifacts, ReflectionOutcome, TaskRef, TrustOutcome, TrustUpdate,
};
pub use task::{
    Checkpoint, EvidenceType, Phase, PhaseHandoff, Task, TaskBrief, TaskEvidence, TaskStatus,
    TaskType,
};
