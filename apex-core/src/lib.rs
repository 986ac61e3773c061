#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_docs_in_private_items)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::float_cmp)]

//! # APEX Core
//!
//! Core types and pure logic for the APEX pattern-knowledge service.
//!
//! ## Core Concepts
//!
//! - **Patterns**: Reusable pieces of engineering knowledge with attached
//!   trust state, triggers, vocabulary, and metadata
//! - **Trust**: A Beta-Bernoulli model over each pattern's success
//!   probability, with time decay and credible intervals
//! - **Signals**: Structured request context extracted from free-form
//!   lookup requests
//! - **Ranking**: Multi-signal scoring of candidate patterns
//! - **Packs**: Size-bounded ranked responses
//! - **Tasks**: Work items moving through a phase machine with append-only
//!   evidence and checkpoint logs
//! - **Reflections**: Post-task records carrying evidence-backed claims
//!   that adjust pattern trust
//!
//! ## Module Organization
//!
//! - [`types`]: Entity types shared across the system
//! - [`trust`]: The Beta-Bernoulli trust model
//! - [`signals`]: Signal extraction from lookup requests
//! - [`ranking`]: Candidate ranking and task similarity
//! - [`pack`]: Byte-budgeted pack assembly
//! - [`validation`]: Request validation IR and sanitizers
//! - [`brief`]: Deterministic task brief generation
//! - [`error`]: Error taxonomy shared with the tool surface

pub mod brief;
pub mod error;
pub mod pack;
pub mod ranking;
pub mod signals;
pub mod trust;
pub mod types;
pub mod validation;

pub use error::{Error, ErrorCode, Result, ValidationIssue};
pub use pack::{PackBuilder, PackEntry, PatternPack};
pub use ranking::{Candidate, RankedPattern, Ranker, RankingWeights};
pub use signals::{LookupContext, Signals, extract};
pub use trust::{TrustConfig, TrustModel, TrustPrior, TrustScore};
pub use types::{
    AuditEvent, AuditKind, Checkpoint, Claims, Evidence, EvidenceType, Learning, NewPatternSpec,
    Pattern, PatternMetadataRecord, PatternTrigger, PatternType, PatternUsage, PatternVocabTerm,
    Phase, PhaseHandoff, Reflection, ReflectionArtifacts, ReflectionOutcome, Task, TaskBrief,
    TaskEvidence, TaskRef, TaskStatus, TaskType, TriggerType, TrustOutcome, TrustUpdate,
};
