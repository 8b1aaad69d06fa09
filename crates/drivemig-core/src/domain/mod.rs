//! Domain entities and state machines
//!
//! - Newtypes for remote identifiers and run identifiers
//! - Source tree nodes and their metadata
//! - Mapping entries (the resumability checkpoint)
//! - Transfer tasks with their per-attempt state machine
//! - Validation results, progress snapshots, runs and reports
//! - Domain-specific error types

pub mod errors;
pub mod mapping;
pub mod newtypes;
pub mod node;
pub mod progress;
pub mod report;
pub mod run;
pub mod task;
pub mod validation;

// Re-export commonly used types
pub use errors::DomainError;
pub use mapping::{MappingEntry, MappingTally, TransferStatus};
pub use newtypes::{NodeId, RunId};
pub use node::{Node, NodeKind, ObjectMetadata, ShareGrant, SharingMetadata};
pub use progress::ProgressSnapshot;
pub use report::{FailureKind, FailureRecord, RunOutcome, RunReport};
pub use run::{MigrationRun, RunState};
pub use task::TransferTask;
pub use validation::{ValidationConfidence, ValidationResult};
