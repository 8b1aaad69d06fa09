//! Mapping store port (driven/secondary port)
//!
//! Persists the mapping table and run records so an interrupted run can be
//! resumed from the last durable checkpoint.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   and don't need domain-level classification.
//! - Entries are namespaced by a scope string (see
//!   [`MigrationRun::scope`](crate::domain::MigrationRun::scope)) so one
//!   store can hold several migration pairs.
//! - [`save_entries`](IMappingStore::save_entries) must be atomic: either
//!   the whole batch is durable or none of it is.

use async_trait::async_trait;

use crate::domain::{newtypes::NodeId, MappingEntry, MigrationRun, RunReport};

/// Port trait for durable migration state
#[async_trait]
pub trait IMappingStore: Send + Sync {
    /// Inserts or updates a run record
    async fn save_run(&self, run: &MigrationRun) -> anyhow::Result<()>;

    /// Latest non-archived, non-terminal run for a scope
    async fn find_resumable_run(&self, scope: &str) -> anyhow::Result<Option<MigrationRun>>;

    /// Stores the final state and report of a run and archives it
    async fn archive_run(&self, run: &MigrationRun, report: &RunReport) -> anyhow::Result<()>;

    /// All mapping entries of a scope
    async fn load_entries(&self, scope: &str) -> anyhow::Result<Vec<MappingEntry>>;

    /// A single mapping entry
    async fn get_entry(
        &self,
        scope: &str,
        source_id: &NodeId,
    ) -> anyhow::Result<Option<MappingEntry>>;

    /// Upserts a batch of entries in one transaction
    async fn save_entries(&self, scope: &str, entries: &[MappingEntry]) -> anyhow::Result<()>;
}
