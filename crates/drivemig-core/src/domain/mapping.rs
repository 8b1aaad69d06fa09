//! Source-to-destination mapping entries
//!
//! A [`MappingEntry`] links one source node to its destination counterpart.
//! Entries are created when a node is first scheduled, updated as the node
//! moves through its lifecycle and never deleted. The set of entries for a
//! migration pair is the checkpoint a resumed run starts from.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::NodeId;
use super::node::{Node, NodeKind};

/// Lifecycle status shared by mapping entries and transfer tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Discovered, waiting for a worker
    Pending,
    /// Owned by a worker; a remote call may be outstanding
    InFlight,
    /// Destination object exists and (when enabled) validated
    Succeeded,
    /// Last attempt failed with a retryable error; waiting for backoff
    FailedRetryable,
    /// Retries exhausted or non-retryable failure
    FailedTerminal,
    /// An identical destination object already existed
    Skipped,
}

impl TransferStatus {
    /// Stable name used in storage
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::InFlight => "in_flight",
            TransferStatus::Succeeded => "succeeded",
            TransferStatus::FailedRetryable => "failed_retryable",
            TransferStatus::FailedTerminal => "failed_terminal",
            TransferStatus::Skipped => "skipped",
        }
    }

    /// Returns true for statuses no further work will change in this run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Succeeded | TransferStatus::FailedTerminal | TransferStatus::Skipped
        )
    }

    /// Returns true when the destination object is in place
    pub fn is_done(&self) -> bool {
        matches!(self, TransferStatus::Succeeded | TransferStatus::Skipped)
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransferStatus::Pending),
            "in_flight" => Ok(TransferStatus::InFlight),
            "succeeded" => Ok(TransferStatus::Succeeded),
            "failed_retryable" => Ok(TransferStatus::FailedRetryable),
            "failed_terminal" => Ok(TransferStatus::FailedTerminal),
            "skipped" => Ok(TransferStatus::Skipped),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown transfer status: {other}"
            ))),
        }
    }
}

/// Durable record linking a source node to its destination node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Snapshot of the source node as listed
    pub node: Node,
    /// Path relative to the migration root, `/`-separated
    pub path: String,
    pub destination_id: Option<NodeId>,
    pub destination_parent_id: Option<NodeId>,
    pub status: TransferStatus,
    pub attempt_count: u32,
    pub repair_count: u32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl MappingEntry {
    /// Creates a pending entry for a newly discovered node
    pub fn new(node: Node, path: impl Into<String>, destination_parent_id: Option<NodeId>) -> Self {
        Self {
            node,
            path: path.into(),
            destination_id: None,
            destination_parent_id,
            status: TransferStatus::Pending,
            attempt_count: 0,
            repair_count: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn source_id(&self) -> &NodeId {
        &self.node.id
    }

    pub fn kind(&self) -> NodeKind {
        self.node.kind
    }

    /// Destination id of a finished entry
    pub fn resolved_destination(&self) -> Option<&NodeId> {
        if self.status.is_done() {
            self.destination_id.as_ref()
        } else {
            None
        }
    }

    pub fn mark_in_flight(&mut self) {
        self.status = TransferStatus::InFlight;
        self.touch();
    }

    pub fn mark_succeeded(&mut self, destination_id: NodeId) {
        self.destination_id = Some(destination_id);
        self.status = TransferStatus::Succeeded;
        self.last_error = None;
        self.touch();
    }

    pub fn mark_skipped(&mut self, destination_id: NodeId) {
        self.destination_id = Some(destination_id);
        self.status = TransferStatus::Skipped;
        self.last_error = None;
        self.touch();
    }

    pub fn mark_failed(&mut self, status: TransferStatus, reason: impl Into<String>) {
        debug_assert!(matches!(
            status,
            TransferStatus::FailedRetryable | TransferStatus::FailedTerminal
        ));
        self.status = status;
        self.last_error = Some(reason.into());
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Per-status counts over the mapping entries of one scope
///
/// The migration root is excluded. Folder entries that were adopted
/// rather than created carry the `Skipped` status and count as reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingTally {
    pub folders_created: u64,
    pub folders_reused: u64,
    pub folders_failed: u64,
    pub folders_pending: u64,
    pub files_succeeded: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
    pub files_pending: u64,
    pub bytes_succeeded: u64,
}

impl MappingTally {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a MappingEntry>) -> Self {
        let mut tally = Self::default();
        for entry in entries {
            tally.record(entry);
        }
        tally
    }

    pub fn record(&mut self, entry: &MappingEntry) {
        if entry.node.parent_id.is_none() {
            return;
        }
        match (entry.kind(), entry.status) {
            (NodeKind::Folder, TransferStatus::Succeeded) => self.folders_created += 1,
            (NodeKind::Folder, TransferStatus::Skipped) => self.folders_reused += 1,
            (NodeKind::Folder, TransferStatus::FailedTerminal) => self.folders_failed += 1,
            (NodeKind::Folder, _) => self.folders_pending += 1,
            (NodeKind::File, TransferStatus::Succeeded) => {
                self.files_succeeded += 1;
                self.bytes_succeeded += entry.node.transfer_bytes();
            }
            (NodeKind::File, TransferStatus::Skipped) => self.files_skipped += 1,
            (NodeKind::File, TransferStatus::FailedTerminal) => self.files_failed += 1,
            (NodeKind::File, _) => self.files_pending += 1,
        }
    }

    pub fn folders(&self) -> u64 {
        self.folders_created + self.folders_reused + self.folders_failed + self.folders_pending
    }

    pub fn files(&self) -> u64 {
        self.files_succeeded + self.files_skipped + self.files_failed + self.files_pending
    }
}
