//! Final run report
//!
//! The [`RunReport`] is the externally consumable summary of a run. It is
//! produced regardless of outcome and serializes to JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{NodeId, RunId};
use super::mapping::MappingTally;
use super::progress::ProgressSnapshot;
use super::run::RunState;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Reached `Done`; individual files may still have failed
    Done,
    /// Reached `Failed`
    Failed,
    /// Cancelled and drained; resumable
    Interrupted,
}

/// Where a failure was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// File copy failed terminally
    Transfer,
    /// Destination folder could not be created; subtree skipped
    Structure,
    /// Folder listing failed; subtree partially migrated
    Listing,
    /// Copy kept failing validation after repairs
    Validation,
}

/// One terminal failure, attributable to a source id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub source_id: NodeId,
    pub path: String,
    pub kind: FailureKind,
    pub reason: String,
    pub attempts: u32,
}

/// Summary emitted by the orchestrator at the end of every run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub source_root: NodeId,
    pub destination_root: NodeId,
    pub outcome: RunOutcome,
    pub final_state: RunState,
    pub resumed: bool,
    pub test_mode: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    /// Source folders with a destination counterpart (root excluded)
    pub folders: u64,
    pub folders_created: u64,
    pub folders_reused: u64,
    /// File transfer tasks discovered in this run
    pub files: u64,
    pub successful: u64,
    pub failed: u64,
    pub skipped: u64,
    pub repaired: u64,
    pub validated: u64,
    pub validation_mismatches: u64,
    pub bytes_transferred: u64,
    pub files_per_second: f64,
    pub failures: Vec<FailureRecord>,
    /// Reason for a `Failed` outcome
    pub fatal_error: Option<String>,
}

impl RunReport {
    /// Fills the folder and file counters from the durable mapping table
    pub fn apply_tally(&mut self, tally: &MappingTally) {
        self.folders = tally.folders_created + tally.folders_reused;
        self.folders_created = tally.folders_created;
        self.folders_reused = tally.folders_reused;
        self.files = tally.files();
        self.successful = tally.files_succeeded;
        self.failed = tally.files_failed;
        self.skipped = tally.files_skipped;
    }

    /// Fills the per-session counters from a progress snapshot
    pub fn apply_progress(&mut self, progress: &ProgressSnapshot) {
        self.repaired = progress.files_repaired;
        self.validated = progress.files_validated;
        self.validation_mismatches = progress.validation_mismatches;
        self.bytes_transferred = progress.bytes_transferred;
        self.files_per_second = if self.elapsed_secs > 0.0 {
            progress.files_completed() as f64 / self.elapsed_secs
        } else {
            0.0
        };
    }

    /// Process exit code for this outcome
    pub fn exit_code(&self) -> u8 {
        match self.outcome {
            RunOutcome::Done => 0,
            RunOutcome::Failed => 1,
            RunOutcome::Interrupted => 130,
        }
    }

    /// Canonical report file name
    pub fn file_name(&self) -> String {
        format!("drivemig-report-{}.json", self.run_id)
    }
}
