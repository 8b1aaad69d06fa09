//! Progress snapshots
//!
//! A [`ProgressSnapshot`] is an immutable, internally consistent copy of
//! the progress counters at one instant. It is produced by the engine's
//! progress tracker and shared read-only with reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Weight of file completion in [`ProgressSnapshot::progress_ratio`]
const FILE_WEIGHT: f64 = 0.8;
/// Weight of folder completion in [`ProgressSnapshot::progress_ratio`]
const FOLDER_WEIGHT: f64 = 0.2;

/// Point-in-time aggregate of migration progress
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub taken_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub folders_discovered: u64,
    pub folders_created: u64,
    pub folders_reused: u64,
    pub folders_failed: u64,
    pub files_discovered: u64,
    pub files_succeeded: u64,
    pub files_failed: u64,
    pub files_skipped: u64,
    pub files_repaired: u64,
    /// Copies compared against their source, inline or in the final pass
    #[serde(default)]
    pub files_validated: u64,
    #[serde(default)]
    pub validation_mismatches: u64,
    pub bytes_transferred: u64,
    /// Moving-average completion rate over recent completions
    pub throughput_files_per_sec: f64,
    /// Estimated seconds until all discovered files settle
    pub eta_seconds: Option<f64>,
}

impl ProgressSnapshot {
    /// Folders that have a destination counterpart
    pub fn folders_mapped(&self) -> u64 {
        self.folders_created + self.folders_reused
    }

    /// Files in a terminal status
    pub fn files_completed(&self) -> u64 {
        self.files_succeeded + self.files_failed + self.files_skipped
    }

    pub fn files_remaining(&self) -> u64 {
        self.files_discovered.saturating_sub(self.files_completed())
    }

    /// Overall completion in `0.0..=1.0`, files weighted 80% and folders 20%
    pub fn progress_ratio(&self) -> f64 {
        let files = if self.files_discovered == 0 {
            1.0
        } else {
            self.files_completed() as f64 / self.files_discovered as f64
        };
        let folders = if self.folders_discovered == 0 {
            1.0
        } else {
            (self.folders_mapped() + self.folders_failed) as f64 / self.folders_discovered as f64
        };
        (files * FILE_WEIGHT + folders * FOLDER_WEIGHT).clamp(0.0, 1.0)
    }
}
