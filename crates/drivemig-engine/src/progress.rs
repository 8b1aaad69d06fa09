//! Progress tracking
//!
//! [`ProgressTracker`] aggregates the progress events of a run behind one
//! lock, so every [`ProgressSnapshot`] it hands out is internally
//! consistent. Throughput is a moving average over the most recent
//! completions and drives the ETA estimate.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use drivemig_core::domain::{MappingTally, ProgressSnapshot};
use tokio::time::Instant;

/// Completions kept for the throughput moving average
const THROUGHPUT_WINDOW: usize = 50;

/// One observable step of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    FolderDiscovered,
    FolderCreated,
    FolderReused,
    FolderFailed,
    FileDiscovered,
    FileSucceeded { bytes: u64 },
    FileSkipped,
    FileFailed,
    /// A copy was compared against its source
    FileValidated { matched: bool },
    /// A succeeded file was sent back for another copy
    FileRepairQueued,
    /// A succeeded file failed final validation without repair
    FileInvalidated,
    /// A repair copy succeeded
    FileRepaired,
}

#[derive(Debug)]
struct Inner {
    snapshot: ProgressSnapshot,
    completions: VecDeque<Instant>,
}

/// Thread-safe progress aggregate for one run
#[derive(Debug)]
pub struct ProgressTracker {
    started: Instant,
    inner: Mutex<Inner>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            inner: Mutex::new(Inner {
                snapshot: ProgressSnapshot::default(),
                completions: VecDeque::with_capacity(THROUGHPUT_WINDOW),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts the counters from the state of a persisted mapping table
    ///
    /// Every known entry counts as discovered; finished entries count as
    /// completed. Entries that still need work are counted when they
    /// finish.
    pub fn seed(&self, tally: &MappingTally) {
        let mut inner = self.lock();
        let s = &mut inner.snapshot;
        s.folders_discovered = tally.folders();
        s.folders_created = tally.folders_created;
        s.folders_reused = tally.folders_reused;
        s.files_discovered = tally.files();
        s.files_succeeded = tally.files_succeeded;
        s.files_skipped = tally.files_skipped;
    }

    pub fn record(&self, event: ProgressEvent) {
        self.record_at(event, Instant::now());
    }

    /// Records `event` as having happened at `at`
    pub fn record_at(&self, event: ProgressEvent, at: Instant) {
        let mut inner = self.lock();
        let completed = {
            let s = &mut inner.snapshot;
            match event {
                ProgressEvent::FolderDiscovered => {
                    s.folders_discovered += 1;
                    false
                }
                ProgressEvent::FolderCreated => {
                    s.folders_created += 1;
                    false
                }
                ProgressEvent::FolderReused => {
                    s.folders_reused += 1;
                    false
                }
                ProgressEvent::FolderFailed => {
                    s.folders_failed += 1;
                    false
                }
                ProgressEvent::FileDiscovered => {
                    s.files_discovered += 1;
                    false
                }
                ProgressEvent::FileSucceeded { bytes } => {
                    s.files_succeeded += 1;
                    s.bytes_transferred += bytes;
                    true
                }
                ProgressEvent::FileSkipped => {
                    s.files_skipped += 1;
                    true
                }
                ProgressEvent::FileFailed => {
                    s.files_failed += 1;
                    true
                }
                ProgressEvent::FileValidated { matched } => {
                    s.files_validated += 1;
                    if !matched {
                        s.validation_mismatches += 1;
                    }
                    false
                }
                ProgressEvent::FileRepairQueued => {
                    s.files_succeeded = s.files_succeeded.saturating_sub(1);
                    false
                }
                ProgressEvent::FileInvalidated => {
                    s.files_succeeded = s.files_succeeded.saturating_sub(1);
                    s.files_failed += 1;
                    false
                }
                ProgressEvent::FileRepaired => {
                    s.files_repaired += 1;
                    false
                }
            }
        };

        if completed {
            if inner.completions.len() == THROUGHPUT_WINDOW {
                inner.completions.pop_front();
            }
            inner.completions.push_back(at);
        }
    }

    /// Consistent copy of the counters with throughput and ETA filled in
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> ProgressSnapshot {
        let inner = self.lock();
        let mut snapshot = inner.snapshot.clone();
        snapshot.taken_at = Utc::now();
        snapshot.elapsed_ms = now.saturating_duration_since(self.started).as_millis() as u64;

        snapshot.throughput_files_per_sec = match inner.completions.front() {
            Some(oldest) => {
                let span = now.saturating_duration_since(*oldest).as_secs_f64();
                if span > 0.0 {
                    inner.completions.len() as f64 / span
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        let remaining = snapshot.files_remaining();
        snapshot.eta_seconds = if remaining == 0 {
            Some(0.0)
        } else if snapshot.throughput_files_per_sec > 0.0 {
            Some(remaining as f64 / snapshot.throughput_files_per_sec)
        } else {
            None
        };
        snapshot
    }
}
