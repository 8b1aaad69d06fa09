//! Transfer scheduler - bounded-concurrency file copying
//!
//! The [`TransferScheduler`] receives [`TransferTask`]s over a bounded
//! channel and runs them on at most `workers` concurrent workers. Failed
//! attempts are parked in a delay queue for their backoff period and then
//! rescheduled; copies that fail validation are sent back for repair.
//!
//! ## Flow
//!
//! ```text
//! orchestrator ──→ mpsc::Receiver ──→ ready queue ──→ JoinSet (≤ workers)
//!                                        ↑                  │
//!                                        └── DelayQueue ←───┘ (retryable)
//! ```
//!
//! ## Invariants
//!
//! - At most one task per source id is admitted at a time
//! - Every task that reaches a terminal status is reported to the progress
//!   tracker exactly once
//! - On cancellation no new attempt starts; in-flight attempts are awaited
//!   and pending work stays in the mapping table for the next run

use std::collections::{HashSet, VecDeque};
use std::future::poll_fn;
use std::sync::Arc;
use std::time::Duration;

use drivemig_core::config::MigrationConfig;
use drivemig_core::domain::{
    MappingEntry, NodeId, NodeKind, TransferStatus, TransferTask, ValidationResult,
};
use drivemig_core::ports::{IStorageProvider, NodeAttributes, StorageError};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;
use tracing::{debug, error, info, warn};

use crate::mapping::MappingTable;
use crate::progress::{ProgressEvent, ProgressTracker};
use crate::retry::RetryPolicy;
use crate::validator::{IntegrityValidator, VALIDATION_FAILURE_PREFIX};

/// Tunables of one scheduler
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub workers: usize,
    /// Channel capacity and checkpoint interval
    pub batch_size: usize,
    /// Attempt budget per task; also bounds repairs
    pub retry: RetryPolicy,
    /// Deadline of one attempt, lookup and validation included
    pub attempt_timeout: Duration,
    pub validate: bool,
    pub auto_fix: bool,
    pub preserve_dates: bool,
    pub preserve_sharing: bool,
}

impl SchedulerSettings {
    pub fn from_config(config: &MigrationConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            batch_size: config.batch_size.max(1),
            retry: RetryPolicy::from_config(config),
            attempt_timeout: config.timeout(),
            validate: config.validate_checksums,
            auto_fix: config.auto_fix_missing,
            preserve_dates: config.preserve_dates,
            preserve_sharing: config.preserve_sharing,
        }
    }
}

/// Counts for one scheduler run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerSummary {
    pub succeeded: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Repair copies that succeeded
    pub repaired: u64,
    /// Attempts that were rescheduled after a retryable failure
    pub retried: u64,
    /// Tasks rejected because their source id was already admitted
    pub duplicates: u64,
    pub cancelled: bool,
}

// ============================================================================
// TransferWorker - one attempt
// ============================================================================

/// Result of one transfer attempt
#[derive(Debug)]
enum AttemptOutcome {
    /// A new copy was made (and validated, when enabled)
    Copied {
        destination_id: NodeId,
        validated: bool,
    },
    /// An identical file already sat in the destination folder
    Existing {
        destination_id: NodeId,
        /// Found while retrying, so most likely this task's own copy
        adopted: bool,
    },
    /// The new copy does not match its source
    Mismatch {
        destination_id: NodeId,
        result: ValidationResult,
    },
    Failed(StorageError),
}

struct TransferWorker {
    provider: Arc<dyn IStorageProvider>,
    validator: Arc<IntegrityValidator>,
    settings: SchedulerSettings,
}

impl TransferWorker {
    /// Runs one attempt under the attempt deadline
    ///
    /// An expired attempt is a retryable timeout. Its copy may still have
    /// landed, which the next attempt detects before copying again.
    async fn attempt(&self, task: &TransferTask) -> AttemptOutcome {
        let deadline = self.settings.attempt_timeout;
        if deadline.is_zero() {
            return self.run_attempt(task).await;
        }
        match tokio::time::timeout(deadline, self.run_attempt(task)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    file_id = %task.source_id(),
                    attempt = task.attempt_count(),
                    timeout_secs = deadline.as_secs(),
                    "Transfer attempt timed out"
                );
                AttemptOutcome::Failed(StorageError::Timeout(deadline))
            }
        }
    }

    async fn run_attempt(&self, task: &TransferTask) -> AttemptOutcome {
        let source = task.source();
        let parent = task.destination_parent_id();
        let expected = source.metadata();

        // A retry may follow an attempt whose copy landed without a response
        if task.check_existing() || task.attempt_count() > 1 {
            match self
                .provider
                .find_child(parent, &source.name, NodeKind::File)
                .await
            {
                Ok(Some(existing)) => {
                    let comparison = self.validator.compare(&expected, &existing.metadata());
                    if comparison.matched {
                        return AttemptOutcome::Existing {
                            destination_id: existing.id,
                            adopted: !task.check_existing(),
                        };
                    }
                    debug!(
                        file_id = %source.id,
                        existing = %existing.id,
                        detail = ?comparison.detail,
                        "Destination holds a different file of the same name"
                    );
                }
                Ok(None) => {}
                Err(e) => return AttemptOutcome::Failed(e),
            }
        }

        let attributes = NodeAttributes {
            modified_time: if self.settings.preserve_dates {
                source.modified_time
            } else {
                None
            },
            sharing: if self.settings.preserve_sharing {
                source.sharing.clone()
            } else {
                None
            },
        };

        let destination_id = match self
            .provider
            .copy_file(&source.id, parent, &source.name, &attributes)
            .await
        {
            Ok(id) => id,
            Err(e) => return AttemptOutcome::Failed(e),
        };

        if !self.settings.validate {
            return AttemptOutcome::Copied {
                destination_id,
                validated: false,
            };
        }

        match self
            .validator
            .validate_against(&source.id, &expected, &destination_id)
            .await
        {
            Ok(result) if result.matched => AttemptOutcome::Copied {
                destination_id,
                validated: true,
            },
            Ok(result) => AttemptOutcome::Mismatch {
                destination_id,
                result,
            },
            Err(e) => AttemptOutcome::Failed(e),
        }
    }
}

// ============================================================================
// TransferScheduler
// ============================================================================

/// Work not currently owned by a worker
struct Backlog {
    ready: VecDeque<TransferTask>,
    retries: DelayQueue<TransferTask>,
    admitted: HashSet<NodeId>,
}

impl Backlog {
    fn new() -> Self {
        Self {
            ready: VecDeque::new(),
            retries: DelayQueue::new(),
            admitted: HashSet::new(),
        }
    }
}

/// Runs file transfers with bounded concurrency
pub struct TransferScheduler {
    worker: Arc<TransferWorker>,
    mapping: Arc<MappingTable>,
    progress: Arc<ProgressTracker>,
    settings: SchedulerSettings,
}

impl TransferScheduler {
    pub fn new(
        provider: Arc<dyn IStorageProvider>,
        mapping: Arc<MappingTable>,
        progress: Arc<ProgressTracker>,
        validator: Arc<IntegrityValidator>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            worker: Arc::new(TransferWorker {
                provider,
                validator,
                settings: settings.clone(),
            }),
            mapping,
            progress,
            settings,
        }
    }

    /// Creates the bounded channel feeding [`run`](Self::run)
    pub fn channel(&self) -> (mpsc::Sender<TransferTask>, mpsc::Receiver<TransferTask>) {
        mpsc::channel(self.settings.batch_size.max(1))
    }

    /// Runs a fixed set of tasks to completion
    pub async fn run_tasks(
        &self,
        tasks: Vec<TransferTask>,
        cancel: CancellationToken,
    ) -> SchedulerSummary {
        let (tx, rx) = mpsc::channel(tasks.len().max(1));
        for task in tasks {
            if tx.try_send(task).is_err() {
                break;
            }
        }
        drop(tx);
        self.run(rx, cancel).await
    }

    /// Main loop; returns once the channel is closed and all work settled,
    /// or once cancellation has drained the in-flight attempts
    pub async fn run(
        &self,
        mut tasks: mpsc::Receiver<TransferTask>,
        cancel: CancellationToken,
    ) -> SchedulerSummary {
        let workers = self.settings.workers.max(1);
        let backlog_limit = self.settings.batch_size.max(1);
        info!(workers, "Transfer scheduler starting");

        let mut summary = SchedulerSummary::default();
        let mut running: JoinSet<(TransferTask, AttemptOutcome)> = JoinSet::new();
        let mut backlog = Backlog::new();
        let mut receiving = true;
        let mut since_checkpoint = 0usize;

        loop {
            while running.len() < workers {
                let Some(task) = backlog.ready.pop_front() else {
                    break;
                };
                self.start(&mut running, &mut backlog, task);
            }

            if !receiving
                && backlog.ready.is_empty()
                && backlog.retries.is_empty()
                && running.is_empty()
            {
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled(), if !summary.cancelled => {
                    summary.cancelled = true;
                    receiving = false;
                    tasks.close();
                    let dropped = backlog.ready.len() + backlog.retries.len();
                    backlog.ready.clear();
                    backlog.retries.clear();
                    info!(
                        in_flight = running.len(),
                        dropped,
                        "Cancellation requested, draining in-flight transfers"
                    );
                }

                Some(joined) = running.join_next(), if !running.is_empty() => {
                    match joined {
                        Ok((task, outcome)) => {
                            if self.settle(task, outcome, &mut backlog, &mut summary) {
                                since_checkpoint += 1;
                            }
                        }
                        Err(e) => error!(error = %e, "Transfer worker panicked"),
                    }
                    if since_checkpoint >= self.settings.batch_size {
                        since_checkpoint = 0;
                        self.checkpoint().await;
                    }
                }

                Some(expired) = poll_fn(|cx| backlog.retries.poll_expired(cx)),
                    if !backlog.retries.is_empty() =>
                {
                    backlog.ready.push_back(expired.into_inner());
                }

                received = tasks.recv(), if receiving && backlog.ready.len() < backlog_limit => {
                    match received {
                        Some(task) => self.admit(&mut backlog, &mut summary, task),
                        None => receiving = false,
                    }
                }

                else => break,
            }
        }

        self.checkpoint().await;
        info!(
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            repaired = summary.repaired,
            retried = summary.retried,
            cancelled = summary.cancelled,
            "Transfer scheduler finished"
        );
        summary
    }

    async fn checkpoint(&self) {
        if let Err(e) = self.mapping.checkpoint().await {
            warn!(error = %e, "Failed to checkpoint mapping entries");
        }
    }

    fn admit(&self, backlog: &mut Backlog, summary: &mut SchedulerSummary, task: TransferTask) {
        if backlog.admitted.insert(task.source_id().clone()) {
            backlog.ready.push_back(task);
        } else {
            debug!(file_id = %task.source_id(), "Task already scheduled, ignoring duplicate");
            summary.duplicates += 1;
        }
    }

    fn start(
        &self,
        running: &mut JoinSet<(TransferTask, AttemptOutcome)>,
        backlog: &mut Backlog,
        mut task: TransferTask,
    ) {
        let attempt = match task.begin_attempt() {
            Ok(attempt) => attempt,
            Err(e) => {
                error!(file_id = %task.source_id(), error = %e, "Task cannot start");
                backlog.admitted.remove(task.source_id());
                return;
            }
        };

        let repair_count = task.repair_count();
        let parent = task.destination_parent_id().clone();
        let known = self.mapping.update(task.source_id(), |e| {
            e.mark_in_flight();
            e.attempt_count = attempt;
            e.repair_count = repair_count;
            e.destination_parent_id = Some(parent.clone());
        });
        if !known {
            let mut entry = MappingEntry::new(task.source().clone(), task.path(), Some(parent));
            entry.mark_in_flight();
            entry.attempt_count = attempt;
            entry.repair_count = repair_count;
            self.mapping.upsert(entry);
        }

        debug!(file_id = %task.source_id(), path = %task.path(), attempt, "Starting transfer");
        let worker = self.worker.clone();
        running.spawn(async move {
            let outcome = worker.attempt(&task).await;
            (task, outcome)
        });
    }

    /// Applies the outcome of one attempt
    ///
    /// # Returns
    /// `true` if the task reached a terminal status
    fn settle(
        &self,
        mut task: TransferTask,
        outcome: AttemptOutcome,
        backlog: &mut Backlog,
        summary: &mut SchedulerSummary,
    ) -> bool {
        match outcome {
            AttemptOutcome::Copied {
                destination_id,
                validated,
            } => {
                if validated {
                    self.progress
                        .record(ProgressEvent::FileValidated { matched: true });
                }
                self.succeed(task, destination_id, false, backlog, summary)
            }
            AttemptOutcome::Existing {
                destination_id,
                adopted,
            } => self.succeed(task, destination_id, !adopted, backlog, summary),
            AttemptOutcome::Mismatch {
                destination_id,
                result,
            } => {
                self.progress
                    .record(ProgressEvent::FileValidated { matched: false });
                let reason = format!(
                    "{}{}",
                    VALIDATION_FAILURE_PREFIX,
                    result.detail.as_deref().unwrap_or("copy does not match source")
                );
                warn!(
                    file_id = %task.source_id(),
                    %destination_id,
                    %reason,
                    "Copy failed validation"
                );

                if self.settings.auto_fix && task.repair_count() < self.settings.retry.max_attempts
                {
                    match task.requeue_for_repair(reason.clone()) {
                        Ok(()) => {
                            let repair_count = task.repair_count();
                            self.mapping.update(task.source_id(), |e| {
                                e.status = TransferStatus::Pending;
                                e.attempt_count = 0;
                                e.repair_count = repair_count;
                                e.last_error = Some(reason);
                            });
                            backlog.ready.push_back(task);
                            return false;
                        }
                        Err(e) => {
                            error!(file_id = %task.source_id(), error = %e, "Cannot requeue task");
                        }
                    }
                }
                self.fail_terminal(task, reason, backlog, summary)
            }
            AttemptOutcome::Failed(err) => {
                let reason = err.to_string();
                match task.fail(reason.clone(), err.is_retryable(), self.settings.retry.max_attempts) {
                    Ok(TransferStatus::FailedRetryable) => {
                        let delay = self.settings.retry.backoff(task.attempt_count(), &err);
                        warn!(
                            file_id = %task.source_id(),
                            attempt = task.attempt_count(),
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Transfer failed, retrying"
                        );
                        self.mapping.update(task.source_id(), |e| {
                            e.mark_failed(TransferStatus::FailedRetryable, reason);
                        });
                        summary.retried += 1;
                        backlog.retries.insert(task, delay);
                        false
                    }
                    Ok(_) => self.fail_terminal(task, reason, backlog, summary),
                    Err(e) => {
                        error!(file_id = %task.source_id(), error = %e, "Invalid task state");
                        self.fail_terminal(task, reason, backlog, summary)
                    }
                }
            }
        }
    }

    fn succeed(
        &self,
        mut task: TransferTask,
        destination_id: NodeId,
        skipped: bool,
        backlog: &mut Backlog,
        summary: &mut SchedulerSummary,
    ) -> bool {
        let transition = if skipped { task.skip() } else { task.succeed() };
        if let Err(e) = transition {
            error!(file_id = %task.source_id(), error = %e, "Invalid task state");
        }

        let attempts = task.attempt_count();
        self.mapping.update(task.source_id(), |e| {
            e.attempt_count = attempts;
            if skipped {
                e.mark_skipped(destination_id.clone());
            } else {
                e.mark_succeeded(destination_id.clone());
            }
        });
        backlog.admitted.remove(task.source_id());

        if skipped {
            debug!(file_id = %task.source_id(), %destination_id, "Identical file already present");
            self.progress.record(ProgressEvent::FileSkipped);
            summary.skipped += 1;
        } else {
            debug!(
                file_id = %task.source_id(),
                %destination_id,
                attempts,
                "File copied"
            );
            self.progress.record(ProgressEvent::FileSucceeded {
                bytes: task.source().transfer_bytes(),
            });
            summary.succeeded += 1;
            if task.repair_count() > 0 {
                self.progress.record(ProgressEvent::FileRepaired);
                summary.repaired += 1;
            }
        }
        true
    }

    fn fail_terminal(
        &self,
        task: TransferTask,
        reason: String,
        backlog: &mut Backlog,
        summary: &mut SchedulerSummary,
    ) -> bool {
        error!(
            file_id = %task.source_id(),
            path = %task.path(),
            attempts = task.attempt_count(),
            %reason,
            "Transfer failed permanently"
        );
        let attempts = task.attempt_count();
        self.mapping.update(task.source_id(), |e| {
            e.attempt_count = attempts;
            e.mark_failed(TransferStatus::FailedTerminal, reason);
        });
        backlog.admitted.remove(task.source_id());
        self.progress.record(ProgressEvent::FileFailed);
        summary.failed += 1;
        true
    }
}
