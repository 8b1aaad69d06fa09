//! Migration orchestrator - the run state machine
//!
//! [`MigrationOrchestrator`] drives one run over a source/destination pair:
//!
//! ```text
//! Init → BuildingStructure → Transferring → Validating → Repairing → Reporting → Done
//!   └──────────(resume)──────────↑               └─────────────────────↑
//! any non-terminal state → Failed
//! ```
//!
//! - **Init**: checks both roots, resumes an interrupted run of the same
//!   pair if there is one, loads the mapping table
//! - **BuildingStructure**: walks the source tree, creating destination
//!   folders and feeding file tasks to the scheduler as their parents
//!   become available
//! - **Transferring**: waits for the scheduler to settle every task
//! - **Validating**: re-checks every succeeded copy against its source
//! - **Repairing**: copies again whatever failed validation
//! - **Reporting**: builds, writes and archives the [`RunReport`]
//!
//! A resumed run enters `Transferring` directly and continues the walk
//! from its checkpointed cursor.
//!
//! ## Cancellation
//!
//! Cancelling the token stops the walk, lets in-flight transfers finish,
//! checkpoints everything and returns an `Interrupted` report. The run
//! stays resumable.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use drivemig_core::config::{Config, MigrationConfig};
use drivemig_core::domain::{
    FailureKind, FailureRecord, MappingEntry, MigrationRun, Node, NodeId, NodeKind, RunOutcome,
    RunReport, RunState, TransferStatus, TransferTask, ValidationResult,
};
use drivemig_core::ports::{IMappingStore, IStorageProvider};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{MigrationError, StructureError, WalkError};
use crate::mapping::MappingTable;
use crate::progress::{ProgressEvent, ProgressTracker};
use crate::retry::{with_retry, RetryPolicy};
use crate::scheduler::{SchedulerSettings, TransferScheduler};
use crate::structure::{StructureBuilder, StructureOptions};
use crate::validator::{IntegrityValidator, VALIDATION_FAILURE_PREFIX};
use crate::walker::{TreeWalker, WalkCursor, WalkOptions};

// ============================================================================
// Options
// ============================================================================

/// Everything one run needs to know about what to migrate and how
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub source_root: NodeId,
    pub destination_root: NodeId,
    pub test_mode: bool,
    /// Upper bound on file tasks, set in test mode
    pub max_files: Option<usize>,
    pub migration: MigrationConfig,
    /// Directory the JSON report is written to
    pub report_directory: Option<PathBuf>,
}

impl MigrationOptions {
    /// Builds the options for a normal or test-mode run
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Fatal` if a configured root is not a valid
    /// node id.
    pub fn from_config(config: &Config, test_mode: bool) -> Result<Self, MigrationError> {
        let (source, destination) = config.roots(test_mode);
        let source_root = NodeId::new(source)
            .map_err(|e| MigrationError::Fatal(format!("Invalid source folder: {}", e)))?;
        let destination_root = NodeId::new(destination)
            .map_err(|e| MigrationError::Fatal(format!("Invalid destination folder: {}", e)))?;

        Ok(Self {
            source_root,
            destination_root,
            test_mode,
            max_files: test_mode.then_some(config.test.max_test_files),
            migration: config.migration.clone(),
            report_directory: Some(config.state.report_directory.clone()),
        })
    }

    fn retry(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.migration)
    }

    fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            max_depth: self.migration.max_depth,
            max_nodes: self.migration.max_nodes,
        }
    }
}

/// Components shared by the phases of one run
struct Phases {
    mapping: Arc<MappingTable>,
    structure: StructureBuilder,
    validator: Arc<IntegrityValidator>,
    scheduler: Arc<TransferScheduler>,
}

// ============================================================================
// MigrationOrchestrator
// ============================================================================

/// Runs migrations of one source/destination pair
pub struct MigrationOrchestrator {
    provider: Arc<dyn IStorageProvider>,
    store: Arc<dyn IMappingStore>,
    options: MigrationOptions,
    progress: Arc<ProgressTracker>,
}

impl MigrationOrchestrator {
    /// Creates an orchestrator
    ///
    /// # Arguments
    /// * `provider` - Storage provider, normally wrapped in a
    ///   [`ThrottledProvider`](crate::rate_limit::ThrottledProvider). File
    ///   transfers are bounded by `timeout_seconds` either way.
    /// * `store` - Durable mapping store
    /// * `options` - Roots and migration settings
    pub fn new(
        provider: Arc<dyn IStorageProvider>,
        store: Arc<dyn IMappingStore>,
        options: MigrationOptions,
    ) -> Self {
        Self {
            provider,
            store,
            options,
            progress: Arc::new(ProgressTracker::new()),
        }
    }

    /// Live progress of the current run
    pub fn progress(&self) -> Arc<ProgressTracker> {
        self.progress.clone()
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    /// Runs the migration to a terminal state, or until cancelled
    ///
    /// A report is produced whatever the outcome; it is also written to
    /// the report directory when one is configured.
    pub async fn run(&self, cancel: CancellationToken) -> RunReport {
        let started = Instant::now();
        let mut run = MigrationRun::new(
            self.options.source_root.clone(),
            self.options.destination_root.clone(),
            self.options.test_mode,
        );
        let mut mapping: Option<Arc<MappingTable>> = None;
        let mut walk_failures = Vec::new();

        let result = self
            .execute(&mut run, &mut mapping, &mut walk_failures, &cancel)
            .await;

        let (outcome, fatal_error) = match result {
            Ok(RunOutcome::Interrupted) => (RunOutcome::Interrupted, None),
            Ok(_) => match run.advance(RunState::Done) {
                Ok(()) => (RunOutcome::Done, None),
                Err(e) => {
                    run.fail(e.to_string());
                    (RunOutcome::Failed, Some(e.to_string()))
                }
            },
            Err(e) => {
                error!(run_id = %run.id(), error = %e, "Migration failed");
                run.fail(e.to_string());
                (RunOutcome::Failed, Some(e.to_string()))
            }
        };

        if let Some(mapping) = &mapping {
            if let Err(e) = mapping.checkpoint().await {
                warn!(error = %e, "Final mapping checkpoint failed");
            }
        }

        let report = self.build_report(
            &run,
            outcome,
            mapping.as_deref(),
            walk_failures,
            fatal_error,
            started.elapsed(),
        );

        let persisted = match outcome {
            RunOutcome::Interrupted => self.store.save_run(&run).await,
            RunOutcome::Done | RunOutcome::Failed => self.store.archive_run(&run, &report).await,
        };
        if let Err(e) = persisted {
            warn!(run_id = %run.id(), error = %e, "Failed to persist run");
        }
        self.write_report(&report).await;

        info!(
            run_id = %report.run_id,
            outcome = ?report.outcome,
            folders = report.folders,
            files = report.files,
            successful = report.successful,
            failed = report.failed,
            skipped = report.skipped,
            elapsed_secs = report.elapsed_secs,
            "Migration run finished"
        );
        report
    }

    async fn execute(
        &self,
        run: &mut MigrationRun,
        mapping_slot: &mut Option<Arc<MappingTable>>,
        walk_failures: &mut Vec<FailureRecord>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, MigrationError> {
        // Init
        let scope = MigrationRun::scope_for(&self.options.source_root, &self.options.destination_root);
        if let Some(mut previous) = self.store.find_resumable_run(&scope).await? {
            info!(
                run_id = %previous.id(),
                state = %previous.state(),
                "Resuming interrupted run"
            );
            previous.resume();
            *run = previous;
        }
        info!(
            run_id = %run.id(),
            source = %self.options.source_root,
            destination = %self.options.destination_root,
            test_mode = self.options.test_mode,
            "Starting migration run"
        );

        let root = self.preflight().await?;
        let phases = self.assemble(&scope).await?;
        *mapping_slot = Some(phases.mapping.clone());
        self.progress.seed(&phases.mapping.tally());

        let cursor = if run.is_resumed() {
            run.walk_cursor()
                .and_then(|json| match WalkCursor::from_json(json) {
                    Ok(cursor) => Some(cursor),
                    Err(e) => {
                        warn!(error = %e, "Discarding unreadable walk cursor");
                        None
                    }
                })
        } else {
            None
        };
        if run.is_resumed() {
            run.advance(RunState::Transferring)?;
        } else {
            run.advance(RunState::BuildingStructure)?;
        }
        self.store.save_run(run).await?;

        // The root mapping must exist before pending work is re-enqueued
        phases
            .structure
            .ensure_destination_folder(&root, "")
            .await
            .map_err(|e| MigrationError::Fatal(e.to_string()))?;

        let mut walker = match cursor {
            Some(cursor) => TreeWalker::from_cursor(
                self.provider.clone(),
                cursor,
                self.options.retry(),
                self.options.walk_options(),
            ),
            None => TreeWalker::new(
                self.provider.clone(),
                root,
                self.options.retry(),
                self.options.walk_options(),
            ),
        };

        let (tx, rx) = phases.scheduler.channel();
        let transfers = {
            let scheduler = phases.scheduler.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run(rx, cancel).await })
        };

        let walked = self
            .walk(run, &mut walker, &phases, &tx, walk_failures, cancel)
            .await;
        drop(tx);

        if walked.is_ok() && *run.state() == RunState::BuildingStructure {
            run.advance(RunState::Transferring)?;
            self.store.save_run(run).await?;
        }

        let summary = transfers
            .await
            .map_err(|e| MigrationError::Fatal(format!("Transfer scheduler crashed: {}", e)))?;
        walked?;
        debug!(?summary, "Transfers settled");

        self.checkpoint(run, Some(walker.cursor()), &phases.mapping)
            .await?;
        if cancel.is_cancelled() {
            info!(run_id = %run.id(), "Run interrupted, state checkpointed");
            return Ok(RunOutcome::Interrupted);
        }

        if self.options.migration.final_validation {
            run.advance(RunState::Validating)?;
            self.store.save_run(run).await?;

            let mismatches = self.validate_all(&phases, cancel).await;
            if cancel.is_cancelled() {
                self.checkpoint(run, None, &phases.mapping).await?;
                return Ok(RunOutcome::Interrupted);
            }

            if !mismatches.is_empty() {
                let repairs = self.plan_repairs(&phases.mapping, mismatches);
                if !repairs.is_empty() {
                    run.advance(RunState::Repairing)?;
                    self.store.save_run(run).await?;
                    info!(count = repairs.len(), "Repairing copies that failed validation");

                    let summary = phases.scheduler.run_tasks(repairs, cancel.clone()).await;
                    debug!(?summary, "Repairs settled");
                    self.checkpoint(run, None, &phases.mapping).await?;
                    if cancel.is_cancelled() {
                        return Ok(RunOutcome::Interrupted);
                    }
                }
            }
        }

        run.advance(RunState::Reporting)?;
        self.checkpoint(run, None, &phases.mapping).await?;
        Ok(RunOutcome::Done)
    }

    /// Fetches both roots; either missing or not a folder is fatal
    async fn preflight(&self) -> Result<Node, MigrationError> {
        let source = self.fetch_root(&self.options.source_root, "source").await?;
        self.fetch_root(&self.options.destination_root, "destination")
            .await?;
        Ok(source)
    }

    async fn fetch_root(&self, id: &NodeId, role: &str) -> Result<Node, MigrationError> {
        let provider = &self.provider;
        let node = with_retry(&self.options.retry(), "get_node", move |_| {
            provider.get_node(id)
        })
        .await
        .map_err(|e| MigrationError::Fatal(format!("Cannot access {} folder {}: {}", role, id, e)))?;

        if !node.is_folder() {
            return Err(MigrationError::Fatal(format!(
                "The {} root {} is not a folder",
                role, id
            )));
        }
        Ok(node)
    }

    async fn assemble(&self, scope: &str) -> Result<Phases, MigrationError> {
        let mapping = Arc::new(MappingTable::load(scope, self.store.clone()).await?);
        let settings = SchedulerSettings::from_config(&self.options.migration);
        let validator = Arc::new(IntegrityValidator::new(
            self.provider.clone(),
            self.options.retry(),
            self.options.migration.preserve_dates,
        ));
        let structure = StructureBuilder::new(
            self.provider.clone(),
            mapping.clone(),
            self.progress.clone(),
            StructureOptions {
                source_root: self.options.source_root.clone(),
                destination_root: self.options.destination_root.clone(),
                preserve_dates: self.options.migration.preserve_dates,
                preserve_sharing: self.options.migration.preserve_sharing,
                retry: self.options.retry(),
            },
        );
        let scheduler = Arc::new(TransferScheduler::new(
            self.provider.clone(),
            mapping.clone(),
            self.progress.clone(),
            validator.clone(),
            settings,
        ));
        Ok(Phases {
            mapping,
            structure,
            validator,
            scheduler,
        })
    }

    // ========================================================================
    // Walk
    // ========================================================================

    async fn walk(
        &self,
        run: &mut MigrationRun,
        walker: &mut TreeWalker,
        phases: &Phases,
        tx: &mpsc::Sender<TransferTask>,
        failures: &mut Vec<FailureRecord>,
        cancel: &CancellationToken,
    ) -> Result<(), MigrationError> {
        let mapping = &phases.mapping;
        let limit = self.options.max_files;
        let mut enqueued: HashSet<NodeId> = HashSet::new();

        // Work left over by an earlier run whose folder is already mapped
        let leftovers =
            mapping.entries_where(|e| e.kind() == NodeKind::File && !e.status.is_done());
        if !leftovers.is_empty() {
            info!(count = leftovers.len(), "Re-enqueueing unfinished transfers");
        }
        for entry in leftovers {
            if limit.is_some_and(|l| enqueued.len() >= l) {
                break;
            }
            let node = entry.node.clone();
            let path = entry.path.clone();
            if !self.enqueue_file(node, path, mapping, tx, &mut enqueued, cancel).await {
                return Ok(());
            }
        }

        let mut since_checkpoint = 0usize;
        loop {
            if limit.is_some_and(|l| enqueued.len() >= l) {
                info!(limit = ?limit, "Test mode file limit reached, stopping walk");
                break;
            }

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = walker.next() => next,
            };
            let Some(next) = next else {
                break;
            };

            match next {
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => failures.extend(walk_failure(&e)),
                Ok(walked) if walked.node.is_folder() => {
                    match phases
                        .structure
                        .ensure_destination_folder(&walked.node, &walked.path)
                        .await
                    {
                        Ok(_) => {}
                        Err(StructureError::Store(e)) => return Err(MigrationError::Store(e)),
                        Err(e) => {
                            warn!(
                                folder_id = %walked.node.id,
                                path = %walked.path,
                                error = %e,
                                "Skipping subtree of unmapped folder"
                            );
                            walker.skip_subtree(&walked.node.id);
                            if let StructureError::MissingParent { .. } = e {
                                failures.push(FailureRecord {
                                    source_id: walked.node.id.clone(),
                                    path: walked.path.clone(),
                                    kind: FailureKind::Structure,
                                    reason: e.to_string(),
                                    attempts: 0,
                                });
                            }
                        }
                    }
                }
                Ok(walked) => {
                    if !self
                        .enqueue_file(walked.node, walked.path, mapping, tx, &mut enqueued, cancel)
                        .await
                    {
                        break;
                    }
                }
            }

            since_checkpoint += 1;
            if since_checkpoint >= self.options.migration.batch_size.max(1) {
                since_checkpoint = 0;
                self.checkpoint(run, Some(walker.cursor()), mapping).await?;
            }
        }
        Ok(())
    }

    /// Records a file in the mapping table and hands it to the scheduler
    ///
    /// # Returns
    /// `false` once the scheduler no longer accepts work
    async fn enqueue_file(
        &self,
        node: Node,
        path: String,
        mapping: &MappingTable,
        tx: &mpsc::Sender<TransferTask>,
        enqueued: &mut HashSet<NodeId>,
        cancel: &CancellationToken,
    ) -> bool {
        if enqueued.contains(&node.id) {
            return true;
        }
        let existing = mapping.get(&node.id);
        if existing.as_ref().is_some_and(|e| e.status.is_done()) {
            return true;
        }
        let Some(parent_destination) = node
            .parent_id
            .as_ref()
            .and_then(|p| mapping.destination_of(p))
        else {
            debug!(file_id = %node.id, %path, "Parent folder not mapped, leaving file for later");
            return true;
        };

        // Files already known may have been copied by an attempt whose
        // outcome was never recorded
        let check_existing = existing.is_some() || !mapping.is_fresh(&parent_destination);
        let repair_count = existing.as_ref().map(|e| e.repair_count).unwrap_or(0);
        if existing.is_none() {
            self.progress.record(ProgressEvent::FileDiscovered);
        }

        let mut entry = existing
            .unwrap_or_else(|| MappingEntry::new(node.clone(), path.clone(), None));
        entry.node = node.clone();
        entry.path = path.clone();
        entry.destination_parent_id = Some(parent_destination.clone());
        entry.status = TransferStatus::Pending;
        entry.attempt_count = 0;
        mapping.upsert(entry);

        let task = TransferTask::new(node, path, parent_destination)
            .with_check_existing(check_existing)
            .with_repair_count(repair_count);
        enqueued.insert(task.source_id().clone());

        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            sent = tx.send(task) => sent.is_ok(),
        }
    }

    // ========================================================================
    // Validation and repair
    // ========================================================================

    /// Re-validates every succeeded copy
    ///
    /// # Returns
    /// The entries whose copies did not match, with the validation result
    async fn validate_all(
        &self,
        phases: &Phases,
        cancel: &CancellationToken,
    ) -> Vec<(MappingEntry, ValidationResult)> {
        let entries = phases.mapping.entries_where(|e| {
            e.kind() == NodeKind::File
                && e.status == TransferStatus::Succeeded
                && e.destination_id.is_some()
        });
        info!(count = entries.len(), "Validating copied files");

        let semaphore = Arc::new(Semaphore::new(self.options.migration.workers.max(1)));
        let mut checks = JoinSet::new();
        for entry in entries {
            if cancel.is_cancelled() {
                break;
            }
            let Some(destination_id) = entry.destination_id.clone() else {
                continue;
            };
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let validator = phases.validator.clone();
            checks.spawn(async move {
                let _permit = permit;
                let result = validator
                    .validate(entry.source_id(), &destination_id)
                    .await;
                (entry, result)
            });
        }

        let mut mismatches = Vec::new();
        while let Some(joined) = checks.join_next().await {
            match joined {
                Ok((entry, Ok(result))) => {
                    self.progress.record(ProgressEvent::FileValidated {
                        matched: result.matched,
                    });
                    if !result.matched {
                        warn!(
                            file_id = %entry.source_id(),
                            path = %entry.path,
                            detail = ?result.detail,
                            "Copy failed final validation"
                        );
                        mismatches.push((entry, result));
                    }
                }
                Ok((entry, Err(e))) => {
                    warn!(
                        file_id = %entry.source_id(),
                        path = %entry.path,
                        error = %e,
                        "Could not validate copy"
                    );
                }
                Err(e) => error!(error = %e, "Validation task panicked"),
            }
        }
        mismatches
    }

    /// Turns validation mismatches into repair tasks
    ///
    /// Entries that exhausted their repair budget, or all of them when
    /// automatic repair is disabled, are marked failed instead.
    fn plan_repairs(
        &self,
        mapping: &MappingTable,
        mismatches: Vec<(MappingEntry, ValidationResult)>,
    ) -> Vec<TransferTask> {
        let max_repairs = self.options.migration.max_retries.max(1);
        let mut tasks = Vec::new();

        for (entry, result) in mismatches {
            let reason = format!(
                "{}{}",
                VALIDATION_FAILURE_PREFIX,
                result.detail.as_deref().unwrap_or("copy does not match source")
            );
            let repairable = self.options.migration.auto_fix_missing
                && entry.repair_count < max_repairs
                && entry.destination_parent_id.is_some();

            match (repairable, entry.destination_parent_id.clone()) {
                (true, Some(parent)) => {
                    let repair_count = entry.repair_count + 1;
                    mapping.update(entry.source_id(), |e| {
                        e.status = TransferStatus::Pending;
                        e.attempt_count = 0;
                        e.repair_count = repair_count;
                        e.last_error = Some(reason.clone());
                    });
                    self.progress.record(ProgressEvent::FileRepairQueued);
                    tasks.push(
                        TransferTask::new(entry.node, entry.path, parent)
                            .with_repair_count(repair_count),
                    );
                }
                _ => {
                    mapping.update(entry.source_id(), |e| {
                        e.mark_failed(TransferStatus::FailedTerminal, reason.clone());
                    });
                    self.progress.record(ProgressEvent::FileInvalidated);
                }
            }
        }
        tasks
    }

    // ========================================================================
    // Checkpoints and reporting
    // ========================================================================

    /// Flushes the mapping table, then records cursor and progress on the run
    async fn checkpoint(
        &self,
        run: &mut MigrationRun,
        cursor: Option<&WalkCursor>,
        mapping: &MappingTable,
    ) -> Result<(), MigrationError> {
        mapping.checkpoint().await?;

        let cursor_json = match cursor {
            Some(cursor) => match cursor.to_json() {
                Ok(json) => Some(json),
                Err(e) => {
                    warn!(error = %e, "Failed to serialize walk cursor");
                    run.walk_cursor().map(String::from)
                }
            },
            None => run.walk_cursor().map(String::from),
        };
        let snapshot = self.progress.snapshot();
        info!(
            folders = snapshot.folders_mapped(),
            files_done = snapshot.files_completed(),
            files_discovered = snapshot.files_discovered,
            throughput = %format!("{:.2}", snapshot.throughput_files_per_sec),
            eta_secs = snapshot.eta_seconds.map(|s| s.round() as u64),
            "Migration progress"
        );
        run.checkpoint(cursor_json, snapshot);
        self.store.save_run(run).await?;
        Ok(())
    }

    fn build_report(
        &self,
        run: &MigrationRun,
        outcome: RunOutcome,
        mapping: Option<&MappingTable>,
        walk_failures: Vec<FailureRecord>,
        fatal_error: Option<String>,
        elapsed: Duration,
    ) -> RunReport {
        let mut report = RunReport {
            run_id: *run.id(),
            source_root: run.source_root().clone(),
            destination_root: run.destination_root().clone(),
            outcome,
            final_state: run.state().clone(),
            resumed: run.is_resumed(),
            test_mode: run.test_mode(),
            started_at: run.started_at(),
            finished_at: run.finished_at().unwrap_or_else(Utc::now),
            elapsed_secs: elapsed.as_secs_f64(),
            folders: 0,
            folders_created: 0,
            folders_reused: 0,
            files: 0,
            successful: 0,
            failed: 0,
            skipped: 0,
            repaired: 0,
            validated: 0,
            validation_mismatches: 0,
            bytes_transferred: 0,
            files_per_second: 0.0,
            failures: Vec::new(),
            fatal_error,
        };
        report.apply_progress(&self.progress.snapshot());

        let mut failures = walk_failures;
        if let Some(mapping) = mapping {
            report.apply_tally(&mapping.tally());
            let seen: HashSet<NodeId> = failures.iter().map(|f| f.source_id.clone()).collect();
            failures.extend(
                mapping
                    .entries_where(|e| e.status == TransferStatus::FailedTerminal)
                    .into_iter()
                    .filter(|e| !seen.contains(e.source_id()))
                    .map(entry_failure),
            );
        }
        failures.sort_by(|a, b| a.path.cmp(&b.path));
        report.failures = failures;
        report
    }

    async fn write_report(&self, report: &RunReport) {
        let Some(directory) = &self.options.report_directory else {
            return;
        };
        let path = directory.join(report.file_name());
        let json = match serde_json::to_string_pretty(report) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize report");
                return;
            }
        };
        if let Err(e) = tokio::fs::create_dir_all(directory).await {
            warn!(path = %directory.display(), error = %e, "Failed to create report directory");
            return;
        }
        match tokio::fs::write(&path, json).await {
            Ok(()) => info!(path = %path.display(), "Report written"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to write report"),
        }
    }
}

fn walk_failure(error: &WalkError) -> Option<FailureRecord> {
    let kind = match error {
        WalkError::List { .. } => FailureKind::Listing,
        _ => FailureKind::Structure,
    };
    Some(FailureRecord {
        source_id: error.folder_id()?.clone(),
        path: error.path().to_string(),
        kind,
        reason: error.to_string(),
        attempts: 0,
    })
}

fn entry_failure(entry: MappingEntry) -> FailureRecord {
    let reason = entry.last_error.clone().unwrap_or_default();
    let kind = match entry.kind() {
        NodeKind::Folder => FailureKind::Structure,
        NodeKind::File if reason.starts_with(VALIDATION_FAILURE_PREFIX) => FailureKind::Validation,
        NodeKind::File => FailureKind::Transfer,
    };
    FailureRecord {
        source_id: entry.node.id,
        path: entry.path,
        kind,
        reason,
        attempts: entry.attempt_count,
    }
}
