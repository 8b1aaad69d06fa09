//! File transfer scheduling, retries and repairs

use std::sync::Arc;
use std::time::Duration;

use drivemig_core::config::MigrationConfig;
use drivemig_core::domain::{Node, TransferStatus, TransferTask};
use drivemig_core::ports::{IStorageProvider, StorageError};
use drivemig_engine::mapping::MappingTable;
use drivemig_engine::progress::ProgressTracker;
use drivemig_engine::retry::RetryPolicy;
use drivemig_engine::scheduler::{SchedulerSettings, TransferScheduler};
use drivemig_engine::validator::{IntegrityValidator, VALIDATION_FAILURE_PREFIX};
use tokio_util::sync::CancellationToken;

use crate::common::{id, test_migration_config, FakeDrive, MemoryStore, Op};

struct Fixture {
    drive: Arc<FakeDrive>,
    mapping: Arc<MappingTable>,
    progress: Arc<ProgressTracker>,
    scheduler: Arc<TransferScheduler>,
}

fn fixture_with(drive: FakeDrive, config: MigrationConfig) -> Fixture {
    let drive = Arc::new(drive);
    drive.add_folder(None, "src", "Source");
    drive.add_folder(None, "dst", "Destination");
    for i in 1..=6 {
        drive.add_file("src", &format!("f{i}"), &format!("file-{i}.txt"), 10 * i as u64);
    }

    let mapping = Arc::new(MappingTable::new("src->dst", MemoryStore::new()));
    let progress = Arc::new(ProgressTracker::new());
    let validator = Arc::new(IntegrityValidator::new(
        drive.clone(),
        RetryPolicy::from_config(&config),
        config.preserve_dates,
    ));
    let scheduler = Arc::new(TransferScheduler::new(
        drive.clone(),
        mapping.clone(),
        progress.clone(),
        validator,
        SchedulerSettings::from_config(&config),
    ));
    Fixture {
        drive,
        mapping,
        progress,
        scheduler,
    }
}

fn fixture() -> Fixture {
    fixture_with(FakeDrive::new(), test_migration_config())
}

impl Fixture {
    async fn task(&self, file_id: &str) -> TransferTask {
        let node = self.drive.get_node(&id(file_id)).await.unwrap();
        let path = node.name.clone();
        TransferTask::new(node, path, id("dst"))
    }

    async fn tasks(&self, file_ids: &[&str]) -> Vec<TransferTask> {
        let mut tasks = Vec::new();
        for file_id in file_ids {
            tasks.push(self.task(file_id).await);
        }
        tasks
    }
}

#[tokio::test]
async fn test_copies_and_validates_every_task() {
    let f = fixture();
    let tasks = f.tasks(&["f1", "f2"]).await;

    let summary = f.scheduler.run_tasks(tasks, CancellationToken::new()).await;

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    let copy = f.drive.child_named(&id("dst"), "file-1.txt").unwrap();
    let entry = f.mapping.get(&id("f1")).unwrap();
    assert_eq!(entry.status, TransferStatus::Succeeded);
    assert_eq!(entry.destination_id, Some(copy.id));

    let s = f.progress.snapshot();
    assert_eq!(s.files_succeeded, 2);
    assert_eq!(s.files_validated, 2);
    assert_eq!(s.bytes_transferred, 30);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_is_retried() {
    let f = fixture();
    f.drive.fail_next(
        Op::Copy,
        Some("f1"),
        StorageError::Transient("503 backend error".into()),
    );
    let tasks = f.tasks(&["f1", "f2"]).await;

    let summary = f.scheduler.run_tasks(tasks, CancellationToken::new()).await;

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.retried, 1);
    assert_eq!(f.drive.calls(Op::Copy), 3);
    assert_eq!(f.drive.count_named(&id("dst"), "file-1.txt"), 1);
    assert_eq!(f.mapping.get(&id("f1")).unwrap().attempt_count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_lost_copy_response_adopts_the_copy() {
    let f = fixture();
    f.drive.lose_next_response(
        Op::Copy,
        Some("f1"),
        StorageError::Timeout(Duration::from_secs(30)),
    );
    let tasks = f.tasks(&["f1"]).await;

    let summary = f.scheduler.run_tasks(tasks, CancellationToken::new()).await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(f.drive.calls(Op::Copy), 1);
    assert_eq!(f.drive.count_named(&id("dst"), "file-1.txt"), 1);
    assert_eq!(f.mapping.status(&id("f1")), Some(TransferStatus::Succeeded));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_fail_terminally() {
    let f = fixture();
    for _ in 0..3 {
        f.drive
            .fail_next(Op::Copy, Some("f1"), StorageError::RateLimited { retry_after: None });
    }
    let tasks = f.tasks(&["f1", "f2"]).await;

    let summary = f.scheduler.run_tasks(tasks, CancellationToken::new()).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.retried, 2);
    let entry = f.mapping.get(&id("f1")).unwrap();
    assert_eq!(entry.status, TransferStatus::FailedTerminal);
    assert_eq!(entry.attempt_count, 3);
    assert_eq!(f.progress.snapshot().files_failed, 1);
}

#[tokio::test]
async fn test_permanent_error_is_not_retried() {
    let f = fixture();
    f.drive.fail_next(
        Op::Copy,
        Some("f1"),
        StorageError::PermissionDenied("no access".into()),
    );
    let tasks = f.tasks(&["f1"]).await;

    let summary = f.scheduler.run_tasks(tasks, CancellationToken::new()).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.retried, 0);
    assert_eq!(f.drive.calls(Op::Copy), 1);
}

#[tokio::test]
async fn test_duplicate_tasks_are_ignored() {
    let f = fixture();
    let (tx, rx) = f.scheduler.channel();
    tx.send(f.task("f1").await).await.unwrap();
    tx.send(f.task("f1").await).await.unwrap();
    drop(tx);

    let summary = f.scheduler.run(rx, CancellationToken::new()).await;

    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(f.drive.calls(Op::Copy), 1);
}

#[tokio::test]
async fn test_identical_file_in_destination_is_skipped() {
    let f = fixture();
    f.drive.add_node(
        Node::file(id("pre"), "file-1.txt", id("dst"), 10)
            .with_checksum("md5-f1")
            .with_mime_type("text/plain"),
    );
    let task = f.task("f1").await.with_check_existing(true);

    let summary = f.scheduler.run_tasks(vec![task], CancellationToken::new()).await;

    assert_eq!(summary.skipped, 1);
    assert_eq!(f.drive.calls(Op::Copy), 0);
    let entry = f.mapping.get(&id("f1")).unwrap();
    assert_eq!(entry.status, TransferStatus::Skipped);
    assert_eq!(entry.destination_id, Some(id("pre")));
    assert_eq!(f.progress.snapshot().files_skipped, 1);
}

#[tokio::test]
async fn test_corrupt_copy_is_repaired() {
    let f = fixture();
    f.drive.corrupt_copies_of("file-1.txt", 1);
    let tasks = f.tasks(&["f1"]).await;

    let summary = f.scheduler.run_tasks(tasks, CancellationToken::new()).await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.repaired, 1);
    assert_eq!(f.drive.calls(Op::Copy), 2);

    let entry = f.mapping.get(&id("f1")).unwrap();
    assert_eq!(entry.repair_count, 1);
    let destination = entry.destination_id.unwrap();
    let metadata = f.drive.get_metadata(&destination).await.unwrap();
    assert_eq!(metadata.checksum.as_deref(), Some("md5-f1"));

    let s = f.progress.snapshot();
    assert_eq!(s.validation_mismatches, 1);
    assert_eq!(s.files_repaired, 1);
    assert_eq!(s.files_succeeded, 1);
}

#[tokio::test]
async fn test_corrupt_copy_without_auto_fix_fails() {
    let config = MigrationConfig {
        auto_fix_missing: false,
        ..test_migration_config()
    };
    let f = fixture_with(FakeDrive::new(), config);
    f.drive.corrupt_copies_of("file-1.txt", 1);
    let tasks = f.tasks(&["f1"]).await;

    let summary = f.scheduler.run_tasks(tasks, CancellationToken::new()).await;

    assert_eq!(summary.failed, 1);
    let entry = f.mapping.get(&id("f1")).unwrap();
    assert_eq!(entry.status, TransferStatus::FailedTerminal);
    assert!(entry
        .last_error
        .unwrap()
        .starts_with(VALIDATION_FAILURE_PREFIX));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_drains_in_flight_transfers() {
    let f = fixture_with(
        FakeDrive::new().with_copy_delay(Duration::from_secs(1)),
        test_migration_config(),
    );
    let tasks = f.tasks(&["f1", "f2", "f3", "f4", "f5", "f6"]).await;
    let cancel = CancellationToken::new();

    let run = {
        let scheduler = f.scheduler.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run_tasks(tasks, cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;
    cancel.cancel();
    let summary = run.await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(f.drive.calls(Op::Copy), 2);
    assert_eq!(f.mapping.status(&id("f3")), None);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_copy_times_out_and_is_retried() {
    let config = MigrationConfig {
        timeout_seconds: 30,
        ..test_migration_config()
    };
    let f = fixture_with(FakeDrive::new(), config);
    f.drive.stall_next_copy("f1");
    let tasks = f.tasks(&["f1"]).await;
    let start = tokio::time::Instant::now();

    let summary = f.scheduler.run_tasks(tasks, CancellationToken::new()).await;

    assert!(start.elapsed() >= Duration::from_secs(30));
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.retried, 1);
    assert_eq!(f.drive.calls(Op::Copy), 2);
    assert_eq!(f.drive.count_named(&id("dst"), "file-1.txt"), 1);
    let entry = f.mapping.get(&id("f1")).unwrap();
    assert_eq!(entry.status, TransferStatus::Succeeded);
    assert_eq!(entry.attempt_count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_copy_fails_after_attempt_budget() {
    let config = MigrationConfig {
        timeout_seconds: 10,
        ..test_migration_config()
    };
    let f = fixture_with(FakeDrive::new(), config);
    for _ in 0..3 {
        f.drive.stall_next_copy("f1");
    }
    let tasks = f.tasks(&["f1"]).await;

    let summary = f.scheduler.run_tasks(tasks, CancellationToken::new()).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.retried, 2);
    let entry = f.mapping.get(&id("f1")).unwrap();
    assert_eq!(entry.status, TransferStatus::FailedTerminal);
    assert_eq!(
        entry.last_error.as_deref(),
        Some(StorageError::Timeout(Duration::from_secs(10)).to_string().as_str())
    );
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_copies_bounded_by_workers() {
    let config = MigrationConfig {
        workers: 3,
        ..test_migration_config()
    };
    let f = fixture_with(
        FakeDrive::new().with_copy_delay(Duration::from_secs(1)),
        config,
    );
    let tasks = f.tasks(&["f1", "f2", "f3", "f4", "f5", "f6"]).await;

    let summary = f.scheduler.run_tasks(tasks, CancellationToken::new()).await;

    assert_eq!(summary.succeeded, 6);
    let peak = f.drive.peak_concurrent_copies();
    assert!(peak <= 3, "peak of {} concurrent copies", peak);
    assert!(peak > 1);
}
