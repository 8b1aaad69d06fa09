//! End-to-end migration runs against the in-memory drive

use std::sync::Arc;

use drivemig_core::config::MigrationConfig;
use drivemig_core::domain::{FailureKind, MigrationRun, RunOutcome, RunState, TransferStatus};
use drivemig_core::ports::StorageError;
use drivemig_engine::{MigrationOptions, MigrationOrchestrator};
use tokio_util::sync::CancellationToken;

use crate::common::{id, test_migration_config, FakeDrive, MemoryStore, Op};

fn options(migration: MigrationConfig) -> MigrationOptions {
    MigrationOptions {
        source_root: id("src"),
        destination_root: id("dst"),
        test_mode: false,
        max_files: None,
        migration,
        report_directory: None,
    }
}

/// src/{r1.txt, A/{a1.txt, B/{b1.txt}}}
fn standard_drive() -> Arc<FakeDrive> {
    let drive = Arc::new(FakeDrive::new());
    drive.add_folder(None, "src", "Source");
    drive.add_folder(None, "dst", "Destination");
    drive.add_file("src", "r1", "r1.txt", 10);
    drive.add_folder(Some("src"), "fa", "A");
    drive.add_file("fa", "a1", "a1.txt", 20);
    drive.add_folder(Some("fa"), "fb", "B");
    drive.add_file("fb", "b1", "b1.txt", 30);
    drive
}

fn orchestrator(
    drive: &Arc<FakeDrive>,
    store: &Arc<MemoryStore>,
    options: MigrationOptions,
) -> MigrationOrchestrator {
    MigrationOrchestrator::new(drive.clone(), store.clone(), options)
}

fn scope() -> String {
    MigrationRun::scope_for(&id("src"), &id("dst"))
}

#[tokio::test]
async fn test_migrates_full_tree() {
    let drive = standard_drive();
    let store = MemoryStore::new();
    let reports = tempfile::tempdir().unwrap();
    let mut opts = options(test_migration_config());
    opts.report_directory = Some(reports.path().to_path_buf());

    let report = orchestrator(&drive, &store, opts)
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(report.final_state, RunState::Done);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.folders, 2);
    assert_eq!(report.folders_created, 2);
    assert_eq!(report.files, 3);
    assert_eq!(report.successful, 3);
    assert_eq!(report.failed, 0);
    assert!(report.failures.is_empty());
    assert_eq!(report.bytes_transferred, 60);

    let a = drive.child_named(&id("dst"), "A").unwrap();
    let b = drive.child_named(&a.id, "B").unwrap();
    assert!(drive.child_named(&id("dst"), "r1.txt").is_some());
    assert!(drive.child_named(&a.id, "a1.txt").is_some());
    assert!(drive.child_named(&b.id, "b1.txt").is_some());

    let (run, archived) = store.run(&report.run_id).unwrap();
    assert!(archived);
    assert_eq!(*run.state(), RunState::Done);
    assert_eq!(store.reports().len(), 1);
    assert!(reports.path().join(report.file_name()).exists());
}

#[tokio::test]
async fn test_two_folders_one_empty() {
    let drive = Arc::new(FakeDrive::new());
    drive.add_folder(None, "src", "Source");
    drive.add_folder(None, "dst", "Destination");
    drive.add_folder(Some("src"), "fa", "A");
    drive.add_folder(Some("src"), "fb", "B");
    for i in 0..3 {
        drive.add_file("fa", &format!("a{i}"), &format!("a{i}.txt"), 4);
    }

    let report = orchestrator(&drive, &MemoryStore::new(), options(test_migration_config()))
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(report.folders, 2);
    assert_eq!(report.files, 3);
    assert_eq!(report.successful, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(report.skipped, 0);
    assert_eq!(drive.calls(Op::CreateFolder), 2);
    assert_eq!(drive.calls(Op::Copy), 3);
    let b = drive.child_named(&id("dst"), "B").unwrap();
    assert!(drive.children_of(&b.id).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_absorbed() {
    let drive = standard_drive();
    let store = MemoryStore::new();
    for _ in 0..2 {
        drive.fail_next(
            Op::Copy,
            Some("a1"),
            StorageError::Transient("500 internal error".into()),
        );
    }

    let report = orchestrator(&drive, &store, options(test_migration_config()))
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(report.successful, 3);
    assert_eq!(report.failed, 0);
    assert!(report.failures.is_empty());
    let a = drive.child_named(&id("dst"), "A").unwrap();
    assert_eq!(drive.count_named(&a.id, "a1.txt"), 1);
}

#[tokio::test]
async fn test_test_mode_caps_file_count() {
    let drive = Arc::new(FakeDrive::new());
    drive.add_folder(None, "src", "Source");
    drive.add_folder(None, "dst", "Destination");
    for i in 0..50 {
        drive.add_file("src", &format!("t{i}"), &format!("file-{i:02}.txt"), 1);
    }
    let mut opts = options(test_migration_config());
    opts.test_mode = true;
    opts.max_files = Some(10);

    let report = orchestrator(&drive, &MemoryStore::new(), opts)
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.outcome, RunOutcome::Done);
    assert!(report.test_mode);
    assert_eq!(report.files, 10);
    assert_eq!(report.successful, 10);
    assert_eq!(drive.children_of(&id("dst")).len(), 10);
}

#[tokio::test]
async fn test_missing_destination_root_fails_the_run() {
    let drive = Arc::new(FakeDrive::new());
    drive.add_folder(None, "src", "Source");
    let store = MemoryStore::new();

    let report = orchestrator(&drive, &store, options(test_migration_config()))
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(report.exit_code(), 1);
    assert!(matches!(report.final_state, RunState::Failed(_)));
    assert!(report.fatal_error.unwrap().contains("destination"));
    assert_eq!(drive.calls(Op::Copy), 0);
}

#[tokio::test]
async fn test_folder_failure_skips_subtree() {
    let drive = standard_drive();
    drive.fail_next(
        Op::CreateFolder,
        Some("A"),
        StorageError::PermissionDenied("quota".into()),
    );

    let report = orchestrator(&drive, &MemoryStore::new(), options(test_migration_config()))
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(report.successful, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, FailureKind::Structure);
    assert_eq!(report.failures[0].path, "A");
    assert_eq!(drive.calls(Op::Copy), 1);
}

#[tokio::test]
async fn test_listing_failure_is_reported() {
    let drive = standard_drive();
    drive.fail_next(
        Op::List,
        Some("fb"),
        StorageError::PermissionDenied("hidden".into()),
    );

    let report = orchestrator(&drive, &MemoryStore::new(), options(test_migration_config()))
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(report.successful, 2);
    let listing: Vec<_> = report
        .failures
        .iter()
        .filter(|f| f.kind == FailureKind::Listing)
        .collect();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].source_id, id("fb"));
    assert_eq!(listing[0].path, "A/B");
}

#[tokio::test]
async fn test_final_validation_repairs_bad_copy() {
    let drive = standard_drive();
    let store = MemoryStore::new();
    drive.corrupt_copies_of("a1.txt", 1);
    let config = MigrationConfig {
        validate_checksums: false,
        ..test_migration_config()
    };

    let report = orchestrator(&drive, &store, options(config))
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(report.validation_mismatches, 1);
    assert_eq!(report.repaired, 1);
    assert_eq!(report.successful, 3);
    assert!(report.failures.is_empty());

    let entry = store.entry(&scope(), &id("a1")).unwrap();
    assert_eq!(entry.status, TransferStatus::Succeeded);
    assert_eq!(entry.repair_count, 1);
}

#[tokio::test]
async fn test_final_validation_without_auto_fix_reports_failure() {
    let drive = standard_drive();
    drive.corrupt_copies_of("a1.txt", 1);
    let config = MigrationConfig {
        validate_checksums: false,
        auto_fix_missing: false,
        ..test_migration_config()
    };

    let report = orchestrator(&drive, &MemoryStore::new(), options(config))
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(report.successful, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, FailureKind::Validation);
    assert_eq!(report.failures[0].path, "A/a1.txt");
}

#[tokio::test]
async fn test_rerun_after_completion_copies_nothing() {
    let drive = standard_drive();
    let store = MemoryStore::new();

    let first = orchestrator(&drive, &store, options(test_migration_config()))
        .run(CancellationToken::new())
        .await;
    assert_eq!(first.outcome, RunOutcome::Done);
    let copies = drive.calls(Op::Copy);
    let creates = drive.calls(Op::CreateFolder);

    let second = orchestrator(&drive, &store, options(test_migration_config()))
        .run(CancellationToken::new())
        .await;

    assert_eq!(second.outcome, RunOutcome::Done);
    assert!(!second.resumed);
    assert_ne!(second.run_id, first.run_id);
    assert_eq!(second.successful, 3);
    assert_eq!(drive.calls(Op::Copy), copies);
    assert_eq!(drive.calls(Op::CreateFolder), creates);
}

#[tokio::test]
async fn test_interrupted_run_resumes_without_duplicates() {
    let drive = Arc::new(FakeDrive::new());
    drive.add_folder(None, "src", "Source");
    drive.add_folder(None, "dst", "Destination");
    for (folder_id, name) in [("fa", "A"), ("fb", "B")] {
        drive.add_folder(Some("src"), folder_id, name);
        for i in 0..5 {
            drive.add_file(folder_id, &format!("{folder_id}-{i}"), &format!("{name}-{i}.txt"), 5);
        }
    }
    let store = MemoryStore::new();

    let cancel = CancellationToken::new();
    drive.cancel_after_copies(3, cancel.clone());
    let first = orchestrator(&drive, &store, options(test_migration_config()))
        .run(cancel)
        .await;

    assert_eq!(first.outcome, RunOutcome::Interrupted);
    assert_eq!(first.exit_code(), 130);
    assert!(first.successful < 10);
    let (run, archived) = store.run(&first.run_id).unwrap();
    assert!(!archived);
    assert!(!run.state().is_terminal());

    drive.cancel_after_copies(usize::MAX, CancellationToken::new());
    let second = orchestrator(&drive, &store, options(test_migration_config()))
        .run(CancellationToken::new())
        .await;

    assert_eq!(second.outcome, RunOutcome::Done);
    assert!(second.resumed);
    assert_eq!(second.run_id, first.run_id);
    assert_eq!(second.successful, 10);
    assert_eq!(second.folders, 2);
    assert_eq!(drive.calls(Op::CreateFolder), 2);

    for name in ["A", "B"] {
        let folder = drive.child_named(&id("dst"), name).unwrap();
        assert_eq!(drive.count_named(&id("dst"), name), 1);
        for i in 0..5 {
            assert_eq!(drive.count_named(&folder.id, &format!("{name}-{i}.txt")), 1);
        }
    }
}
