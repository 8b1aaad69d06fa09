//! Destination folder creation

use std::sync::Arc;

use drivemig_core::domain::TransferStatus;
use drivemig_core::ports::{IStorageProvider, StorageError};
use drivemig_engine::error::StructureError;
use drivemig_engine::mapping::MappingTable;
use drivemig_engine::progress::ProgressTracker;
use drivemig_engine::retry::RetryPolicy;
use drivemig_engine::structure::{FolderOutcome, StructureBuilder, StructureOptions};

use crate::common::{id, test_migration_config, FakeDrive, MemoryStore, Op};

const SCOPE: &str = "src->dst";

struct Fixture {
    drive: Arc<FakeDrive>,
    store: Arc<MemoryStore>,
    mapping: Arc<MappingTable>,
    progress: Arc<ProgressTracker>,
    builder: StructureBuilder,
}

fn fixture() -> Fixture {
    let drive = Arc::new(FakeDrive::new());
    drive.add_folder(None, "src", "Source");
    drive.add_folder(None, "dst", "Destination");
    drive.add_folder(Some("src"), "fa", "A");
    drive.add_folder(Some("fa"), "fb", "B");

    let store = MemoryStore::new();
    let mapping = Arc::new(MappingTable::new(SCOPE, store.clone()));
    let progress = Arc::new(ProgressTracker::new());
    let builder = StructureBuilder::new(
        drive.clone(),
        mapping.clone(),
        progress.clone(),
        StructureOptions {
            source_root: id("src"),
            destination_root: id("dst"),
            preserve_dates: true,
            preserve_sharing: false,
            retry: RetryPolicy::from_config(&test_migration_config()),
        },
    );
    Fixture {
        drive,
        store,
        mapping,
        progress,
        builder,
    }
}

impl Fixture {
    async fn map_root(&self) {
        let root = self.drive.get_node(&id("src")).await.unwrap();
        let outcome = self.builder.ensure_destination_folder(&root, "").await.unwrap();
        assert_eq!(outcome, FolderOutcome::Cached(id("dst")));
    }
}

#[tokio::test]
async fn test_creates_nested_folders_once() {
    let f = fixture();
    f.map_root().await;

    let a = f.drive.get_node(&id("fa")).await.unwrap();
    let b = f.drive.get_node(&id("fb")).await.unwrap();

    let created_a = f.builder.ensure_destination_folder(&a, "A").await.unwrap();
    assert!(matches!(created_a, FolderOutcome::Created(_)));
    let dest_a = created_a.destination_id().clone();
    assert_eq!(f.drive.child_named(&id("dst"), "A").unwrap().id, dest_a);

    let created_b = f.builder.ensure_destination_folder(&b, "A/B").await.unwrap();
    assert!(matches!(created_b, FolderOutcome::Created(_)));
    assert_eq!(f.drive.count_named(&dest_a, "B"), 1);

    // The destination root may hold anything; the fresh folder A cannot
    assert_eq!(f.drive.calls(Op::Find), 1);

    let again = f.builder.ensure_destination_folder(&a, "A").await.unwrap();
    assert_eq!(again, FolderOutcome::Cached(dest_a.clone()));
    assert_eq!(f.drive.calls(Op::CreateFolder), 2);

    let entry = f.store.entry(SCOPE, &id("fa")).unwrap();
    assert_eq!(entry.status, TransferStatus::Succeeded);
    assert_eq!(entry.destination_id, Some(dest_a));
    assert_eq!(f.progress.snapshot().folders_created, 2);
}

#[tokio::test]
async fn test_reuses_existing_destination_folder() {
    let f = fixture();
    let existing = f.drive.add_folder(Some("dst"), "already-there", "A");
    f.map_root().await;

    let a = f.drive.get_node(&id("fa")).await.unwrap();
    let outcome = f.builder.ensure_destination_folder(&a, "A").await.unwrap();

    assert_eq!(outcome, FolderOutcome::Reused(existing));
    assert_eq!(f.drive.calls(Op::CreateFolder), 0);
    assert_eq!(f.mapping.status(&id("fa")), Some(TransferStatus::Skipped));
    assert_eq!(f.progress.snapshot().folders_reused, 1);
}

#[tokio::test(start_paused = true)]
async fn test_lost_create_response_does_not_duplicate() {
    let f = fixture();
    f.map_root().await;
    f.drive.lose_next_response(
        Op::CreateFolder,
        Some("A"),
        StorageError::Transient("connection reset".into()),
    );

    let a = f.drive.get_node(&id("fa")).await.unwrap();
    let outcome = f.builder.ensure_destination_folder(&a, "A").await.unwrap();

    assert!(matches!(outcome, FolderOutcome::Reused(_)));
    assert_eq!(f.drive.count_named(&id("dst"), "A"), 1);
    assert_eq!(f.drive.calls(Op::CreateFolder), 1);
    assert_eq!(f.mapping.get(&id("fa")).unwrap().attempt_count, 2);
}

#[tokio::test]
async fn test_in_flight_entry_is_looked_up_before_creating() {
    let f = fixture();
    f.map_root().await;

    // A previous run created A but crashed before recording the result
    let a = f.drive.get_node(&id("fa")).await.unwrap();
    let created = f.builder.ensure_destination_folder(&a, "A").await.unwrap();
    let dest_a = created.destination_id().clone();
    f.mapping.update(&id("fa"), |e| e.mark_in_flight());
    assert_eq!(f.mapping.destination_of(&id("fa")), None);

    let outcome = f.builder.ensure_destination_folder(&a, "A").await.unwrap();
    assert_eq!(outcome, FolderOutcome::Reused(dest_a));
    assert_eq!(f.drive.count_named(&id("dst"), "A"), 1);
    assert_eq!(f.drive.calls(Op::CreateFolder), 1);
}

#[tokio::test]
async fn test_missing_parent() {
    let f = fixture();
    f.map_root().await;

    let b = f.drive.get_node(&id("fb")).await.unwrap();
    let err = f.builder.ensure_destination_folder(&b, "A/B").await.unwrap_err();

    assert!(matches!(err, StructureError::MissingParent { .. }));
    assert_eq!(f.drive.calls(Op::CreateFolder), 0);
    assert_eq!(f.progress.snapshot().folders_failed, 1);
}

#[tokio::test]
async fn test_permanent_failure_marks_entry_failed() {
    let f = fixture();
    f.map_root().await;
    f.drive.fail_next(
        Op::CreateFolder,
        Some("A"),
        StorageError::PermissionDenied("read-only".into()),
    );

    let a = f.drive.get_node(&id("fa")).await.unwrap();
    let err = f.builder.ensure_destination_folder(&a, "A").await.unwrap_err();

    assert!(matches!(err, StructureError::CreateFailed { .. }));
    let entry = f.store.entry(SCOPE, &id("fa")).unwrap();
    assert_eq!(entry.status, TransferStatus::FailedTerminal);
    assert!(entry.last_error.unwrap().contains("read-only"));
}
