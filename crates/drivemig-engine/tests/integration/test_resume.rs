//! Resume across process restarts with the SQLite mapping store

use std::path::Path;
use std::sync::Arc;

use drivemig_cache::{DatabasePool, SqliteMappingStore};
use drivemig_core::domain::{RunOutcome, TransferStatus};
use drivemig_core::ports::IMappingStore;
use drivemig_engine::{MigrationOptions, MigrationOrchestrator};
use tokio_util::sync::CancellationToken;

use crate::common::{id, test_migration_config, FakeDrive, Op};

async fn open_store(path: &Path) -> (DatabasePool, Arc<SqliteMappingStore>) {
    let pool = DatabasePool::new(path).await.unwrap();
    let store = Arc::new(SqliteMappingStore::new(pool.pool().clone()));
    (pool, store)
}

fn options() -> MigrationOptions {
    MigrationOptions {
        source_root: id("src"),
        destination_root: id("dst"),
        test_mode: false,
        max_files: None,
        migration: test_migration_config(),
        report_directory: None,
    }
}

#[tokio::test]
async fn test_resume_after_restart_with_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state.db");

    let drive = Arc::new(FakeDrive::new().with_page_size(3));
    drive.add_folder(None, "src", "Source");
    drive.add_folder(None, "dst", "Destination");
    drive.add_folder(Some("src"), "docs", "Docs");
    drive.add_folder(Some("docs"), "deep", "Deep");
    for i in 0..4 {
        drive.add_file("src", &format!("r{i}"), &format!("root-{i}.txt"), 3);
        drive.add_file("docs", &format!("d{i}"), &format!("doc-{i}.txt"), 3);
        drive.add_file("deep", &format!("p{i}"), &format!("deep-{i}.txt"), 3);
    }

    // First process: interrupted after a few copies
    let (pool, store) = open_store(&db_path).await;
    let cancel = CancellationToken::new();
    drive.cancel_after_copies(4, cancel.clone());
    let first = MigrationOrchestrator::new(drive.clone(), store.clone(), options())
        .run(cancel)
        .await;
    assert_eq!(first.outcome, RunOutcome::Interrupted);
    let copied_before_restart = drive.calls(Op::Copy);
    pool.close().await;
    drop(store);

    // Second process: same database file, fresh everything else
    drive.cancel_after_copies(usize::MAX, CancellationToken::new());
    let (pool, store) = open_store(&db_path).await;
    let second = MigrationOrchestrator::new(drive.clone(), store.clone(), options())
        .run(CancellationToken::new())
        .await;

    assert_eq!(second.outcome, RunOutcome::Done);
    assert!(second.resumed);
    assert_eq!(second.run_id, first.run_id);
    assert_eq!(second.files, 12);
    assert_eq!(second.successful, 12);
    assert_eq!(second.folders, 2);
    assert_eq!(drive.calls(Op::CreateFolder), 2);
    assert_eq!(drive.calls(Op::Copy) - copied_before_restart, 12 - first.successful as usize);

    let docs = drive.child_named(&id("dst"), "Docs").unwrap();
    let deep = drive.child_named(&docs.id, "Deep").unwrap();
    for i in 0..4 {
        assert_eq!(drive.count_named(&id("dst"), &format!("root-{i}.txt")), 1);
        assert_eq!(drive.count_named(&docs.id, &format!("doc-{i}.txt")), 1);
        assert_eq!(drive.count_named(&deep.id, &format!("deep-{i}.txt")), 1);
    }

    let scope = drivemig_core::domain::MigrationRun::scope_for(&id("src"), &id("dst"));
    let entries = store.load_entries(&scope).await.unwrap();
    assert!(entries
        .iter()
        .filter(|e| e.node.parent_id.is_some())
        .all(|e| matches!(e.status, TransferStatus::Succeeded)));
    assert!(store.find_resumable_run(&scope).await.unwrap().is_none());
    pool.close().await;
}
