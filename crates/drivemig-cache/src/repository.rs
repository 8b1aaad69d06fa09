//! SQLite implementation of IMappingStore
//!
//! This module provides the concrete SQLite-based implementation of the
//! mapping store port defined in drivemig-core. It handles all domain
//! type serialization/deserialization and SQL query construction.
//!
//! ## Type Mapping
//!
//! | Domain Type         | SQL Type | Strategy                    |
//! |---------------------|----------|-----------------------------|
//! | NodeId              | TEXT     | String via `.as_str()` / `NodeId::new()` |
//! | RunId               | TEXT     | UUID string via `.to_string()` / `FromStr` |
//! | DateTime<Utc>       | TEXT     | ISO 8601 via `to_rfc3339()` / `DateTime::parse_from_rfc3339()` |
//! | RunState            | TEXT     | `Display` / `FromStr` (`failed: <reason>` for failures) |
//! | TransferStatus      | TEXT     | `as_str()` / `FromStr`      |
//! | Node                | TEXT     | serde_json serialization    |
//! | ProgressSnapshot    | TEXT     | serde_json serialization    |
//! | RunReport           | TEXT     | serde_json serialization    |
//! | bool                | INTEGER  | 0 / 1                       |

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use drivemig_core::domain::{
    newtypes::{NodeId, RunId},
    MappingEntry, MigrationRun, Node, ProgressSnapshot, RunReport, RunState, TransferStatus,
};
use drivemig_core::ports::IMappingStore;

use crate::CacheError;

/// SQLite-based implementation of the mapping store port
///
/// All operations are performed through a connection pool; batch writes
/// run inside a single transaction.
pub struct SqliteMappingStore {
    pool: SqlitePool,
}

impl SqliteMappingStore {
    /// Creates a new store instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of mapping entries recorded for a scope
    pub async fn count_entries(&self, scope: &str) -> Result<u64, CacheError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mapping_entries WHERE scope = ?")
            .bind(scope)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Archived report of a run, if the run has finished
    pub async fn get_report(&self, run_id: &RunId) -> Result<Option<RunReport>, CacheError> {
        let report: Option<Option<String>> =
            sqlx::query_scalar("SELECT report FROM migration_runs WHERE id = ?")
                .bind(run_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        match report.flatten() {
            Some(json) => serde_json::from_str(&json).map(Some).map_err(|e| {
                CacheError::SerializationError(format!("Invalid stored report: {}", e))
            }),
            None => Ok(None),
        }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Parse a DateTime<Utc> from an ISO 8601 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

/// Parse an optional DateTime<Utc> from an optional string
fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CacheError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

fn parse_node_id(s: &str) -> Result<NodeId, CacheError> {
    NodeId::new(s)
        .map_err(|e| CacheError::SerializationError(format!("Invalid NodeId '{}': {}", s, e)))
}

fn parse_optional_node_id(s: Option<String>) -> Result<Option<NodeId>, CacheError> {
    s.map(|id| parse_node_id(&id)).transpose()
}

// ============================================================================
// Row mapping functions
// ============================================================================

/// Reconstruct a MigrationRun from a database row
fn run_from_row(row: &SqliteRow) -> Result<MigrationRun, CacheError> {
    let id_str: String = row.get("id");
    let source_root_str: String = row.get("source_root");
    let destination_root_str: String = row.get("destination_root");
    let state_str: String = row.get("state");
    let test_mode: i64 = row.get("test_mode");
    let resumed: i64 = row.get("resumed");
    let started_at_str: String = row.get("started_at");
    let updated_at_str: String = row.get("updated_at");
    let finished_at_str: Option<String> = row.get("finished_at");
    let walk_cursor: Option<String> = row.get("walk_cursor");
    let progress_str: Option<String> = row.get("progress");

    let id = RunId::from_str(&id_str).map_err(|e| {
        CacheError::SerializationError(format!("Invalid RunId '{}': {}", id_str, e))
    })?;
    let state = RunState::from_str(&state_str).map_err(|e| {
        CacheError::SerializationError(format!("Invalid run state '{}': {}", state_str, e))
    })?;

    let progress: Option<ProgressSnapshot> = match progress_str {
        Some(json) => Some(serde_json::from_str(&json).map_err(|e| {
            CacheError::SerializationError(format!("Invalid progress snapshot: {}", e))
        })?),
        None => None,
    };

    Ok(MigrationRun::restore(
        id,
        parse_node_id(&source_root_str)?,
        parse_node_id(&destination_root_str)?,
        state,
        test_mode != 0,
        resumed != 0,
        parse_datetime(&started_at_str)?,
        parse_datetime(&updated_at_str)?,
        parse_optional_datetime(finished_at_str)?,
        walk_cursor,
        progress,
    ))
}

/// Reconstruct a MappingEntry from a database row
///
/// The source node snapshot is stored as JSON; the remaining columns are
/// authoritative for the entry's lifecycle fields.
fn entry_from_row(row: &SqliteRow) -> Result<MappingEntry, CacheError> {
    let node_str: String = row.get("source_node");
    let path: String = row.get("path");
    let destination_id: Option<String> = row.get("destination_id");
    let destination_parent_id: Option<String> = row.get("destination_parent_id");
    let status_str: String = row.get("status");
    let attempt_count: i64 = row.get("attempt_count");
    let repair_count: i64 = row.get("repair_count");
    let last_error: Option<String> = row.get("last_error");
    let updated_at_str: String = row.get("updated_at");

    let node: Node = serde_json::from_str(&node_str)
        .map_err(|e| CacheError::SerializationError(format!("Invalid source node: {}", e)))?;
    let status = TransferStatus::from_str(&status_str).map_err(|e| {
        CacheError::SerializationError(format!("Invalid status '{}': {}", status_str, e))
    })?;

    Ok(MappingEntry {
        node,
        path,
        destination_id: parse_optional_node_id(destination_id)?,
        destination_parent_id: parse_optional_node_id(destination_parent_id)?,
        status,
        attempt_count: attempt_count as u32,
        repair_count: repair_count as u32,
        last_error,
        updated_at: parse_datetime(&updated_at_str)?,
    })
}

const UPSERT_ENTRY_SQL: &str = "INSERT INTO mapping_entries \
     (scope, source_id, source_node, kind, path, destination_id, destination_parent_id, \
      status, attempt_count, repair_count, last_error, updated_at) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
     ON CONFLICT(scope, source_id) DO UPDATE SET \
      source_node = excluded.source_node, \
      kind = excluded.kind, \
      path = excluded.path, \
      destination_id = excluded.destination_id, \
      destination_parent_id = excluded.destination_parent_id, \
      status = excluded.status, \
      attempt_count = excluded.attempt_count, \
      repair_count = excluded.repair_count, \
      last_error = excluded.last_error, \
      updated_at = excluded.updated_at";

// ============================================================================
// IMappingStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IMappingStore for SqliteMappingStore {
    // --- Run operations ---

    async fn save_run(&self, run: &MigrationRun) -> anyhow::Result<()> {
        let id = run.id().to_string();
        let progress = match run.progress() {
            Some(p) => Some(
                serde_json::to_string(p)
                    .map_err(|e| anyhow::anyhow!("Failed to serialize progress: {}", e))?,
            ),
            None => None,
        };

        sqlx::query(
            "INSERT INTO migration_runs \
             (id, scope, source_root, destination_root, state, test_mode, resumed, \
              started_at, updated_at, finished_at, walk_cursor, progress) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
              state = excluded.state, \
              resumed = excluded.resumed, \
              updated_at = excluded.updated_at, \
              finished_at = excluded.finished_at, \
              walk_cursor = excluded.walk_cursor, \
              progress = excluded.progress",
        )
        .bind(&id)
        .bind(run.scope())
        .bind(run.source_root().as_str())
        .bind(run.destination_root().as_str())
        .bind(run.state().to_string())
        .bind(run.test_mode() as i64)
        .bind(run.is_resumed() as i64)
        .bind(run.started_at().to_rfc3339())
        .bind(run.updated_at().to_rfc3339())
        .bind(run.finished_at().map(|dt| dt.to_rfc3339()))
        .bind(run.walk_cursor())
        .bind(&progress)
        .execute(&self.pool)
        .await?;

        tracing::trace!(run_id = %id, state = %run.state(), "Saved migration run");
        Ok(())
    }

    async fn find_resumable_run(&self, scope: &str) -> anyhow::Result<Option<MigrationRun>> {
        let row = sqlx::query(
            "SELECT * FROM migration_runs \
             WHERE scope = ? AND archived = 0 AND state != 'done' AND state NOT LIKE 'failed%' \
             ORDER BY started_at DESC LIMIT 1",
        )
        .bind(scope)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(run_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn archive_run(&self, run: &MigrationRun, report: &RunReport) -> anyhow::Result<()> {
        self.save_run(run).await?;

        let report_json = serde_json::to_string(report)
            .map_err(|e| anyhow::anyhow!("Failed to serialize report: {}", e))?;

        sqlx::query("UPDATE migration_runs SET report = ?, archived = 1 WHERE id = ?")
            .bind(&report_json)
            .bind(run.id().to_string())
            .execute(&self.pool)
            .await?;

        tracing::debug!(run_id = %run.id(), "Archived migration run");
        Ok(())
    }

    // --- Mapping entry operations ---

    async fn load_entries(&self, scope: &str) -> anyhow::Result<Vec<MappingEntry>> {
        let rows = sqlx::query("SELECT * FROM mapping_entries WHERE scope = ? ORDER BY path")
            .bind(scope)
            .fetch_all(&self.pool)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(entry_from_row(row)?);
        }
        Ok(entries)
    }

    async fn get_entry(
        &self,
        scope: &str,
        source_id: &NodeId,
    ) -> anyhow::Result<Option<MappingEntry>> {
        let row = sqlx::query("SELECT * FROM mapping_entries WHERE scope = ? AND source_id = ?")
            .bind(scope)
            .bind(source_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(entry_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn save_entries(&self, scope: &str, entries: &[MappingEntry]) -> anyhow::Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for entry in entries {
            let node = serde_json::to_string(&entry.node)
                .map_err(|e| anyhow::anyhow!("Failed to serialize source node: {}", e))?;

            sqlx::query(UPSERT_ENTRY_SQL)
                .bind(scope)
                .bind(entry.source_id().as_str())
                .bind(&node)
                .bind(entry.kind().as_str())
                .bind(&entry.path)
                .bind(entry.destination_id.as_ref().map(|id| id.as_str()))
                .bind(entry.destination_parent_id.as_ref().map(|id| id.as_str()))
                .bind(entry.status.as_str())
                .bind(entry.attempt_count as i64)
                .bind(entry.repair_count as i64)
                .bind(&entry.last_error)
                .bind(entry.updated_at.to_rfc3339())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::trace!(scope, count = entries.len(), "Saved mapping entries");
        Ok(())
    }
}
