//! State database connection handling
//!
//! A [`DatabasePool`] owns the SQLite pool used by
//! [`SqliteMappingStore`](crate::SqliteMappingStore). Opening a pool brings
//! the schema up to [`SCHEMA_VERSION`], tracked in `PRAGMA user_version`.
//! A database stamped with a newer version is refused rather than written
//! with a layout this build does not understand.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tracing::{debug, info};

use crate::CacheError;

/// Schema version written by this build
pub const SCHEMA_VERSION: i64 = 1;

/// Connections for a file database; the orchestrator checkpoints from one
/// task while workers read, so a handful is enough
const FILE_CONNECTIONS: u32 = 4;

/// Wait for a competing writer before failing with `SQLITE_BUSY`
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("migrations/20261017_initial.sql"))];

/// SQLite pool holding the mapping table and run records
pub struct DatabasePool {
    pool: SqlitePool,
    path: Option<PathBuf>,
}

impl DatabasePool {
    /// Opens (creating if needed) the state database at `db_path`
    ///
    /// Parent directories are created. The database runs in WAL mode with
    /// `synchronous = NORMAL`, which keeps every committed checkpoint
    /// across a process crash.
    ///
    /// # Errors
    ///
    /// - `CacheError::ConnectionFailed` if the file cannot be opened
    /// - `CacheError::IncompatibleSchema` if a newer drivemig wrote it
    /// - `CacheError::MigrationFailed` if the schema cannot be created
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Cannot create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(FILE_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Cannot open state database {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        let from = migrate(&pool).await?;
        info!(
            path = %db_path.display(),
            schema_version = SCHEMA_VERSION,
            upgraded_from = from,
            "Opened state database"
        );

        Ok(Self {
            pool,
            path: Some(db_path.to_path_buf()),
        })
    }

    /// Opens a private in-memory database
    ///
    /// An in-memory SQLite database lives and dies with its connection, so
    /// the pool is capped at one.
    ///
    /// # Errors
    ///
    /// As [`DatabasePool::new`].
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("Cannot open in-memory database: {}", e))
            })?;

        migrate(&pool).await?;
        debug!("Opened in-memory state database");

        Ok(Self { pool, path: None })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Database file, `None` when in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Schema version stamped in the database
    pub async fn schema_version(&self) -> Result<i64, CacheError> {
        read_version(&self.pool).await
    }

    /// Closes every connection, checkpointing the WAL into the main file
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn read_version(pool: &SqlitePool) -> Result<i64, CacheError> {
    Ok(sqlx::query_scalar::<_, i64>("PRAGMA user_version")
        .fetch_one(pool)
        .await?)
}

/// Applies every migration above the stamped version
///
/// Returns the version found before migrating.
async fn migrate(pool: &SqlitePool) -> Result<i64, CacheError> {
    let found = read_version(pool).await?;
    if found > SCHEMA_VERSION {
        return Err(CacheError::IncompatibleSchema {
            found,
            supported: SCHEMA_VERSION,
        });
    }

    for (version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > found) {
        sqlx::raw_sql(sql).execute(pool).await.map_err(|e| {
            CacheError::MigrationFailed(format!("Schema v{} failed: {}", version, e))
        })?;
        // PRAGMA does not take bind parameters
        sqlx::raw_sql(&format!("PRAGMA user_version = {}", version))
            .execute(pool)
            .await
            .map_err(|e| {
                CacheError::MigrationFailed(format!("Cannot stamp schema v{}: {}", version, e))
            })?;
        debug!(version = *version, "Applied schema migration");
    }
    Ok(found)
}
