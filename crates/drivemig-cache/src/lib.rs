//! drivemig Cache - Durable migration state
//!
//! The mapping table is the resumability checkpoint of a migration: every
//! source node that has been scheduled gets a row recording its destination
//! counterpart and transfer status. This crate keeps that table, together
//! with run records (state, walk cursor, progress) and archived reports, in
//! a single SQLite file so an interrupted run can pick up where it stopped.
//!
//! [`SqliteMappingStore`] implements the `IMappingStore` port of
//! `drivemig-core`; [`DatabasePool`] opens the file and keeps its schema
//! current.
//!
//! ```no_run
//! use std::path::Path;
//! use drivemig_cache::{DatabasePool, SqliteMappingStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/var/lib/drivemig/state.db")).await?;
//! let store = SqliteMappingStore::new(pool.pool().clone());
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteMappingStore;

/// State database failures
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The database file could not be opened
    #[error("Cannot open state database: {0}")]
    ConnectionFailed(String),

    /// A statement was rejected by SQLite
    #[error("State query failed: {0}")]
    QueryFailed(String),

    /// Creating or upgrading the schema failed
    #[error("Schema upgrade failed: {0}")]
    MigrationFailed(String),

    /// The database was written by a newer drivemig
    #[error("State database schema v{found} is newer than supported v{supported}")]
    IncompatibleSchema { found: i64, supported: i64 },

    /// A stored row does not decode into a domain value
    #[error("Corrupt state row: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
