//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. The engine depends on these interfaces; their
//! implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IStorageProvider`] - Remote storage operations (Google Drive)
//! - [`IMappingStore`] - Durable mapping table and run records (SQLite)

pub mod mapping_store;
pub mod storage_provider;

pub use mapping_store::IMappingStore;
pub use storage_provider::{IStorageProvider, ListPage, NodeAttributes, StorageError};
