//! drivemig Core - Domain model and ports for remote tree migration
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Node`, `MappingEntry`, `TransferTask`, `ValidationResult`,
//!   `ProgressSnapshot`, `MigrationRun`, `RunReport`
//! - **Configuration** - validated YAML configuration with defaults
//! - **Port definitions** - `IStorageProvider` (remote storage API) and
//!   `IMappingStore` (durable mapping table)
//!
//! # Architecture
//!
//! The domain module is pure data and state machines with no I/O. Ports
//! define the trait interfaces that the adapter crates (`drivemig-drive`,
//! `drivemig-cache`) implement and that the engine consumes.

pub mod config;
pub mod domain;
pub mod ports;
