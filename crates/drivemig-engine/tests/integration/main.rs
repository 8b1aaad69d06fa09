//! Integration tests for drivemig-engine
//!
//! Runs the structure builder, transfer scheduler and orchestrator
//! against an in-memory drive with scripted failures, and checks resume
//! against the SQLite mapping store.

mod common;

mod test_orchestrator;
mod test_resume;
mod test_scheduler;
mod test_structure;
