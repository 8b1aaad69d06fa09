//! drivemig Engine - Migration of a remote folder tree
//!
//! Provides:
//! - Sliding-window rate limiting shared by every remote call
//! - Resumable, pull-based walking of the source tree
//! - Write-ahead creation of the destination folder structure
//! - Bounded-concurrency file transfer with retries and repairs
//! - Integrity validation of copies against their sources
//! - Progress aggregation and the run state machine
//!
//! ## Modules
//!
//! - [`rate_limit`] - Adaptive sliding-window limiter and the throttled provider decorator
//! - [`retry`] - Exponential backoff policy for retryable storage errors
//! - [`walker`] - Depth-first remote tree walker with a serializable cursor
//! - [`mapping`] - In-memory mapping table with batched checkpoints
//! - [`structure`] - Destination folder creation
//! - [`scheduler`] - File transfer worker pool
//! - [`validator`] - Source/destination integrity comparison
//! - [`progress`] - Progress counters, throughput and ETA
//! - [`orchestrator`] - The migration run state machine
//! - [`compare`] - Read-only tree comparison and structure listing
//!
//! ## Architecture
//!
//! The engine depends only on the ports defined in `drivemig-core`. The
//! storage provider is always wrapped in a [`ThrottledProvider`] so that
//! walker, structure builder, scheduler and validator share one rate limit.

pub mod compare;
pub mod error;
pub mod mapping;
pub mod orchestrator;
pub mod progress;
pub mod rate_limit;
pub mod retry;
pub mod scheduler;
pub mod structure;
pub mod validator;
pub mod walker;

pub use error::{MigrationError, StructureError, WalkError};
pub use orchestrator::{MigrationOptions, MigrationOrchestrator};
pub use rate_limit::{RateLimiter, ThrottledProvider};
pub use retry::RetryPolicy;
