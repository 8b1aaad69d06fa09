//! Domain error types
//!
//! Raised when a remote identifier is malformed, a stored value cannot be
//! parsed back into a domain type, or a run or task is asked to move to a
//! state its state machine does not allow.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid remote node identifier
    #[error("Invalid node ID: {0}")]
    InvalidNodeId(String),

    /// Invalid run identifier
    #[error("Invalid run ID: {0}")]
    InvalidRunId(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// A persisted or parsed value is not a valid domain value
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
