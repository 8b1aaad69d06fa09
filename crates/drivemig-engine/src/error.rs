//! Engine error types
//!
//! Remote failures arrive as [`StorageError`] and are classified there as
//! retryable or not. The types here add the context the engine needs to
//! attribute a failure to a source folder and to decide whether a run can
//! continue.

use drivemig_core::domain::{DomainError, NodeId};
use drivemig_core::ports::StorageError;
use thiserror::Error;

/// Errors raised while walking the source tree
///
/// Only [`WalkError::TooManyNodes`] ends the walk. The other variants
/// abandon one subtree and the walk continues with the next folder.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WalkError {
    /// Listing a folder failed after retries
    #[error("Failed to list '{path}' ({folder_id}): {reason}")]
    List {
        folder_id: NodeId,
        path: String,
        reason: StorageError,
    },

    /// A folder was reached a second time through a different parent
    #[error("Folder '{path}' ({folder_id}) was already visited")]
    Cycle { folder_id: NodeId, path: String },

    /// A folder is nested deeper than the configured limit
    #[error("Folder '{path}' ({folder_id}) exceeds the maximum depth of {depth}")]
    DepthExceeded {
        folder_id: NodeId,
        path: String,
        depth: usize,
    },

    /// The tree holds more nodes than the configured limit
    #[error("Source tree exceeds {limit} nodes")]
    TooManyNodes { limit: u64 },
}

impl WalkError {
    /// Folder the error is attributed to, if any
    pub fn folder_id(&self) -> Option<&NodeId> {
        match self {
            WalkError::List { folder_id, .. }
            | WalkError::Cycle { folder_id, .. }
            | WalkError::DepthExceeded { folder_id, .. } => Some(folder_id),
            WalkError::TooManyNodes { .. } => None,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            WalkError::List { path, .. }
            | WalkError::Cycle { path, .. }
            | WalkError::DepthExceeded { path, .. } => path,
            WalkError::TooManyNodes { .. } => "",
        }
    }

    /// Returns true when no further nodes can be walked
    pub fn is_fatal(&self) -> bool {
        matches!(self, WalkError::TooManyNodes { .. })
    }
}

/// Errors raised while mapping a source folder to the destination
#[derive(Debug, Error)]
pub enum StructureError {
    /// The parent folder has no destination counterpart
    #[error("Parent {parent_id} of folder {folder_id} is not mapped")]
    MissingParent { folder_id: NodeId, parent_id: NodeId },

    /// The remote folder could not be created or found
    #[error("Failed to create destination for folder {folder_id}: {reason}")]
    CreateFailed {
        folder_id: NodeId,
        reason: StorageError,
    },

    /// The mapping table could not be persisted
    #[error("Mapping store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Errors that end a migration run
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Unrecoverable condition (bad credentials, missing root, ...)
    #[error("{0}")]
    Fatal(String),

    /// The mapping store failed
    #[error("Mapping store error: {0}")]
    Store(#[from] anyhow::Error),

    /// A state machine rule was violated
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The walk could not continue
    #[error(transparent)]
    Walk(#[from] WalkError),
}
