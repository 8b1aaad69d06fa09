//! Storage provider port (driven/secondary port)
//!
//! This module defines the interface the engine uses to talk to the remote
//! storage API: paginated listing, folder creation, server-side copy and
//! metadata lookup.
//!
//! ## Design Notes
//!
//! - Unlike the mapping store, errors are classified ([`StorageError`])
//!   because the scheduler's retry policy depends on the class.
//! - Every call is a single remote request; rate limiting and retries
//!   are layered on top by the engine.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{newtypes::NodeId, Node, NodeKind, ObjectMetadata, SharingMetadata};

// ============================================================================
// Classified errors
// ============================================================================

/// Classified failure of a storage provider call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// Quota exceeded; the provider may say how long to wait
    #[error("Rate limited by provider")]
    RateLimited {
        /// Server-suggested wait before retrying
        retry_after: Option<Duration>,
    },

    /// Network failure or server-side (5xx) error
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The call did not complete within its deadline
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The object does not exist (or is not visible to the caller)
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller lacks permission for the object
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Credentials were rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The provider answered with something that could not be understood
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl StorageError {
    /// Returns true for errors worth retrying with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::RateLimited { .. } | StorageError::Transient(_) | StorageError::Timeout(_)
        )
    }

    /// Server-suggested wait, when the provider sent one
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            StorageError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Short machine-readable class name
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::RateLimited { .. } => "rate_limited",
            StorageError::Transient(_) => "transient",
            StorageError::Timeout(_) => "timeout",
            StorageError::NotFound(_) => "not_found",
            StorageError::PermissionDenied(_) => "permission_denied",
            StorageError::Unauthorized(_) => "unauthorized",
            StorageError::Malformed(_) => "malformed",
        }
    }
}

// ============================================================================
// Port types
// ============================================================================

/// One page of a folder listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub nodes: Vec<Node>,
    /// Token for the next page, `None` on the last page
    pub next_page_token: Option<String>,
}

/// Optional attributes applied to a created folder or copied file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeAttributes {
    pub modified_time: Option<DateTime<Utc>>,
    pub sharing: Option<SharingMetadata>,
}

// ============================================================================
// IStorageProvider trait
// ============================================================================

/// Port trait for the remote storage API
#[async_trait]
pub trait IStorageProvider: Send + Sync {
    /// Lists one page of the direct children of a folder
    ///
    /// # Arguments
    /// * `folder_id` - The folder to list
    /// * `page_token` - Token from the previous page, `None` for the first page
    async fn list_children(
        &self,
        folder_id: &NodeId,
        page_token: Option<&str>,
    ) -> Result<ListPage, StorageError>;

    /// Finds a direct child of `parent_id` by exact name and kind
    ///
    /// Returns the first match when several exist.
    async fn find_child(
        &self,
        parent_id: &NodeId,
        name: &str,
        kind: NodeKind,
    ) -> Result<Option<Node>, StorageError>;

    /// Creates a folder and returns its id
    async fn create_folder(
        &self,
        parent_id: &NodeId,
        name: &str,
        attributes: &NodeAttributes,
    ) -> Result<NodeId, StorageError>;

    /// Copies a file server-side into `destination_parent_id`
    async fn copy_file(
        &self,
        source_id: &NodeId,
        destination_parent_id: &NodeId,
        name: &str,
        attributes: &NodeAttributes,
    ) -> Result<NodeId, StorageError>;

    /// Retrieves integrity metadata for an object
    async fn get_metadata(&self, id: &NodeId) -> Result<ObjectMetadata, StorageError>;

    /// Retrieves a single node (used to verify the migration roots)
    async fn get_node(&self, id: &NodeId) -> Result<Node, StorageError>;
}
