//! drivemig Drive - Google Drive v3 storage adapter
//!
//! Provides an async client for:
//! - Paginated folder listings and name lookups
//! - Folder creation and server-side file copies
//! - Metadata (checksum, size, modified time, MIME type) retrieval
//! - Recreating sharing grants on copied objects
//!
//! ## Modules
//!
//! - [`client`] - Authenticated HTTP client and response classification
//! - [`provider`] - `IStorageProvider` implementation over the Drive API
//! - [`token`] - Access token discovery (environment or token file)

pub mod client;
pub mod provider;
pub mod token;

pub use client::DriveClient;
pub use provider::GoogleDriveProvider;

use std::time::Duration;

use drivemig_core::ports::StorageError;
use thiserror::Error;

/// Errors that can occur when communicating with the Google Drive API
#[derive(Debug, Error)]
pub enum DriveError {
    /// Authentication credentials are invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions for the requested operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Quota exceeded (429, or 403 with a rate-limit reason)
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Server-suggested wait, when a `Retry-After` header was sent
        retry_after: Option<Duration>,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// The request did not complete within the client deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<DriveError> for StorageError {
    fn from(e: DriveError) -> Self {
        match e {
            DriveError::Unauthorized(msg) => StorageError::Unauthorized(msg),
            DriveError::Forbidden(msg) => StorageError::PermissionDenied(msg),
            DriveError::NotFound(msg) => StorageError::NotFound(msg),
            DriveError::RateLimited { retry_after } => StorageError::RateLimited { retry_after },
            DriveError::ServerError(msg) => StorageError::Transient(msg),
            DriveError::Timeout(after) => StorageError::Timeout(after),
            DriveError::NetworkError(err) => StorageError::Transient(err.to_string()),
            DriveError::InvalidResponse(msg) => StorageError::Malformed(msg),
        }
    }
}
