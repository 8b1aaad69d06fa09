//! Integrity validation
//!
//! [`IntegrityValidator`] decides whether a destination object is a
//! faithful copy of its source using the strongest signal both sides
//! offer:
//!
//! 1. Provider checksums (plus size, when both report one)
//! 2. Size, and modified time when dates are preserved
//! 3. MIME type only, for provider-native documents with neither
//!
//! The confidence level is carried on every [`ValidationResult`] so that
//! reports can tell checksum-verified copies from weaker matches.

use std::sync::Arc;

use drivemig_core::domain::{NodeId, ObjectMetadata, ValidationConfidence, ValidationResult};
use drivemig_core::ports::{IStorageProvider, StorageError};
use tracing::debug;

use crate::retry::{with_retry, RetryPolicy};

/// Prefix of the mapping-entry error recorded for a copy that failed validation
pub const VALIDATION_FAILURE_PREFIX: &str = "Validation failed: ";

/// Outcome of comparing two metadata records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub matched: bool,
    pub confidence: ValidationConfidence,
    pub detail: Option<String>,
}

/// Compares source metadata with destination metadata
///
/// Modified times are only compared when `compare_times` is set and both
/// sides report one; millisecond precision is used since that is what
/// Drive stores.
pub fn compare_metadata(
    expected: &ObjectMetadata,
    actual: &ObjectMetadata,
    compare_times: bool,
) -> Comparison {
    if let (Some(want), Some(got)) = (&expected.checksum, &actual.checksum) {
        let detail = if !want.eq_ignore_ascii_case(got) {
            Some(format!("checksum mismatch: expected {}, got {}", want, got))
        } else {
            size_mismatch(expected, actual)
        };
        return Comparison {
            matched: detail.is_none(),
            confidence: ValidationConfidence::Checksum,
            detail,
        };
    }

    if expected.size_bytes.is_some() && actual.size_bytes.is_some() {
        let mut detail = size_mismatch(expected, actual);
        if detail.is_none() && compare_times {
            if let (Some(want), Some(got)) = (expected.modified_time, actual.modified_time) {
                if want.timestamp_millis() != got.timestamp_millis() {
                    detail = Some(format!(
                        "modified time mismatch: expected {}, got {}",
                        want.to_rfc3339(),
                        got.to_rfc3339()
                    ));
                }
            }
        }
        return Comparison {
            matched: detail.is_none(),
            confidence: ValidationConfidence::SizeAndTime,
            detail,
        };
    }

    let detail = if expected.mime_type != actual.mime_type {
        Some(format!(
            "type mismatch: expected {}, got {}",
            expected.mime_type.as_deref().unwrap_or("unknown"),
            actual.mime_type.as_deref().unwrap_or("unknown")
        ))
    } else {
        None
    };
    Comparison {
        matched: detail.is_none(),
        confidence: ValidationConfidence::TypeOnly,
        detail,
    }
}

fn size_mismatch(expected: &ObjectMetadata, actual: &ObjectMetadata) -> Option<String> {
    match (expected.size_bytes, actual.size_bytes) {
        (Some(want), Some(got)) if want != got => Some(format!(
            "size mismatch: expected {} bytes, got {}",
            want, got
        )),
        _ => None,
    }
}

// ============================================================================
// IntegrityValidator
// ============================================================================

/// Validates destination copies against their sources
pub struct IntegrityValidator {
    provider: Arc<dyn IStorageProvider>,
    retry: RetryPolicy,
    compare_times: bool,
}

impl IntegrityValidator {
    /// # Arguments
    /// * `compare_times` - compare modified times; only meaningful when
    ///   copies preserve the source dates
    pub fn new(provider: Arc<dyn IStorageProvider>, retry: RetryPolicy, compare_times: bool) -> Self {
        Self {
            provider,
            retry,
            compare_times,
        }
    }

    /// Compares already-known metadata without any remote call
    pub fn compare(&self, expected: &ObjectMetadata, actual: &ObjectMetadata) -> Comparison {
        compare_metadata(expected, actual, self.compare_times)
    }

    /// Validates `destination_id` against freshly fetched source metadata
    ///
    /// # Errors
    ///
    /// Returns the storage error if either side cannot be read after
    /// retries, except that a missing destination yields a failed result.
    pub async fn validate(
        &self,
        source_id: &NodeId,
        destination_id: &NodeId,
    ) -> Result<ValidationResult, StorageError> {
        let provider = &self.provider;
        let expected = with_retry(&self.retry, "get_metadata", move |_| {
            provider.get_metadata(source_id)
        })
        .await?;
        self.validate_against(source_id, &expected, destination_id)
            .await
    }

    /// Validates `destination_id` against metadata obtained from a listing
    ///
    /// # Errors
    ///
    /// As [`validate`](Self::validate).
    pub async fn validate_against(
        &self,
        source_id: &NodeId,
        expected: &ObjectMetadata,
        destination_id: &NodeId,
    ) -> Result<ValidationResult, StorageError> {
        let provider = &self.provider;
        let actual = match with_retry(&self.retry, "get_metadata", move |_| {
            provider.get_metadata(destination_id)
        })
        .await
        {
            Ok(actual) => actual,
            Err(StorageError::NotFound(_)) => {
                debug!(%source_id, %destination_id, "Destination object missing");
                return Ok(ValidationResult::missing(
                    source_id.clone(),
                    destination_id.clone(),
                    expected.checksum.clone(),
                ));
            }
            Err(e) => return Err(e),
        };

        let comparison = self.compare(expected, &actual);
        debug!(
            %source_id,
            %destination_id,
            matched = comparison.matched,
            confidence = ?comparison.confidence,
            "Validated copy"
        );

        Ok(ValidationResult {
            file_id: source_id.clone(),
            destination_id: destination_id.clone(),
            expected_checksum: expected.checksum.clone(),
            actual_checksum: actual.checksum,
            matched: comparison.matched,
            confidence: comparison.confidence,
            destination_missing: false,
            detail: comparison.detail,
        })
    }
}
