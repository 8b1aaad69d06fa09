//! Integrity validation results

use serde::{Deserialize, Serialize};

use super::newtypes::NodeId;

/// Strength of the equivalence signal behind a [`ValidationResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationConfidence {
    /// Provider checksums of both objects were compared
    Checksum,
    /// Checksums unavailable; size and modified time were compared
    SizeAndTime,
    /// Neither checksum nor size available (provider-native documents);
    /// only the MIME type was compared
    TypeOnly,
}

/// Outcome of comparing one source file against its destination copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub file_id: NodeId,
    pub destination_id: NodeId,
    pub expected_checksum: Option<String>,
    pub actual_checksum: Option<String>,
    pub matched: bool,
    pub confidence: ValidationConfidence,
    /// Destination object no longer exists
    pub destination_missing: bool,
    /// Human-readable reason for a mismatch
    pub detail: Option<String>,
}

impl ValidationResult {
    /// Result for a destination object that could not be found
    pub fn missing(file_id: NodeId, destination_id: NodeId, expected: Option<String>) -> Self {
        Self {
            file_id,
            destination_id,
            expected_checksum: expected,
            actual_checksum: None,
            matched: false,
            confidence: ValidationConfidence::Checksum,
            destination_missing: true,
            detail: Some("destination object missing".to_string()),
        }
    }

    /// True when the match rests on something weaker than checksums
    pub fn is_low_confidence(&self) -> bool {
        self.confidence != ValidationConfidence::Checksum
    }
}
