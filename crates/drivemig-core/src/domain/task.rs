//! TransferTask domain entity
//!
//! A [`TransferTask`] is the unit of work for copying one file. Its status
//! follows an explicit state machine:
//!
//! ```text
//! Pending ──→ InFlight ──→ Succeeded
//!    ↑           │ ├─────→ Skipped
//!    │           │ └─────→ FailedTerminal
//!    │           ↓
//!    └──── FailedRetryable
//! ```
//!
//! A repair moves a finished task back to `Pending` with a fresh attempt
//! budget and an incremented repair counter.

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::mapping::TransferStatus;
use super::newtypes::NodeId;
use super::node::Node;

/// Unit of work copying one file into an already-mapped destination folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTask {
    source: Node,
    path: String,
    destination_parent_id: NodeId,
    attempt_count: u32,
    repair_count: u32,
    status: TransferStatus,
    /// Look for an identical destination file before copying
    check_existing: bool,
    last_error: Option<String>,
}

impl TransferTask {
    /// Creates a pending task for a file whose parent is already mapped
    pub fn new(source: Node, path: impl Into<String>, destination_parent_id: NodeId) -> Self {
        Self {
            source,
            path: path.into(),
            destination_parent_id,
            attempt_count: 0,
            repair_count: 0,
            status: TransferStatus::Pending,
            check_existing: false,
            last_error: None,
        }
    }

    /// Marks whether the destination folder may already hold a copy
    pub fn with_check_existing(mut self, check_existing: bool) -> Self {
        self.check_existing = check_existing;
        self
    }

    /// Restores the repair counter of a persisted entry
    pub fn with_repair_count(mut self, repair_count: u32) -> Self {
        self.repair_count = repair_count;
        self
    }

    pub fn source(&self) -> &Node {
        &self.source
    }

    pub fn source_id(&self) -> &NodeId {
        &self.source.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn destination_parent_id(&self) -> &NodeId {
        &self.destination_parent_id
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn repair_count(&self) -> u32 {
        self.repair_count
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn check_existing(&self) -> bool {
        self.check_existing
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Checks whether a status transition is allowed
    pub fn can_transition_to(&self, target: TransferStatus) -> bool {
        use TransferStatus::*;
        matches!(
            (self.status, target),
            (Pending, InFlight)
                | (FailedRetryable, InFlight)
                | (InFlight, Succeeded)
                | (InFlight, Skipped)
                | (InFlight, FailedRetryable)
                | (InFlight, FailedTerminal)
        )
    }

    fn transition_to(&mut self, target: TransferStatus) -> Result<(), DomainError> {
        if !self.can_transition_to(target) {
            return Err(DomainError::InvalidState {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        Ok(())
    }

    /// Starts a new attempt, returning its 1-based number
    pub fn begin_attempt(&mut self) -> Result<u32, DomainError> {
        self.transition_to(TransferStatus::InFlight)?;
        self.attempt_count += 1;
        Ok(self.attempt_count)
    }

    pub fn succeed(&mut self) -> Result<(), DomainError> {
        self.transition_to(TransferStatus::Succeeded)?;
        self.last_error = None;
        Ok(())
    }

    pub fn skip(&mut self) -> Result<(), DomainError> {
        self.transition_to(TransferStatus::Skipped)?;
        self.last_error = None;
        Ok(())
    }

    /// Records a failed attempt
    ///
    /// A retryable failure becomes `FailedRetryable` while attempts remain
    /// (`attempt_count < max_attempts`), otherwise `FailedTerminal`.
    ///
    /// # Returns
    /// The status the task ended up in
    pub fn fail(
        &mut self,
        reason: impl Into<String>,
        retryable: bool,
        max_attempts: u32,
    ) -> Result<TransferStatus, DomainError> {
        let target = if retryable && self.attempt_count < max_attempts {
            TransferStatus::FailedRetryable
        } else {
            TransferStatus::FailedTerminal
        };
        self.transition_to(target)?;
        self.last_error = Some(reason.into());
        Ok(target)
    }

    /// Sends a finished or in-flight task back for another copy
    ///
    /// Resets the attempt counter and increments the repair counter. The
    /// caller bounds the number of repairs.
    pub fn requeue_for_repair(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        if !matches!(
            self.status,
            TransferStatus::InFlight | TransferStatus::Succeeded | TransferStatus::FailedTerminal
        ) {
            return Err(DomainError::InvalidState {
                from: self.status.to_string(),
                to: TransferStatus::Pending.to_string(),
            });
        }
        self.status = TransferStatus::Pending;
        self.attempt_count = 0;
        self.repair_count += 1;
        self.check_existing = false;
        self.last_error = Some(reason.into());
        Ok(())
    }
}
