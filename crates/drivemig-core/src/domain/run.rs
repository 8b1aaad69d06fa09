//! MigrationRun domain entity
//!
//! This module defines the run aggregate and the orchestrator state
//! machine:
//!
//! ```text
//! Init → BuildingStructure → Transferring → Validating → Repairing → Reporting → Done
//!   └──────────(resume)──────────↑               └─────────────────────↑
//! any non-terminal state → Failed
//! ```

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{NodeId, RunId};
use super::progress::ProgressSnapshot;

/// Orchestrator state of a migration run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    BuildingStructure,
    Transferring,
    Validating,
    Repairing,
    Reporting,
    Done,
    /// Unrecoverable error with its reason
    Failed(String),
}

impl RunState {
    /// Stable name of the state (without the failure reason)
    pub fn name(&self) -> &'static str {
        match self {
            RunState::Init => "init",
            RunState::BuildingStructure => "building_structure",
            RunState::Transferring => "transferring",
            RunState::Validating => "validating",
            RunState::Repairing => "repairing",
            RunState::Reporting => "reporting",
            RunState::Done => "done",
            RunState::Failed(_) => "failed",
        }
    }

    /// Returns true for `Done` and `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed(_))
    }

    /// Checks whether the orchestrator may move from this state to `target`
    pub fn can_transition_to(&self, target: &RunState) -> bool {
        use RunState::*;
        if self.is_terminal() {
            return false;
        }
        if matches!(target, Failed(_)) {
            return true;
        }
        matches!(
            (self, target),
            (Init, BuildingStructure)
                | (Init, Transferring)
                | (BuildingStructure, Transferring)
                | (Transferring, Validating)
                | (Transferring, Reporting)
                | (Validating, Repairing)
                | (Validating, Reporting)
                | (Repairing, Reporting)
                | (Reporting, Done)
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for RunState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(RunState::Init),
            "building_structure" => Ok(RunState::BuildingStructure),
            "transferring" => Ok(RunState::Transferring),
            "validating" => Ok(RunState::Validating),
            "repairing" => Ok(RunState::Repairing),
            "reporting" => Ok(RunState::Reporting),
            "done" => Ok(RunState::Done),
            s if s.starts_with("failed:") => Ok(RunState::Failed(s[7..].trim().to_string())),
            "failed" => Ok(RunState::Failed(String::new())),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown run state: {other}"
            ))),
        }
    }
}

/// Top-level aggregate of one migration attempt over a source/destination pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRun {
    id: RunId,
    source_root: NodeId,
    destination_root: NodeId,
    state: RunState,
    test_mode: bool,
    /// True when this run continues an interrupted predecessor
    resumed: bool,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    /// Serialized walker position at the last checkpoint
    walk_cursor: Option<String>,
    progress: Option<ProgressSnapshot>,
}

impl MigrationRun {
    /// Creates a new run in the `Init` state
    pub fn new(source_root: NodeId, destination_root: NodeId, test_mode: bool) -> Self {
        let now = Utc::now();
        Self {
            id: RunId::new(),
            source_root,
            destination_root,
            state: RunState::Init,
            test_mode,
            resumed: false,
            started_at: now,
            updated_at: now,
            finished_at: None,
            walk_cursor: None,
            progress: None,
        }
    }

    /// Rebuilds a run from persisted fields
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: RunId,
        source_root: NodeId,
        destination_root: NodeId,
        state: RunState,
        test_mode: bool,
        resumed: bool,
        started_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        finished_at: Option<DateTime<Utc>>,
        walk_cursor: Option<String>,
        progress: Option<ProgressSnapshot>,
    ) -> Self {
        Self {
            id,
            source_root,
            destination_root,
            state,
            test_mode,
            resumed,
            started_at,
            updated_at,
            finished_at,
            walk_cursor,
            progress,
        }
    }

    /// Mapping namespace shared by every run over the same pair
    pub fn scope_for(source_root: &NodeId, destination_root: &NodeId) -> String {
        format!("{}:{}", source_root, destination_root)
    }

    pub fn scope(&self) -> String {
        Self::scope_for(&self.source_root, &self.destination_root)
    }

    pub fn id(&self) -> &RunId {
        &self.id
    }

    pub fn source_root(&self) -> &NodeId {
        &self.source_root
    }

    pub fn destination_root(&self) -> &NodeId {
        &self.destination_root
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn walk_cursor(&self) -> Option<&str> {
        self.walk_cursor.as_deref()
    }

    pub fn progress(&self) -> Option<&ProgressSnapshot> {
        self.progress.as_ref()
    }

    /// Takes over an interrupted run: back to `Init`, flagged as resumed
    pub fn resume(&mut self) {
        self.state = RunState::Init;
        self.resumed = true;
        self.updated_at = Utc::now();
    }

    /// Moves to the next orchestrator state
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` if the transition is not allowed.
    pub fn advance(&mut self, target: RunState) -> Result<(), DomainError> {
        if !self.state.can_transition_to(&target) {
            return Err(DomainError::InvalidState {
                from: self.state.name().to_string(),
                to: target.name().to_string(),
            });
        }
        if target.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        self.state = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Moves to `Failed`; a no-op on an already terminal run
    pub fn fail(&mut self, reason: impl Into<String>) {
        if !self.state.is_terminal() {
            self.state = RunState::Failed(reason.into());
            self.finished_at = Some(Utc::now());
            self.updated_at = Utc::now();
        }
    }

    /// Records the checkpointed walker position and progress
    pub fn checkpoint(&mut self, walk_cursor: Option<String>, progress: ProgressSnapshot) {
        self.walk_cursor = walk_cursor;
        self.progress = Some(progress);
        self.updated_at = Utc::now();
    }
}
