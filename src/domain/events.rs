//! Execution events emitted while chains run.
//!
//! Events are write-once records. Within one chain they are emitted in causal
//! order (`ChainStarted` first, exactly one terminal kind last); events of
//! different chains interleave freely.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::item::MediaItemRef;

/// A single event in the execution stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred
    pub timestamp: DateTime<Utc>,

    /// The item whose chain produced this event
    pub item: MediaItemRef,

    /// Position of the step in the chain (step events only)
    pub step_index: Option<usize>,

    /// Name of the step (step events only)
    pub tool: Option<String>,

    /// What happened
    pub kind: StatusKind,

    /// Human-readable summary or the verbatim failure message
    pub message: String,

    /// Final location of the output (`ChainDone` only)
    pub destination: Option<PathBuf>,

    /// Category of failure (`StepFailed` / `ChainFailed` only)
    pub failure: Option<FailureKind>,
}

impl ExecutionEvent {
    /// Create a new event with the current timestamp
    pub fn new(item: MediaItemRef, kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            item,
            step_index: None,
            tool: None,
            kind,
            message: message.into(),
            destination: None,
            failure: None,
        }
    }

    /// Attach the step this event refers to
    pub fn with_step(mut self, index: usize, tool: impl Into<String>) -> Self {
        self.step_index = Some(index);
        self.tool = Some(tool.into());
        self
    }

    pub fn with_destination(mut self, destination: PathBuf) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_failure(mut self, failure: FailureKind) -> Self {
        self.failure = Some(failure);
        self
    }

    /// True for the last event a chain emits
    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}

/// Kinds of execution events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    ChainStarted,
    StepStarted,
    StepDone,
    StepFailed,
    ChainDone,
    ChainFailed,
    ChainCanceled,
}

impl StatusKind {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::ChainDone | Self::ChainFailed | Self::ChainCanceled
        )
    }
}

/// Why a chain failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The chain referenced an unknown or incompatible step
    Configuration,

    /// A step's transformation failed
    StepExecution,

    /// All steps succeeded but the output could not be moved into place
    Finalization,
}
