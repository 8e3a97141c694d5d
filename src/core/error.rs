//! Failure taxonomy for chains.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::FailureKind;
use crate::tools::ToolGroup;

/// A chain refers to steps or settings that cannot run.
///
/// Detected while building or validating a chain, before anything executes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Chain for '{item}' has no steps")]
    EmptyChain { item: String },

    #[error("Invalid destination file name '{0}'")]
    InvalidDestination(String),

    #[error("Step at position {position} has sequence index {index}; indexes must be contiguous from 0")]
    NonContiguousIndex { position: usize, index: usize },

    #[error("Unknown tool '{name}' in group '{group}'")]
    UnknownTool { name: String, group: ToolGroup },

    #[error("Tool '{name}' ({group}) was saved with version {found} but version {current} is installed; the workflow is outdated")]
    VersionMismatch {
        name: String,
        group: ToolGroup,
        found: u32,
        current: u32,
    },

    #[error("Tool '{name}' rejected its parameters: {reason}")]
    InvalidParameters { name: String, reason: String },

    #[error("Invalid rename rule '{rule}': {reason}")]
    InvalidRenameRule { rule: String, reason: String },
}

/// Why a chain did not produce its output
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Step {index} ({tool}) failed: {message}")]
    StepExecution {
        index: usize,
        tool: String,
        message: String,
    },

    #[error("Failed to save output: {message}")]
    Finalization { message: String },
}

impl ChainError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Configuration(_) => FailureKind::Configuration,
            Self::StepExecution { .. } => FailureKind::StepExecution,
            Self::Finalization { .. } => FailureKind::Finalization,
        }
    }

    /// Message surfaced to the orchestrator; step messages are passed through
    /// verbatim.
    pub fn message(&self) -> String {
        match self {
            Self::Configuration(err) => err.to_string(),
            Self::StepExecution { message, .. } | Self::Finalization { message } => message.clone(),
        }
    }
}

/// How a chain ended
#[derive(Debug, Clone)]
pub enum ChainOutcome {
    /// Output is complete and stable at `destination`
    Done { destination: PathBuf },

    Failed(ChainError),

    /// Stopped on request; not an error
    Canceled,
}

impl ChainOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    pub fn destination(&self) -> Option<&PathBuf> {
        match self {
            Self::Done { destination } => Some(destination),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = ChainError::from(ConfigurationError::UnknownTool {
            name: "sepia".to_string(),
            group: ToolGroup::Color,
        });
        assert_eq!(err.kind(), FailureKind::Configuration);
        assert_eq!(err.message(), "Unknown tool 'sepia' in group 'color'");

        let err = ChainError::Finalization {
            message: "disk full".to_string(),
        };
        assert_eq!(err.kind(), FailureKind::Finalization);
    }

    #[test]
    fn test_step_message_is_verbatim() {
        let err = ChainError::StepExecution {
            index: 2,
            tool: "blur".to_string(),
            message: "Invalid parameter 'sigma': must be within (0, 100]".to_string(),
        };

        assert_eq!(err.message(), "Invalid parameter 'sigma': must be within (0, 100]");
        assert!(err.to_string().starts_with("Step 2 (blur) failed"));
    }
}
