//! Step configurations and the chains built from them.

use std::ffi::OsStr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{CodecDefaults, MediaItemRef};
use crate::tools::{Parameters, ToolGroup, ToolRegistry};

use super::error::ConfigurationError;

/// Persisted configuration of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Registry name of the step
    pub name: String,

    /// Registry group of the step
    pub group: ToolGroup,

    /// Position in the chain, contiguous from 0
    pub index: usize,

    /// Step implementation version the configuration was saved with
    pub version: u32,

    #[serde(default)]
    pub parameters: Parameters,
}

impl StepConfig {
    pub fn new(name: impl Into<String>, group: ToolGroup, index: usize, version: u32) -> Self {
        Self {
            name: name.into(),
            group,
            index,
            version,
            parameters: Parameters::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Check a list of step configurations against the registry.
///
/// Rejects non-contiguous indexes, steps the registry does not know,
/// version mismatches and parameter maps the step refuses.
pub fn validate_steps(steps: &[StepConfig], registry: &ToolRegistry) -> Result<(), ConfigurationError> {
    for (position, step) in steps.iter().enumerate() {
        if step.index != position {
            return Err(ConfigurationError::NonContiguousIndex {
                position,
                index: step.index,
            });
        }

        let current = registry.version(&step.name, step.group).ok_or_else(|| {
            ConfigurationError::UnknownTool {
                name: step.name.clone(),
                group: step.group,
            }
        })?;

        if current != step.version {
            return Err(ConfigurationError::VersionMismatch {
                name: step.name.clone(),
                group: step.group,
                found: step.version,
                current,
            });
        }

        // Dry configure; steps have no side effects here
        if let Some(mut tool) = registry.resolve(&step.name, step.group) {
            tool.configure(&step.parameters, &CodecDefaults::default())
                .map_err(|err| ConfigurationError::InvalidParameters {
                    name: step.name.clone(),
                    reason: err.to_string(),
                })?;
        }
    }

    Ok(())
}

/// Ordered steps bound to one item and a destination file name.
///
/// Only constructible through `build`, which validates it; immutable
/// afterwards.
#[derive(Debug, Clone)]
pub struct ToolChain {
    item: MediaItemRef,
    destination_file_name: String,
    steps: Vec<StepConfig>,
}

impl ToolChain {
    /// Validate and build a chain
    pub fn build(
        item: MediaItemRef,
        destination_file_name: impl Into<String>,
        steps: Vec<StepConfig>,
        registry: &ToolRegistry,
    ) -> Result<Self, ConfigurationError> {
        let destination_file_name = destination_file_name.into();

        if steps.is_empty() {
            return Err(ConfigurationError::EmptyChain {
                item: item.path.display().to_string(),
            });
        }

        if !is_plain_file_name(&destination_file_name) {
            return Err(ConfigurationError::InvalidDestination(destination_file_name));
        }

        validate_steps(&steps, registry)?;

        Ok(Self {
            item,
            destination_file_name,
            steps,
        })
    }

    pub fn item(&self) -> &MediaItemRef {
        &self.item
    }

    pub fn destination_file_name(&self) -> &str {
        &self.destination_file_name
    }

    pub fn steps(&self) -> &[StepConfig] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && Path::new(name).file_name() == Some(OsStr::new(name))
}
