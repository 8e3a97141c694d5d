//! Persisted workflows.
//!
//! A workflow is a named, ordered list of step configurations stored as
//! YAML. It is validated against the registry and turned into one tool
//! chain per item before anything is submitted.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::MediaItemRef;
use crate::tools::ToolRegistry;

use super::chain::{validate_steps, StepConfig, ToolChain};
use super::error::ConfigurationError;
use super::rename::{apply_suffix, RenameRule};

/// A complete workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow name (used in CLI)
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Optional destination name template (see `RenameRule`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename: Option<String>,

    /// Ordered list of steps to apply to every item
    pub steps: Vec<StepConfig>,
}

impl Workflow {
    /// Load a workflow from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// Parse a workflow from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse workflow YAML")
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize workflow")
    }

    /// Check every step against the registry
    pub fn validate(&self, registry: &ToolRegistry) -> Result<(), ConfigurationError> {
        if self.steps.is_empty() {
            return Err(ConfigurationError::EmptyChain {
                item: format!("workflow '{}'", self.name),
            });
        }
        validate_steps(&self.steps, registry)?;
        self.rename_rule()?;
        Ok(())
    }

    /// The parsed rename rule, if the workflow has one
    pub fn rename_rule(&self) -> Result<Option<RenameRule>, ConfigurationError> {
        self.rename.as_deref().map(RenameRule::parse).transpose()
    }

    /// Suffix of the last format-converting step, if any
    pub fn output_suffix(&self, registry: &ToolRegistry) -> Option<String> {
        self.steps
            .iter()
            .rev()
            .filter_map(|step| registry.info(&step.name, step.group))
            .find_map(|info| info.output_format_suffix.clone())
    }

    /// Destination file name for `item` at 0-based `position` in the batch.
    ///
    /// Without a rename rule this is the source stem plus the final suffix.
    pub fn destination_name(
        &self,
        item: &MediaItemRef,
        position: usize,
        registry: &ToolRegistry,
    ) -> Result<String, ConfigurationError> {
        let output_suffix = self.output_suffix(registry);

        if let Some(rule) = self.rename_rule()? {
            let rendered = rule.render(item, position);
            return Ok(apply_suffix(&rendered, output_suffix.as_deref(), &item.path));
        }

        let stem = item
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| item.id.clone());

        let suffix = output_suffix.or_else(|| {
            item.path
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned())
        });

        Ok(match suffix {
            Some(suffix) => format!("{}.{}", stem, suffix),
            None => stem,
        })
    }

    /// Build the validated chain processing `item` at 0-based `position`
    pub fn build_chain(
        &self,
        item: MediaItemRef,
        position: usize,
        registry: &ToolRegistry,
    ) -> Result<ToolChain, ConfigurationError> {
        let destination = self.destination_name(&item, position, registry)?;
        ToolChain::build(item, destination, self.steps.clone(), registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolGroup;

    const TEST_WORKFLOW_YAML: &str = r#"
name: web
description: Shrink and convert for the web

steps:
  - name: resize
    group: transform
    index: 0
    version: 1
    parameters:
      width: 1024

  - name: convert_jpeg
    group: convert
    index: 1
    version: 1
    parameters:
      quality: 80
"#;

    #[test]
    fn test_workflow_parsing() {
        let workflow = Workflow::from_yaml(TEST_WORKFLOW_YAML).unwrap();

        assert_eq!(workflow.name, "web");
        assert_eq!(workflow.steps.len(), 2);
        assert_eq!(workflow.steps[0].group, ToolGroup::Transform);
        assert_eq!(workflow.steps[1].parameters.u32("quality").unwrap(), Some(80));
    }

    #[test]
    fn test_workflow_validation() {
        let workflow = Workflow::from_yaml(TEST_WORKFLOW_YAML).unwrap();
        assert!(workflow.validate(&ToolRegistry::with_builtin_tools()).is_ok());
    }

    #[test]
    fn test_destination_uses_converted_suffix() {
        let registry = ToolRegistry::with_builtin_tools();
        let workflow = Workflow::from_yaml(TEST_WORKFLOW_YAML).unwrap();
        let item = MediaItemRef::from_path("/photos/beach.png");

        assert_eq!(workflow.destination_name(&item, 0, &registry).unwrap(), "beach.jpg");
    }

    #[test]
    fn test_destination_keeps_source_suffix() {
        let registry = ToolRegistry::with_builtin_tools();
        let workflow = Workflow {
            name: "flip".to_string(),
            description: String::new(),
            rename: None,
            steps: vec![StepConfig::new("flip", ToolGroup::Transform, 0, 1)],
        };
        let item = MediaItemRef::from_path("/photos/beach.png");

        assert_eq!(workflow.destination_name(&item, 0, &registry).unwrap(), "beach.png");
        let chain = workflow.build_chain(item, 0, &registry).unwrap();
        assert_eq!(chain.destination_file_name(), "beach.png");
    }

    #[test]
    fn test_rename_rule_with_converted_suffix() {
        let registry = ToolRegistry::with_builtin_tools();
        let mut workflow = Workflow::from_yaml(TEST_WORKFLOW_YAML).unwrap();
        workflow.rename = Some("{stem}_web_{index:2}.png".to_string());
        let item = MediaItemRef::from_path("/photos/beach.png");

        assert!(workflow.validate(&registry).is_ok());
        assert_eq!(
            workflow.destination_name(&item, 2, &registry).unwrap(),
            "beach_web_03.jpg"
        );
    }

    #[test]
    fn test_invalid_rename_rule_rejected() {
        let mut workflow = Workflow::from_yaml(TEST_WORKFLOW_YAML).unwrap();
        workflow.rename = Some("{date}".to_string());

        let err = workflow
            .validate(&ToolRegistry::with_builtin_tools())
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidRenameRule { .. }));
    }

    #[test]
    fn test_outdated_step_rejected() {
        let yaml = r#"
name: old
steps:
  - name: rotate
    group: transform
    index: 0
    version: 0
"#;
        let workflow = Workflow::from_yaml(yaml).unwrap();
        let err = workflow
            .validate(&ToolRegistry::with_builtin_tools())
            .unwrap_err();

        assert!(matches!(
            err,
            ConfigurationError::VersionMismatch {
                found: 0,
                current: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_yaml_round_trip() {
        let workflow = Workflow::from_yaml(TEST_WORKFLOW_YAML).unwrap();
        let again = Workflow::from_yaml(&workflow.to_yaml().unwrap()).unwrap();
        assert_eq!(again.steps, workflow.steps);
    }
}
