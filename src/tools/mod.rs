//! Tool steps: the units of transformation a chain is made of.
//!
//! A `ToolStep` only knows how to configure itself and transform an image.
//! Loading, saving and temporary-file naming are shared by every step and
//! live in `ToolInvocation`. Steps are never shared between executors: the
//! `ToolRegistry` builds a fresh instance for every invocation.

pub mod color;
pub mod convert;
pub mod enhance;
pub mod invocation;
pub mod registry;
pub mod transform;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::CodecDefaults;

pub use invocation::ToolInvocation;
pub use registry::{ToolFactory, ToolInfo, ToolRegistry};

/// Errors raised by a step while configuring or executing
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Failed to decode '{}': {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode '{}': {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("Output location was not prepared")]
    OutputNotPrepared,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Failed(String),

    #[error("Operation was cancelled")]
    Cancelled,
}

impl ToolError {
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Family a step belongs to; part of the registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolGroup {
    Color,
    Enhance,
    Transform,
    Convert,
    Custom,
}

impl ToolGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Color => "color",
            Self::Enhance => "enhance",
            Self::Transform => "transform",
            Self::Convert => "convert",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ToolGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "color" => Ok(Self::Color),
            "enhance" => Ok(Self::Enhance),
            "transform" => Ok(Self::Transform),
            "convert" => Ok(Self::Convert),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown tool group '{}'", other)),
        }
    }
}

/// One transformation stage.
///
/// Implementations hold only their own configuration; everything shared
/// across steps (I/O, naming, cancellation flag) is provided by the
/// invocation that wraps them.
pub trait ToolStep: Send {
    /// Registry name, unique within the group
    fn name(&self) -> &str;

    fn group(&self) -> ToolGroup;

    /// Implementation version checked against persisted chains
    fn version(&self) -> u32 {
        1
    }

    fn description(&self) -> &str {
        ""
    }

    /// Output format the step converts to; `None` keeps the input format
    fn output_format_suffix(&self) -> Option<&str> {
        None
    }

    /// Apply parameters. Must not touch the filesystem.
    fn configure(&mut self, parameters: &Parameters, codec: &CodecDefaults)
        -> Result<(), ToolError>;

    /// Encoder settings overriding the run defaults for this step's output
    fn codec_settings(&self) -> Option<CodecDefaults> {
        None
    }

    /// Transform the image. Long-running steps should poll `cancel`.
    fn process(
        &mut self,
        image: DynamicImage,
        cancel: &CancellationToken,
    ) -> Result<DynamicImage, ToolError>;

    /// Sidecar metadata to store next to the final output
    fn sidecar(&self) -> Option<String> {
        None
    }
}

/// Parameter map of a step configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(BTreeMap<String, Value>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn f32(&self, key: &str) -> Result<Option<f32>, ToolError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_f64()
                .map(|v| Some(v as f32))
                .ok_or_else(|| ToolError::invalid(key, format!("expected a number, got {}", value))),
        }
    }

    pub fn i32(&self, key: &str) -> Result<Option<i32>, ToolError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Some)
                .ok_or_else(|| ToolError::invalid(key, format!("expected an integer, got {}", value))),
        }
    }

    pub fn u32(&self, key: &str) -> Result<Option<u32>, ToolError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(Some)
                .ok_or_else(|| {
                    ToolError::invalid(key, format!("expected a positive integer, got {}", value))
                }),
        }
    }

    pub fn bool(&self, key: &str) -> Result<Option<bool>, ToolError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_bool()
                .map(Some)
                .ok_or_else(|| ToolError::invalid(key, format!("expected a boolean, got {}", value))),
        }
    }

    pub fn str(&self, key: &str) -> Result<Option<&str>, ToolError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| ToolError::invalid(key, format!("expected a string, got {}", value))),
        }
    }
}

impl FromIterator<(String, Value)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Return `Err(Cancelled)` once the token has fired
pub fn checkpoint(cancel: &CancellationToken) -> Result<(), ToolError> {
    if cancel.is_cancelled() {
        Err(ToolError::Cancelled)
    } else {
        Ok(())
    }
}
