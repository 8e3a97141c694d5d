//! Per-run settings shared read-only by every executor of a run.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Settings for one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    /// Directory receiving temporary artifacts and final outputs
    pub working_directory: PathBuf,

    /// How to resolve a destination that already exists
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,

    /// Run chains concurrently (false forces a single worker)
    #[serde(default = "default_use_multiple_workers")]
    pub use_multiple_workers: bool,

    /// Upper bound on concurrent workers when multiple workers are enabled
    #[serde(default)]
    pub worker_limit: Option<usize>,

    /// Encoder and decoder defaults handed to every step
    #[serde(default)]
    pub codec: CodecDefaults,
}

fn default_use_multiple_workers() -> bool {
    true
}

impl RunSettings {
    /// Settings with defaults for everything but the working directory
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: working_directory.into(),
            conflict_policy: ConflictPolicy::default(),
            use_multiple_workers: default_use_multiple_workers(),
            worker_limit: None,
            codec: CodecDefaults::default(),
        }
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    pub fn with_multiple_workers(mut self, enabled: bool) -> Self {
        self.use_multiple_workers = enabled;
        self
    }

    pub fn with_worker_limit(mut self, limit: usize) -> Self {
        self.worker_limit = Some(limit);
        self
    }

    /// Number of workers a pool should run with these settings
    pub fn concurrency(&self) -> usize {
        if !self.use_multiple_workers {
            return 1;
        }

        let available = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);

        match self.worker_limit {
            Some(limit) => available.min(limit).max(1),
            None => available,
        }
    }
}

/// Rule applied when the destination path is already taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Replace the existing file
    Overwrite,

    /// Append `_<n>` before the extension until a free name is claimed
    GenerateUniqueName,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self::GenerateUniqueName
    }
}

/// Codec defaults for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodecDefaults {
    /// JPEG quality, 1..=100
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// PNG compression level
    #[serde(default)]
    pub png_compression: PngCompression,

    /// Decoding applied when a source is first loaded
    #[serde(default)]
    pub decode: DecodeDefaults,
}

fn default_jpeg_quality() -> u8 {
    90
}

impl Default for CodecDefaults {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
            png_compression: PngCompression::default(),
            decode: DecodeDefaults::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PngCompression {
    #[default]
    Default,
    Fast,
    Best,
}

/// Raw-style decoding defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecodeDefaults {
    /// Decode sources at half their resolution
    #[serde(default)]
    pub half_size: bool,
}
