//! Domain types for batch runs.
//!
//! This module contains the core data structures:
//! - MediaItemRef: The item a chain processes
//! - RunSettings: Per-run configuration
//! - ExecutionEvent: Immutable records of chain progress
//! - TransientArtifact: Step outputs passed along a chain

pub mod artifact;
pub mod events;
pub mod item;
pub mod settings;

// Re-export commonly used types
pub use artifact::{sidecar_path, TransientArtifact, SIDECAR_EXTENSION};
pub use events::{ExecutionEvent, FailureKind, StatusKind};
pub use item::MediaItemRef;
pub use settings::{CodecDefaults, ConflictPolicy, DecodeDefaults, PngCompression, RunSettings};
