//! batchq - Batch image processing queue
//!
//! Applies an ordered chain of image tools to every item of a batch, running
//! chains concurrently under a bounded worker pool.
//!
//! # Architecture
//!
//! - Each item gets its own [`ToolChain`]; steps run strictly in order and
//!   hand a transient artifact from one to the next
//! - A [`StepExecutor`] runs one chain, reporting progress as
//!   [`ExecutionEvent`]s and moving the final output into the working
//!   directory
//! - A [`WorkerPool`] runs many chains at once and reports when all of them
//!   have finished
//!
//! # Modules
//!
//! - `tools`: The step contract, built-in tools and the registry
//! - `core`: Chains, execution, the worker pool, conflict handling
//! - `domain`: Data structures (items, artifacts, events, settings)
//! - `config`: Configuration file and environment handling
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run a workflow over some images
//! batchq run web 'photos/*.jpg' --dest out/
//!
//! # List available tools
//! batchq tools
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod tools;

// Re-export main types at crate root for convenience
pub use core::{
    ChainError, ChainOutcome, ConfigurationError, EventSink, PoolEvent, StepConfig, StepExecutor,
    ToolChain, WorkerPool, Workflow,
};
pub use domain::{
    ConflictPolicy, ExecutionEvent, FailureKind, MediaItemRef, RunSettings, StatusKind,
    TransientArtifact,
};
pub use tools::{Parameters, ToolError, ToolGroup, ToolRegistry, ToolStep};
