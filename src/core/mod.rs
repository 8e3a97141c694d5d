//! Core batch execution.
//!
//! This module contains:
//! - Chain: Step configurations and validated tool chains
//! - Workflow: Persisted step lists loaded from YAML
//! - Rename: Custom destination name templates
//! - Executor: Runs one chain to completion
//! - Pool: Bounded set of concurrent executors
//! - Conflict: Destination naming and temporary cleanup

pub mod chain;
pub mod conflict;
pub mod error;
pub mod executor;
pub mod pool;
pub mod rename;
pub mod workflow;

// Re-export commonly used types
pub use chain::{validate_steps, StepConfig, ToolChain};
pub use conflict::{claim_unique, resolve_destination, Destination, UniqueNames};
pub use error::{ChainError, ChainOutcome, ConfigurationError};
pub use executor::{EventSink, StepExecutor};
pub use pool::{PoolEvent, WorkerPool};
pub use rename::RenameRule;
pub use workflow::Workflow;
