//! Registry mapping `{name, group}` to step factories.
//!
//! Built once at startup and shared read-only (`Arc<ToolRegistry>`) by the
//! pool and every executor, so concurrent lookups need no locking.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::{color, convert, enhance, transform, ToolGroup, ToolStep};

/// Builds a fresh step instance
pub type ToolFactory = Arc<dyn Fn() -> Box<dyn ToolStep> + Send + Sync>;

/// Static description of a registered step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub group: ToolGroup,
    pub version: u32,
    pub description: String,
    /// Output suffix for format-converting steps
    pub output_format_suffix: Option<String>,
}

struct Entry {
    info: ToolInfo,
    factory: ToolFactory,
}

/// Name/group -> factory map
pub struct ToolRegistry {
    entries: BTreeMap<(ToolGroup, String), Entry>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_builtin_tools()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.values().map(|e| &e.info))
            .finish()
    }
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Create a registry holding every built-in step
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::new();
        color::register(&mut registry);
        enhance::register(&mut registry);
        transform::register(&mut registry);
        convert::register(&mut registry);
        registry
    }

    /// Register a step factory, replacing any previous step with the same
    /// name and group. Returns the replaced step's description.
    pub fn register<F>(&mut self, factory: F) -> Option<ToolInfo>
    where
        F: Fn() -> Box<dyn ToolStep> + Send + Sync + 'static,
    {
        let prototype = factory();
        let info = ToolInfo {
            name: prototype.name().to_string(),
            group: prototype.group(),
            version: prototype.version(),
            description: prototype.description().to_string(),
            output_format_suffix: prototype.output_format_suffix().map(str::to_string),
        };

        let key = (info.group, info.name.clone());
        self.entries
            .insert(
                key,
                Entry {
                    info,
                    factory: Arc::new(factory),
                },
            )
            .map(|old| old.info)
    }

    /// Build a fresh instance of the step registered under `name`/`group`
    pub fn resolve(&self, name: &str, group: ToolGroup) -> Option<Box<dyn ToolStep>> {
        self.entries
            .get(&(group, name.to_string()))
            .map(|entry| (entry.factory)())
    }

    pub fn info(&self, name: &str, group: ToolGroup) -> Option<&ToolInfo> {
        self.entries
            .get(&(group, name.to_string()))
            .map(|entry| &entry.info)
    }

    /// Current version of a registered step
    pub fn version(&self, name: &str, group: ToolGroup) -> Option<u32> {
        self.info(name, group).map(|info| info.version)
    }

    /// All registered steps, ordered by group then name
    pub fn tools(&self) -> impl Iterator<Item = &ToolInfo> {
        self.entries.values().map(|entry| &entry.info)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
