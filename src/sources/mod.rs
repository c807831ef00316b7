//! Built-in data sources
//!
//! Built-in modules (clock, cpu, memory, ...) are not scripts: they sample
//! some system state on an interval. The engine only knows them through the
//! [`DataSource`] contract; concrete samplers register themselves in a
//! [`SourceRegistry`] under the module name they serve.

pub mod clock;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::models::{ModuleSpec, Sample};

pub use clock::ClockSource;

/// Contract every built-in module satisfies
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Refresh period used when the module sets no `interval`
    fn default_interval(&self) -> Duration;

    /// Produce the module's current content
    ///
    /// Called at most once at a time per module instance; errors are
    /// handled like a failed script poll.
    async fn sample(&self, spec: &ModuleSpec) -> Result<Sample>;
}

/// Data sources keyed by module name
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn DataSource>>,
}

impl SourceRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the sources shipped in this crate
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("clock", Arc::new(ClockSource::new()));
        registry
    }

    /// Register (or replace) the source for a module name
    pub fn register(&mut self, name: impl Into<String>, source: Arc<dyn DataSource>) {
        self.sources.insert(name.into(), source);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DataSource>> {
        self.sources.get(name).cloned()
    }

    /// Registered module names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.names())
            .finish()
    }
}
