//! Source Registry - source creation by type name

use std::collections::HashMap;
use std::sync::Arc;

use crate::{Source, SourceError, SourceResult};

/// Configuration passed to source factories
pub type SourcePluginConfig = HashMap<String, toml::Value>;

/// Factory trait for creating sources
pub trait SourceFactory: Send + Sync {
    /// Create a source instance named `name`
    fn create(&self, name: &str, config: &SourcePluginConfig) -> SourceResult<Arc<dyn Source>>;

    /// Human-readable name for this factory (for error messages)
    fn name(&self) -> &'static str;
}

/// Registry for source factories
#[derive(Default)]
pub struct SourceRegistry {
    factories: HashMap<String, Box<dyn SourceFactory>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source factory
    ///
    /// # Panics
    /// Panics if a factory is already registered with this name.
    pub fn register<F: SourceFactory + 'static>(&mut self, type_name: &str, factory: F) {
        if self.factories.contains_key(type_name) {
            panic!("Source factory '{}' already registered", type_name);
        }
        self.factories
            .insert(type_name.to_string(), Box::new(factory));
    }

    /// Try to register a source factory
    ///
    /// Returns `false` if a factory is already registered with this name.
    pub fn try_register<F: SourceFactory + 'static>(
        &mut self,
        type_name: &str,
        factory: F,
    ) -> bool {
        if self.factories.contains_key(type_name) {
            return false;
        }
        self.factories
            .insert(type_name.to_string(), Box::new(factory));
        true
    }

    /// Create a source from its type name and configuration
    pub fn create(
        &self,
        type_name: &str,
        name: &str,
        config: &SourcePluginConfig,
    ) -> SourceResult<Arc<dyn Source>> {
        let factory = self.factories.get(type_name).ok_or_else(|| {
            let mut available = self.available_types();
            available.sort_unstable();
            SourceError::config(format!(
                "unknown source type '{}', available: [{}]",
                type_name,
                available.join(", ")
            ))
        })?;
        factory.create(name, config)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
