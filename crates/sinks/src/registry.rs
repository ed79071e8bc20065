//! Sink Registry - sink creation by type name

use std::collections::HashMap;
use std::sync::Arc;

use crate::{Sink, SinkError, SinkResult};

/// Configuration passed to sink factories
pub type SinkPluginConfig = HashMap<String, toml::Value>;

/// Factory trait for creating sinks
pub trait SinkFactory: Send + Sync {
    /// Create a sink instance named `name`
    fn create(&self, name: &str, config: &SinkPluginConfig) -> SinkResult<Arc<dyn Sink>>;

    /// Human-readable name for this factory (for error messages)
    fn name(&self) -> &'static str;
}

/// Registry for sink factories
#[derive(Default)]
pub struct SinkRegistry {
    factories: HashMap<String, Box<dyn SinkFactory>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink factory
    ///
    /// # Panics
    /// Panics if a factory is already registered with this name.
    pub fn register<F: SinkFactory + 'static>(&mut self, type_name: &str, factory: F) {
        if self.factories.contains_key(type_name) {
            panic!("Sink factory '{}' already registered", type_name);
        }
        self.factories
            .insert(type_name.to_string(), Box::new(factory));
    }

    /// Try to register a sink factory
    ///
    /// Returns `false` if a factory is already registered with this name.
    pub fn try_register<F: SinkFactory + 'static>(&mut self, type_name: &str, factory: F) -> bool {
        if self.factories.contains_key(type_name) {
            return false;
        }
        self.factories
            .insert(type_name.to_string(), Box::new(factory));
        true
    }

    /// Create a sink from its type name and configuration
    pub fn create(
        &self,
        type_name: &str,
        name: &str,
        config: &SinkPluginConfig,
    ) -> SinkResult<Arc<dyn Sink>> {
        let factory = self.factories.get(type_name).ok_or_else(|| {
            let mut available = self.available_types();
            available.sort_unstable();
            SinkError::config(format!(
                "unknown sink type '{}', available: [{}]",
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

/// Read an optional string option
pub(crate) fn optional_str<'a>(config: &'a SinkPluginConfig, key: &str) -> SinkResult<Option<&'a str>> {
    match config.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| SinkError::config(format!("'{key}' must be a string"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_default_registry;

    #[test]
    fn test_default_registry() {
        let registry = create_default_registry();
        assert!(registry.contains("null"));
        assert!(registry.contains("stdout"));
        assert!(!registry.contains("in_memory"));

        let sink = registry
            .create("null", "discard", &SinkPluginConfig::new())
            .unwrap();
        assert_eq!(sink.name(), "discard");
    }

    #[test]
    fn test_unknown_type() {
        let registry = create_default_registry();
        let err = registry
            .create("kafka", "k", &SinkPluginConfig::new())
            .err()
            .unwrap();
        assert!(err.to_string().contains("unknown sink type 'kafka'"));
        assert!(err.to_string().contains("null, stdout"));
    }

    #[test]
    fn test_try_register_duplicate() {
        let mut registry = create_default_registry();
        assert!(!registry.try_register("null", crate::NullSinkFactory));
        assert_eq!(registry.len(), 2);
    }
}
