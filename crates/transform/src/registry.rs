//! Processor Registry - processor creation by type name
//!
//! The registry maps processor type names to factories. Pipelines name
//! their processors in configuration; the registry turns each entry into a
//! chain slot.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = ProcessorRegistry::new();
//! registry.register("noop", NoopFactory);
//!
//! let chain = registry.build_chain(&[("noop", ProcessorConfig::new())], 4)?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::chain::{ProcessorChain, ProcessorSlot};
use crate::{Processor, ProcessorError, ProcessorResult};

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;

/// Configuration passed to processor factories
pub type ProcessorConfig = HashMap<String, toml::Value>;

/// Factory trait for creating processors
pub trait ProcessorFactory: Send + Sync {
    /// Create a processor instance from configuration
    ///
    /// # Errors
    /// Returns `ProcessorError::Config` if configuration is invalid
    fn create(&self, config: &ProcessorConfig) -> ProcessorResult<Box<dyn Processor>>;

    /// Human-readable name for this factory (for error messages)
    fn name(&self) -> &'static str;

    /// Whether instances must stay on one worker
    ///
    /// Single-threaded processors get one instance per worker.
    fn single_thread(&self) -> bool {
        false
    }
}

/// Registry for processor factories
pub struct ProcessorRegistry {
    factories: HashMap<String, Box<dyn ProcessorFactory>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a processor factory
    ///
    /// # Panics
    /// Panics if a factory is already registered with this name.
    /// Use `try_register` for fallible registration.
    pub fn register<F: ProcessorFactory + 'static>(&mut self, type_name: &str, factory: F) {
        if self.factories.contains_key(type_name) {
            panic!("Processor factory '{}' already registered", type_name);
        }
        self.factories
            .insert(type_name.to_string(), Box::new(factory));
    }

    /// Try to register a processor factory
    ///
    /// Returns `false` if a factory is already registered with this name.
    pub fn try_register<F: ProcessorFactory + 'static>(
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

    fn factory(&self, type_name: &str) -> ProcessorResult<&dyn ProcessorFactory> {
        self.factories
            .get(type_name)
            .map(Box::as_ref)
            .ok_or_else(|| {
                let mut available = self.available_types();
                available.sort_unstable();
                ProcessorError::config(format!(
                    "unknown processor type '{}', available: [{}]",
                    type_name,
                    available.join(", ")
                ))
            })
    }

    /// Create a single processor instance
    pub fn create(
        &self,
        type_name: &str,
        config: &ProcessorConfig,
    ) -> ProcessorResult<Box<dyn Processor>> {
        self.factory(type_name)?.create(config)
    }

    /// Create the chain slot for one configured processor
    ///
    /// Single-threaded processors get `workers` independent instances.
    pub fn build_slot(
        &self,
        type_name: &str,
        config: &ProcessorConfig,
        workers: usize,
    ) -> ProcessorResult<ProcessorSlot> {
        let factory = self.factory(type_name)?;
        if factory.single_thread() {
            let instances = (0..workers)
                .map(|_| factory.create(config).map(Arc::from))
                .collect::<ProcessorResult<Vec<Arc<dyn Processor>>>>()?;
            Ok(ProcessorSlot::PerWorker(instances))
        } else {
            Ok(ProcessorSlot::Shared(Arc::from(factory.create(config)?)))
        }
    }

    /// Create a whole chain for `workers` workers
    pub fn build_chain<S: AsRef<str>>(
        &self,
        processors: &[(S, ProcessorConfig)],
        workers: usize,
    ) -> ProcessorResult<ProcessorChain> {
        let slots = processors
            .iter()
            .map(|(type_name, config)| self.build_slot(type_name.as_ref(), config, workers))
            .collect::<ProcessorResult<Vec<_>>>()?;
        ProcessorChain::new(slots, workers)
    }

    /// Check if a processor type is registered
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Whether a registered type is single-threaded
    pub fn is_single_thread(&self, type_name: &str) -> Option<bool> {
        self.factories.get(type_name).map(|f| f.single_thread())
    }

    /// Get list of registered processor types
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

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Factory for [`NoopProcessor`](crate::NoopProcessor)
pub struct NoopFactory;

impl ProcessorFactory for NoopFactory {
    fn create(&self, _config: &ProcessorConfig) -> ProcessorResult<Box<dyn Processor>> {
        Ok(Box::new(crate::noop::NoopProcessor::new()))
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Read a required string option
pub(crate) fn required_str<'a>(config: &'a ProcessorConfig, key: &str) -> ProcessorResult<&'a str> {
    config
        .get(key)
        .and_then(toml::Value::as_str)
        .ok_or_else(|| ProcessorError::config(format!("missing string option '{key}'")))
}

/// Convert a TOML option into a JSON value
pub(crate) fn json_value(value: &toml::Value) -> ProcessorResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| ProcessorError::config(e.to_string()))
}
