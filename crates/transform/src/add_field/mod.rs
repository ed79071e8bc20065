//! Add Field Processor - set a field on every event
//!
//! # Configuration
//!
//! | Option | Type | Default | Description |
//! |--------|------|---------|-------------|
//! | `key` | string | required | Key path to set (`name` or `/a/b`) |
//! | `value` | any | required | Value to store |
//! | `overwrite` | bool | `true` | Replace an existing value |
//!
//! ```toml
//! processors = [{ type = "add_field", key = "/env", value = "prod" }]
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use conduit_protocol::{Batch, Value};

use crate::registry::{ProcessorConfig, ProcessorFactory, json_value, required_str};
use crate::{Processor, ProcessorError, ProcessorFuture, ProcessorResult};

/// Sets one field on every event
#[derive(Debug)]
pub struct AddFieldProcessor {
    key: String,
    value: Value,
    overwrite: bool,
    events_modified: AtomicU64,
}

impl AddFieldProcessor {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            overwrite: true,
            events_modified: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Events this processor changed
    pub fn events_modified(&self) -> u64 {
        self.events_modified.load(Ordering::Relaxed)
    }
}

impl Processor for AddFieldProcessor {
    fn execute<'a>(&'a self, mut batch: Batch) -> ProcessorFuture<'a> {
        Box::pin(async move {
            let mut modified = 0;
            for record in batch.records_mut() {
                let event = record.event_mut();
                if !self.overwrite && event.contains(&self.key) {
                    continue;
                }
                event
                    .put(&self.key, self.value.clone())
                    .map_err(|e| ProcessorError::failed(e.to_string()))?;
                modified += 1;
            }
            self.events_modified.fetch_add(modified, Ordering::Relaxed);
            Ok(batch)
        })
    }

    fn name(&self) -> &'static str {
        "add_field"
    }
}

/// Factory for [`AddFieldProcessor`]
pub struct AddFieldFactory;

impl ProcessorFactory for AddFieldFactory {
    fn create(&self, config: &ProcessorConfig) -> ProcessorResult<Box<dyn Processor>> {
        let key = required_str(config, "key")?;
        let value = config
            .get("value")
            .ok_or_else(|| ProcessorError::config("missing option 'value'"))
            .and_then(json_value)?;
        let overwrite = match config.get("overwrite") {
            None => true,
            Some(v) => v
                .as_bool()
                .ok_or_else(|| ProcessorError::config("'overwrite' must be a boolean"))?,
        };
        Ok(Box::new(
            AddFieldProcessor::new(key, value).with_overwrite(overwrite),
        ))
    }

    fn name(&self) -> &'static str {
        "add_field"
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
