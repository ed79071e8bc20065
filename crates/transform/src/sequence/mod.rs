//! Sequence Processor - per-instance event numbering
//!
//! Stamps each event with a counter local to the processor instance and
//! records the instance id in the event's metadata attributes. The counter
//! is only meaningful if an instance always serves the same worker, so the
//! factory declares the processor single-threaded.
//!
//! # Configuration
//!
//! | Option | Type | Default | Description |
//! |--------|------|---------|-------------|
//! | `key` | string | `"sequence"` | Key path receiving the number |

use std::sync::atomic::{AtomicU64, Ordering};

use conduit_protocol::{Batch, Value};

use crate::registry::{ProcessorConfig, ProcessorFactory};
use crate::{Processor, ProcessorError, ProcessorFuture, ProcessorResult};

/// Metadata attribute holding the instance id
pub const INSTANCE_ATTRIBUTE: &str = "sequence_instance";

/// Numbers events per instance
#[derive(Debug)]
pub struct SequenceProcessor {
    instance: u64,
    key: String,
    next: AtomicU64,
}

impl SequenceProcessor {
    pub fn new(instance: u64, key: impl Into<String>) -> Self {
        Self {
            instance,
            key: key.into(),
            next: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn instance(&self) -> u64 {
        self.instance
    }

    /// Events numbered so far
    pub fn count(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Processor for SequenceProcessor {
    fn execute<'a>(&'a self, mut batch: Batch) -> ProcessorFuture<'a> {
        Box::pin(async move {
            for record in batch.records_mut() {
                let seq = self.next.fetch_add(1, Ordering::Relaxed);
                let event = record.event_mut();
                event
                    .put(&self.key, seq)
                    .map_err(|e| ProcessorError::failed(e.to_string()))?;
                event
                    .metadata_mut()
                    .attributes
                    .insert(INSTANCE_ATTRIBUTE.to_string(), Value::from(self.instance));
            }
            Ok(batch)
        })
    }

    fn name(&self) -> &'static str {
        "sequence"
    }

    fn close(&self) -> ProcessorResult<()> {
        tracing::debug!(instance = self.instance, events = self.count(), "sequence processor closed");
        Ok(())
    }
}

/// Factory for [`SequenceProcessor`]
///
/// Each created instance gets a distinct id.
#[derive(Debug, Default)]
pub struct SequenceFactory {
    next_instance: AtomicU64,
}

impl ProcessorFactory for SequenceFactory {
    fn create(&self, config: &ProcessorConfig) -> ProcessorResult<Box<dyn Processor>> {
        let key = match config.get("key") {
            None => "sequence",
            Some(v) => v
                .as_str()
                .ok_or_else(|| ProcessorError::config("'key' must be a string"))?,
        };
        let instance = self.next_instance.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(SequenceProcessor::new(instance, key)))
    }

    fn name(&self) -> &'static str {
        "sequence"
    }

    fn single_thread(&self) -> bool {
        true
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
