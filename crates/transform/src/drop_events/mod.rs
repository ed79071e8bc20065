//! Drop Events Processor - discard events matching a field test
//!
//! Dropped records release their acknowledgement lease positively.
//!
//! # Configuration
//!
//! | Option | Type | Default | Description |
//! |--------|------|---------|-------------|
//! | `key` | string | required | Key path to test |
//! | `equals` | any | - | Drop only when the field equals this value |
//!
//! Without `equals`, every event that has the field is dropped.

use std::sync::atomic::{AtomicU64, Ordering};

use conduit_protocol::{Batch, Event, Value};

use crate::registry::{ProcessorConfig, ProcessorFactory, json_value, required_str};
use crate::{Processor, ProcessorFuture, ProcessorResult};

/// Drops events whose field matches
#[derive(Debug)]
pub struct DropEventsProcessor {
    key: String,
    equals: Option<Value>,
    events_dropped: AtomicU64,
}

impl DropEventsProcessor {
    /// Drop every event that has `key`
    pub fn when_present(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            equals: None,
            events_dropped: AtomicU64::new(0),
        }
    }

    /// Drop every event whose `key` equals `value`
    pub fn when_equal(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            equals: Some(value.into()),
            events_dropped: AtomicU64::new(0),
        }
    }

    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }

    fn matches(&self, event: &Event) -> bool {
        match (event.get(&self.key), &self.equals) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(actual), Some(expected)) => actual == expected,
        }
    }
}

impl Processor for DropEventsProcessor {
    fn execute<'a>(&'a self, mut batch: Batch) -> ProcessorFuture<'a> {
        Box::pin(async move {
            let before = batch.len();
            batch.records_mut().retain(|record| !self.matches(record.event()));
            let dropped = before - batch.len();
            if dropped > 0 {
                self.events_dropped
                    .fetch_add(dropped as u64, Ordering::Relaxed);
                tracing::trace!(dropped, "events dropped");
            }
            Ok(batch)
        })
    }

    fn name(&self) -> &'static str {
        "drop_events"
    }
}

/// Factory for [`DropEventsProcessor`]
pub struct DropEventsFactory;

impl ProcessorFactory for DropEventsFactory {
    fn create(&self, config: &ProcessorConfig) -> ProcessorResult<Box<dyn Processor>> {
        let key = required_str(config, "key")?;
        Ok(Box::new(match config.get("equals") {
            Some(value) => DropEventsProcessor::when_equal(key, json_value(value)?),
            None => DropEventsProcessor::when_present(key),
        }))
    }

    fn name(&self) -> &'static str {
        "drop_events"
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
