//! In-memory sink - stores events for inspection
//!
//! Sinks share an [`InMemorySinkAccessor`]; each sink files its events under
//! a testing key. Tests read what arrived through the accessor and can make
//! the sinks of a key report failure.
//!
//! # Configuration
//!
//! | Option | Type | Default | Description |
//! |--------|------|---------|-------------|
//! | `testing_key` | string | sink name | Key the events are stored under |
//! | `latency_ms` | integer | `0` | Delay before each write completes |

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use conduit_protocol::{Event, Record};
use dashmap::DashMap;

use crate::registry::{SinkFactory, SinkPluginConfig, optional_str};
use crate::{MetricsSnapshot, Sink, SinkError, SinkMetrics, SinkResult};

#[cfg(test)]
#[path = "in_memory_test.rs"]
mod in_memory_test;

#[derive(Default)]
struct Store {
    events: DashMap<String, Vec<Event>>,
    failing: DashMap<String, ()>,
}

/// Shared view of everything in-memory sinks received
#[derive(Clone, Default)]
pub struct InMemorySinkAccessor {
    store: Arc<Store>,
}

impl InMemorySinkAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events stored under a key, in arrival order
    pub fn get(&self, key: &str) -> Vec<Event> {
        self.store
            .events
            .get(key)
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Take the events stored under a key
    pub fn get_and_clear(&self, key: &str) -> Vec<Event> {
        self.store
            .events
            .remove(key)
            .map(|(_, events)| events)
            .unwrap_or_default()
    }

    /// Number of events stored under a key
    pub fn count(&self, key: &str) -> usize {
        self.store.events.get(key).map_or(0, |events| events.len())
    }

    /// Make sinks writing to `key` succeed (`true`) or fail (`false`)
    ///
    /// Failing sinks still store the events.
    pub fn set_result(&self, key: &str, success: bool) {
        if success {
            self.store.failing.remove(key);
        } else {
            self.store.failing.insert(key.to_string(), ());
        }
    }

    /// Whether sinks writing to `key` report success
    pub fn result(&self, key: &str) -> bool {
        !self.store.failing.contains_key(key)
    }

    /// Wait until at least `count` events arrived under `key`
    ///
    /// Returns false on timeout.
    pub async fn wait_for(&self, key: &str, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.count(key) >= count {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn append(&self, key: &str, events: impl IntoIterator<Item = Event>) {
        self.store
            .events
            .entry(key.to_string())
            .or_default()
            .extend(events);
    }
}

impl std::fmt::Debug for InMemorySinkAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySinkAccessor")
            .field("keys", &self.store.events.len())
            .finish()
    }
}

/// Sink storing events in an accessor
pub struct InMemorySink {
    name: String,
    testing_key: String,
    latency: Duration,
    accessor: InMemorySinkAccessor,
    metrics: SinkMetrics,
}

impl InMemorySink {
    pub fn new(
        name: impl Into<String>,
        testing_key: impl Into<String>,
        accessor: InMemorySinkAccessor,
    ) -> Self {
        Self {
            name: name.into(),
            testing_key: testing_key.into(),
            latency: Duration::ZERO,
            accessor,
            metrics: SinkMetrics::new(),
        }
    }

    /// Delay every write by `latency`
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn testing_key(&self) -> &str {
        &self.testing_key
    }
}

#[async_trait]
impl Sink for InMemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn output(&self, records: Vec<Record>) -> SinkResult<()> {
        self.metrics.batch_received();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let count = records.len();
        self.accessor
            .append(&self.testing_key, records.into_iter().map(Record::into_event));

        if self.accessor.result(&self.testing_key) {
            self.metrics.batch_written(count as u64, 0);
            Ok(())
        } else {
            self.metrics.write_error();
            Err(SinkError::write(format!(
                "in-memory sink '{}' configured to fail",
                self.testing_key
            )))
        }
    }

    fn metrics(&self) -> Option<MetricsSnapshot> {
        Some(self.metrics.snapshot())
    }
}

/// Factory for [`InMemorySink`] bound to one accessor
#[derive(Clone, Default)]
pub struct InMemorySinkFactory {
    accessor: InMemorySinkAccessor,
}

impl InMemorySinkFactory {
    pub fn new(accessor: InMemorySinkAccessor) -> Self {
        Self { accessor }
    }

    pub fn accessor(&self) -> &InMemorySinkAccessor {
        &self.accessor
    }
}

impl SinkFactory for InMemorySinkFactory {
    fn create(&self, name: &str, config: &SinkPluginConfig) -> SinkResult<Arc<dyn Sink>> {
        let testing_key = optional_str(config, "testing_key")?.unwrap_or(name);
        let latency = match config.get("latency_ms") {
            None => Duration::ZERO,
            Some(v) => v
                .as_integer()
                .and_then(|ms| u64::try_from(ms).ok())
                .map(Duration::from_millis)
                .ok_or_else(|| SinkError::config("'latency_ms' must be a non-negative integer"))?,
        };
        Ok(Arc::new(
            InMemorySink::new(name, testing_key, self.accessor.clone()).with_latency(latency),
        ))
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}
