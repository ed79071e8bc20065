//! In-memory source - programmatic submissions
//!
//! Callers push events through an [`InMemorySourceAccessor`] under a testing
//! key; the source configured with that key turns each submission into one
//! batch. When the pipeline has acknowledgements enabled, the accessor
//! records the outcome per key.
//!
//! # Acknowledgement outcome
//!
//! [`ack_received`](InMemorySourceAccessor::ack_received) is three-valued:
//!
//! - `None` - no submission under the key completed (pending or expired)
//! - `Some(true)` - every completed submission was acknowledged positively
//! - `Some(false)` - at least one submission was acknowledged negatively
//!
//! An expired submission never reports and is not retried.
//!
//! # Configuration
//!
//! | Option | Type | Default | Description |
//! |--------|------|---------|-------------|
//! | `testing_key` | string | source name | Key submissions are read from |

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use conduit_protocol::{Batch, Event};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::registry::{SourceFactory, SourcePluginConfig};
use crate::{MetricsSnapshot, Source, SourceContext, SourceError, SourceMetrics, SourceResult};


#[derive(Default)]
struct Channel {
    pending: Mutex<VecDeque<Vec<Event>>>,
    notify: Notify,
}

#[derive(Default)]
struct Shared {
    channels: DashMap<String, Arc<Channel>>,
    acks: DashMap<String, bool>,
    completions: DashMap<String, usize>,
}

/// Handle for submitting events and reading acknowledgement outcomes
#[derive(Clone, Default)]
pub struct InMemorySourceAccessor {
    shared: Arc<Shared>,
}

impl InMemorySourceAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, key: &str) -> Arc<Channel> {
        Arc::clone(
            self.shared
                .channels
                .entry(key.to_string())
                .or_default()
                .value(),
        )
    }

    /// Queue events as one submission for the source reading `key`
    pub fn submit(&self, key: &str, events: Vec<Event>) {
        let channel = self.channel(key);
        channel.pending.lock().push_back(events);
        channel.notify.notify_one();
    }

    /// Submissions not yet picked up by a source
    pub fn pending(&self, key: &str) -> usize {
        self.shared
            .channels
            .get(key)
            .map_or(0, |c| c.pending.lock().len())
    }

    /// Aggregated acknowledgement outcome for `key`
    pub fn ack_received(&self, key: &str) -> Option<bool> {
        self.shared.acks.get(key).map(|result| *result)
    }

    /// Number of submissions under `key` whose acknowledgement completed
    pub fn acks_completed(&self, key: &str) -> usize {
        self.shared.completions.get(key).map_or(0, |n| *n)
    }

    /// Forget acknowledgement outcomes for `key`
    pub fn reset_acks(&self, key: &str) {
        self.shared.acks.remove(key);
        self.shared.completions.remove(key);
    }

    /// Wait until `count` submissions under `key` completed
    ///
    /// Returns the outcome, or `None` on timeout.
    pub async fn wait_for_acks(&self, key: &str, count: usize, timeout: Duration) -> Option<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.acks_completed(key) >= count {
                return self.ack_received(key);
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn record_ack(&self, key: &str, positive: bool) {
        self.shared
            .acks
            .entry(key.to_string())
            .and_modify(|result| *result &= positive)
            .or_insert(positive);
        *self
            .shared
            .completions
            .entry(key.to_string())
            .or_default() += 1;
    }
}

impl std::fmt::Debug for InMemorySourceAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySourceAccessor")
            .field("keys", &self.shared.channels.len())
            .finish()
    }
}

/// Source fed through an [`InMemorySourceAccessor`]
pub struct InMemorySource {
    name: String,
    testing_key: String,
    accessor: InMemorySourceAccessor,
    metrics: Arc<SourceMetrics>,
    task: Mutex<Option<(JoinHandle<()>, CancellationToken)>>,
}

impl InMemorySource {
    pub fn new(
        name: impl Into<String>,
        testing_key: impl Into<String>,
        accessor: InMemorySourceAccessor,
    ) -> Self {
        Self {
            name: name.into(),
            testing_key: testing_key.into(),
            accessor,
            metrics: Arc::new(SourceMetrics::new()),
            task: Mutex::new(None),
        }
    }
}

/// Publish every pending submission until cancelled
async fn run(
    name: String,
    key: String,
    accessor: InMemorySourceAccessor,
    metrics: Arc<SourceMetrics>,
    ctx: SourceContext,
) {
    let channel = accessor.channel(&key);
    tracing::debug!(source = %name, pipeline = %ctx.pipeline, testing_key = %key, "in-memory source started");

    loop {
        let next = channel.pending.lock().pop_front();
        let Some(events) = next else {
            tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                _ = channel.notify.notified() => {}
            }
            continue;
        };

        metrics.records_received(events.len() as u64);
        let on_complete = {
            let accessor = accessor.clone();
            let metrics = Arc::clone(&metrics);
            let key = key.clone();
            move |positive: bool| {
                metrics.ack(positive);
                accessor.record_ack(&key, positive);
            }
        };

        match ctx.publish(Batch::from_events(events), on_complete).await {
            Ok(()) => metrics.batch_sent(),
            Err(SourceError::Cancelled) => break,
            Err(e) => {
                metrics.error();
                tracing::warn!(source = %name, error = %e, "failed to publish submission");
            }
        }
    }

    tracing::debug!(source = %name, "in-memory source stopped");
}

#[async_trait]
impl Source for InMemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, ctx: SourceContext) -> SourceResult<()> {
        let mut task = self.task.lock();
        if task.is_some() {
            return Err(SourceError::AlreadyStarted(self.name.clone()));
        }

        let cancel = ctx.cancel.child_token();
        let ctx = SourceContext {
            cancel: cancel.clone(),
            ..ctx
        };
        let handle = tokio::spawn(run(
            self.name.clone(),
            self.testing_key.clone(),
            self.accessor.clone(),
            Arc::clone(&self.metrics),
            ctx,
        ));
        *task = Some((handle, cancel));
        Ok(())
    }

    async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some((handle, cancel)) = task {
            cancel.cancel();
            if let Err(e) = handle.await {
                tracing::warn!(source = %self.name, error = %e, "in-memory source task failed");
            }
        }
    }

    fn metrics(&self) -> Option<MetricsSnapshot> {
        Some(self.metrics.snapshot())
    }
}

/// Factory for [`InMemorySource`] bound to one accessor
#[derive(Clone, Default)]
pub struct InMemorySourceFactory {
    accessor: InMemorySourceAccessor,
}

impl InMemorySourceFactory {
    pub fn new(accessor: InMemorySourceAccessor) -> Self {
        Self { accessor }
    }
}

impl SourceFactory for InMemorySourceFactory {
    fn create(&self, name: &str, config: &SourcePluginConfig) -> SourceResult<Arc<dyn Source>> {
        let testing_key = match config.get("testing_key") {
            None => name,
            Some(v) => v
                .as_str()
                .ok_or_else(|| SourceError::config("'testing_key' must be a string"))?,
        };
        Ok(Arc::new(InMemorySource::new(
            name,
            testing_key,
            self.accessor.clone(),
        )))
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}
