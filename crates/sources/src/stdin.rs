//! Stdin source - JSON lines from standard input
//!
//! Each line becomes one event. A line holding a JSON object becomes the
//! event's data; any other line is stored under `message`. Lines are
//! grouped into batches of up to `batch_size`, flushed early after
//! `flush_interval_ms` without new input. End of input stops the source.
//!
//! # Configuration
//!
//! | Option | Type | Default | Description |
//! |--------|------|---------|-------------|
//! | `event_type` | string | `"log"` | Type of produced events |
//! | `batch_size` | integer | `100` | Maximum records per batch |
//! | `flush_interval_ms` | integer | `200` | Idle time before a partial batch is sent |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conduit_protocol::{Batch, Event};
use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::registry::{SourceFactory, SourcePluginConfig};
use crate::{MetricsSnapshot, Source, SourceContext, SourceError, SourceMetrics, SourceResult};

const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(200);

type LineReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Source reading JSON lines
pub struct StdinSource {
    name: String,
    event_type: String,
    batch_size: usize,
    flush_interval: Duration,
    reader: Mutex<Option<LineReader>>,
    metrics: Arc<SourceMetrics>,
    task: Mutex<Option<(JoinHandle<()>, CancellationToken)>>,
}

impl StdinSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_reader(name, BufReader::new(tokio::io::stdin()))
    }

    /// Read lines from any buffered reader instead of stdin
    pub fn with_reader(name: impl Into<String>, reader: impl AsyncBufRead + Send + Unpin + 'static) -> Self {
        Self {
            name: name.into(),
            event_type: "log".into(),
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            reader: Mutex::new(Some(Box::new(reader))),
            metrics: Arc::new(SourceMetrics::new()),
            task: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }
}

/// Turn one input line into an event
pub(crate) fn parse_line(event_type: &str, line: &str) -> Event {
    Event::from_json(event_type, line).unwrap_or_else(|_| {
        let mut event = Event::new(event_type);
        event.data_mut().insert("message".into(), line.into());
        event
    })
}

struct Reader {
    name: String,
    event_type: String,
    batch_size: usize,
    flush_interval: Duration,
    metrics: Arc<SourceMetrics>,
}

impl Reader {
    async fn run(self, reader: LineReader, ctx: SourceContext) {
        let mut lines = reader.lines();
        let mut pending: Vec<Event> = Vec::with_capacity(self.batch_size);

        loop {
            let next = tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                line = tokio::time::timeout(self.flush_interval, lines.next_line()) => line,
            };

            match next {
                Ok(Ok(Some(line))) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        pending.push(parse_line(&self.event_type, line));
                    }
                    if pending.len() >= self.batch_size && !self.flush(&mut pending, &ctx).await {
                        break;
                    }
                }
                Ok(Ok(None)) => break,
                Ok(Err(e)) => {
                    self.metrics.error();
                    tracing::warn!(source = %self.name, error = %e, "stdin read failed");
                    break;
                }
                Err(_) => {
                    if !self.flush(&mut pending, &ctx).await {
                        break;
                    }
                }
            }
        }

        self.flush(&mut pending, &ctx).await;
        tracing::info!(source = %self.name, "stdin source finished");
    }

    /// Publish pending events; false once the pipeline no longer accepts input
    async fn flush(&self, pending: &mut Vec<Event>, ctx: &SourceContext) -> bool {
        if pending.is_empty() {
            return true;
        }
        let events = std::mem::replace(pending, Vec::with_capacity(self.batch_size));
        self.metrics.records_received(events.len() as u64);

        let metrics = Arc::clone(&self.metrics);
        match ctx
            .publish(Batch::from_events(events), move |ok| metrics.ack(ok))
            .await
        {
            Ok(()) => {
                self.metrics.batch_sent();
                true
            }
            Err(e) => {
                self.metrics.error();
                tracing::warn!(source = %self.name, error = %e, "failed to publish batch");
                false
            }
        }
    }
}

#[async_trait]
impl Source for StdinSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, ctx: SourceContext) -> SourceResult<()> {
        let mut task = self.task.lock();
        if task.is_some() {
            return Err(SourceError::AlreadyStarted(self.name.clone()));
        }
        let reader = self
            .reader
            .lock()
            .take()
            .ok_or_else(|| SourceError::AlreadyStarted(self.name.clone()))?;

        let cancel = ctx.cancel.child_token();
        let ctx = SourceContext {
            cancel: cancel.clone(),
            ..ctx
        };
        let worker = Reader {
            name: self.name.clone(),
            event_type: self.event_type.clone(),
            batch_size: self.batch_size,
            flush_interval: self.flush_interval,
            metrics: Arc::clone(&self.metrics),
        };
        *task = Some((tokio::spawn(worker.run(reader, ctx)), cancel));
        Ok(())
    }

    async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some((handle, cancel)) = task {
            cancel.cancel();
            if let Err(e) = handle.await {
                tracing::warn!(source = %self.name, error = %e, "stdin source task failed");
            }
        }
    }

    fn metrics(&self) -> Option<MetricsSnapshot> {
        Some(self.metrics.snapshot())
    }
}

/// Factory for [`StdinSource`]
pub struct StdinSourceFactory;

impl SourceFactory for StdinSourceFactory {
    fn create(&self, name: &str, config: &SourcePluginConfig) -> SourceResult<Arc<dyn Source>> {
        let mut source = StdinSource::new(name);
        if let Some(v) = config.get("event_type") {
            let event_type = v
                .as_str()
                .ok_or_else(|| SourceError::config("'event_type' must be a string"))?;
            source = source.with_event_type(event_type);
        }
        if let Some(size) = positive_integer(config, "batch_size")? {
            source = source.with_batch_size(size as usize);
        }
        if let Some(ms) = positive_integer(config, "flush_interval_ms")? {
            source = source.with_flush_interval(Duration::from_millis(ms));
        }
        Ok(Arc::new(source))
    }

    fn name(&self) -> &'static str {
        "stdin"
    }
}

fn positive_integer(config: &SourcePluginConfig, key: &str) -> SourceResult<Option<u64>> {
    match config.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_integer()
            .and_then(|n| u64::try_from(n).ok())
            .filter(|n| *n > 0)
            .map(Some)
            .ok_or_else(|| SourceError::config(format!("'{key}' must be a positive integer"))),
    }
}
