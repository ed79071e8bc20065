//! Stdout sink - JSON lines on standard output
//!
//! Each event is printed as one line: `{"type":..,"data":{..}}`. With
//! `metadata = true` the event's metadata is included as well.
//!
//! # Configuration
//!
//! | Option | Type | Default | Description |
//! |--------|------|---------|-------------|
//! | `metadata` | bool | `false` | Include event metadata |

use std::sync::Arc;

use async_trait::async_trait;
use conduit_protocol::{Event, Record};
use serde_json::json;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::registry::{SinkFactory, SinkPluginConfig};
use crate::{MetricsSnapshot, Sink, SinkError, SinkMetrics, SinkResult};

/// Sink printing events as JSON lines
pub struct StdoutSink {
    name: String,
    include_metadata: bool,
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    metrics: SinkMetrics,
}

impl StdoutSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_writer(name, tokio::io::stdout())
    }

    /// Create a sink writing to any async writer
    pub fn with_writer(name: impl Into<String>, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            name: name.into(),
            include_metadata: false,
            writer: Mutex::new(Box::new(writer)),
            metrics: SinkMetrics::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, include: bool) -> Self {
        self.include_metadata = include;
        self
    }

    fn format(&self, event: &Event) -> SinkResult<String> {
        let line = if self.include_metadata {
            serde_json::to_string(event)?
        } else {
            json!({ "type": event.event_type(), "data": event.data() }).to_string()
        };
        Ok(line)
    }
}

#[async_trait]
impl Sink for StdoutSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn output(&self, records: Vec<Record>) -> SinkResult<()> {
        self.metrics.batch_received();

        let mut buf = String::new();
        for record in &records {
            buf.push_str(&self.format(record.event())?);
            buf.push('\n');
        }

        let mut writer = self.writer.lock().await;
        let written = async {
            writer.write_all(buf.as_bytes()).await?;
            writer.flush().await
        }
        .await;

        match written {
            Ok(()) => {
                self.metrics
                    .batch_written(records.len() as u64, buf.len() as u64);
                Ok(())
            }
            Err(e) => {
                self.metrics.write_error();
                Err(SinkError::Io(e))
            }
        }
    }

    async fn close(&self) -> SinkResult<()> {
        self.writer.lock().await.flush().await?;
        let snapshot = self.metrics.snapshot();
        tracing::info!(
            sink = %self.name,
            batches = snapshot.batches_received,
            records = snapshot.records_written,
            bytes = snapshot.bytes_written,
            "stdout sink closed"
        );
        Ok(())
    }

    fn metrics(&self) -> Option<MetricsSnapshot> {
        Some(self.metrics.snapshot())
    }
}

/// Factory for [`StdoutSink`]
pub struct StdoutSinkFactory;

impl SinkFactory for StdoutSinkFactory {
    fn create(&self, name: &str, config: &SinkPluginConfig) -> SinkResult<Arc<dyn Sink>> {
        let include_metadata = match config.get("metadata") {
            None => false,
            Some(v) => v
                .as_bool()
                .ok_or_else(|| SinkError::config("'metadata' must be a boolean"))?,
        };
        Ok(Arc::new(StdoutSink::new(name).with_metadata(include_metadata)))
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

#[cfg(test)]
#[path = "stdout_test.rs"]
mod stdout_test;
