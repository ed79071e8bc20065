//! Null sink - discards all data
//!
//! Used to measure pipeline throughput without I/O and to terminate
//! branches whose output nobody needs.

use std::sync::Arc;

use async_trait::async_trait;
use conduit_protocol::Record;

use crate::registry::{SinkFactory, SinkPluginConfig};
use crate::{MetricsSnapshot, Sink, SinkMetrics, SinkResult};

/// Sink that accepts and drops every record
#[derive(Debug)]
pub struct NullSink {
    name: String,
    metrics: SinkMetrics,
}

impl NullSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metrics: SinkMetrics::new(),
        }
    }
}

#[async_trait]
impl Sink for NullSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn output(&self, records: Vec<Record>) -> SinkResult<()> {
        self.metrics.batch_received();
        self.metrics.batch_written(records.len() as u64, 0);
        Ok(())
    }

    fn metrics(&self) -> Option<MetricsSnapshot> {
        Some(self.metrics.snapshot())
    }
}

/// Factory for [`NullSink`]
pub struct NullSinkFactory;

impl SinkFactory for NullSinkFactory {
    fn create(&self, name: &str, _config: &SinkPluginConfig) -> SinkResult<Arc<dyn Sink>> {
        Ok(Arc::new(NullSink::new(name)))
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_protocol::Event;

    #[tokio::test]
    async fn test_counts_and_discards() {
        let sink = NullSink::new("null");
        let records = vec![Record::new(Event::new("log")), Record::new(Event::new("log"))];
        sink.output(records).await.unwrap();
        sink.output(Vec::new()).await.unwrap();

        let metrics = sink.metrics().unwrap();
        assert_eq!(metrics.batches_received, 2);
        assert_eq!(metrics.records_written, 2);
        assert!(sink.is_ready());
        assert!(!sink.manages_acknowledgements());
    }
}
