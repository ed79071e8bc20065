//! Pipeline connectors - one pipeline's sink, another pipeline's source
//!
//! [`PipelineConnector`] is a [`Sink`] writing straight into the downstream
//! pipeline's buffer. [`ConnectorSource`] is the matching no-op source of
//! the downstream pipeline: its buffer is fed by upstream connectors.
//!
//! # Acknowledgements
//!
//! Records arriving with leases on an upstream set are re-registered in a
//! child set on the downstream side. The child set's completion releases the
//! upstream leases with the same outcome, so chains of pipelines resolve to
//! one result at the original source. If the child set expires, the upstream
//! leases are detached and the upstream set can only expire as well.
//!
//! # Backpressure
//!
//! A full downstream buffer is retried until `full_timeout` has passed in
//! total. Past that the batch fails and the connector raises the shared
//! [`ExhaustionSignal`].

use std::time::Duration;

use async_trait::async_trait;
use conduit_acks::{AcknowledgementSetManager, EventHandle};
use conduit_buffer::{Buffer, BufferError, Exhaustion, ExhaustionSignal};
use conduit_protocol::{Batch, Record};
use conduit_sinks::{MetricsSnapshot as SinkMetricsSnapshot, Sink, SinkError, SinkMetrics, SinkResult};
use conduit_sources::{Source, SourceContext, SourceResult};

use crate::metrics::BackpressureTracker;

/// Leases on upstream records, settled by a child set
struct ParentLeases(Vec<EventHandle>);

impl ParentLeases {
    fn release(self, positive: bool) {
        for lease in &self.0 {
            lease.release(positive);
        }
    }
}

impl Drop for ParentLeases {
    fn drop(&mut self) {
        // Reached unreleased only when the child set expired
        for lease in &self.0 {
            lease.detach();
        }
    }
}

/// Why a batch did not reach the downstream buffer
enum Undelivered {
    Closed(Batch),
    Exhausted(Batch, Exhaustion),
}

/// Sink forwarding records into another pipeline's buffer
pub struct PipelineConnector {
    name: String,
    target: String,
    buffer: Buffer,
    acknowledgements: AcknowledgementSetManager,
    ack_expiry: Duration,
    write_timeout: Duration,
    full_timeout: Duration,
    exhaustion: ExhaustionSignal,
    metrics: SinkMetrics,
    backpressure: BackpressureTracker,
}

impl PipelineConnector {
    pub fn new(
        name: impl Into<String>,
        target: impl Into<String>,
        buffer: Buffer,
        acknowledgements: AcknowledgementSetManager,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            buffer,
            acknowledgements,
            ack_expiry: conduit_acks::DEFAULT_EXPIRY,
            write_timeout: Duration::from_secs(5),
            full_timeout: conduit_buffer::DEFAULT_FULL_TIMEOUT,
            exhaustion: ExhaustionSignal::new(),
            metrics: SinkMetrics::new(),
            backpressure: BackpressureTracker::new(),
        }
    }

    #[must_use]
    pub fn with_ack_expiry(mut self, expiry: Duration) -> Self {
        self.ack_expiry = expiry;
        self
    }

    /// Bound on one write attempt; full buffers are retried
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Total retry budget before a full buffer is escalated through `signal`
    #[must_use]
    pub fn with_exhaustion(mut self, full_timeout: Duration, signal: ExhaustionSignal) -> Self {
        self.full_timeout = full_timeout;
        self.exhaustion = signal;
        self
    }

    /// Downstream pipeline name
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Write into the downstream buffer, retrying while it is full
    async fn forward(&self, mut batch: Batch) -> Result<(), Undelivered> {
        let started = tokio::time::Instant::now();
        loop {
            match self.buffer.write_timeout(batch, self.write_timeout).await {
                Ok(()) => return Ok(()),
                Err(err @ BufferError::WriteTimeout { .. }) => {
                    batch = err.into_batch();
                    let waited = started.elapsed();
                    if waited >= self.full_timeout {
                        let exhaustion = Exhaustion {
                            buffer: self.buffer.name().to_string(),
                            writer: self.name.clone(),
                            waited,
                            records: batch.len(),
                        };
                        return Err(Undelivered::Exhausted(batch, exhaustion));
                    }
                    self.backpressure.record_retry(&self.target, batch.len());
                }
                Err(err) => return Err(Undelivered::Closed(err.into_batch())),
            }
        }
    }
}

#[async_trait]
impl Sink for PipelineConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn output(&self, records: Vec<Record>) -> SinkResult<()> {
        self.metrics.batch_received();
        if records.is_empty() {
            return Ok(());
        }

        let mut parents = Vec::new();
        let mut batch = Batch::with_capacity(records.len());
        for mut record in records {
            if let Some(lease) = record.take_handle() {
                parents.push(lease);
            }
            batch.push(record);
        }
        let count = batch.len() as u64;

        // Untracked records, or a downstream that does not track: the
        // hand-off itself settles the upstream leases.
        let mut parents = Some(ParentLeases(parents));
        if parents.as_ref().is_some_and(|p| !p.0.is_empty()) && self.acknowledgements.is_active() {
            let leases = parents.take();
            let registered = batch.register_acknowledgements(
                &self.acknowledgements,
                move |positive| {
                    if let Some(leases) = leases {
                        leases.release(positive);
                    }
                },
                self.ack_expiry,
            );
            if let Err(e) = registered {
                self.metrics.write_error();
                batch.release_all(false);
                return Err(SinkError::write(format!(
                    "cannot track records for pipeline '{}': {e}",
                    self.target
                )));
            }
        }

        match self.forward(batch).await {
            Ok(()) => {
                if let Some(parents) = parents {
                    parents.release(true);
                }
                self.metrics.batch_written(count, 0);
                Ok(())
            }
            Err(undelivered) => {
                let (mut batch, exhausted) = match undelivered {
                    Undelivered::Closed(batch) => (batch, None),
                    Undelivered::Exhausted(batch, exhaustion) => (batch, Some(exhaustion)),
                };
                batch.release_all(false);
                if let Some(parents) = parents {
                    parents.release(false);
                }
                self.metrics.write_error();

                if let Some(exhaustion) = exhausted {
                    let err = SinkError::write(exhaustion.to_string());
                    self.exhaustion.raise(exhaustion);
                    return Err(err);
                }
                tracing::warn!(
                    sink = %self.name,
                    pipeline = %self.target,
                    records = count,
                    "downstream pipeline closed, records failed"
                );
                Err(SinkError::Closed)
            }
        }
    }

    fn manages_acknowledgements(&self) -> bool {
        true
    }

    fn metrics(&self) -> Option<SinkMetricsSnapshot> {
        Some(self.metrics.snapshot())
    }
}

/// Source of a pipeline fed only by upstream connectors
#[derive(Debug)]
pub struct ConnectorSource {
    name: String,
}

impl ConnectorSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Source for ConnectorSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, ctx: SourceContext) -> SourceResult<()> {
        tracing::debug!(pipeline = %ctx.pipeline, "reading from upstream pipelines");
        Ok(())
    }

    async fn stop(&self) {}
}

#[cfg(test)]
#[path = "connector_test.rs"]
mod tests;
