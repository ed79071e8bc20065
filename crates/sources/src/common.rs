//! Common types and utilities for sources

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use conduit_acks::{AckError, AcknowledgementSetManager};
use conduit_buffer::{Buffer, BufferError, Exhaustion, ExhaustionSignal};
use conduit_protocol::Batch;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Result type for source operations
pub type SourceResult<T> = Result<T, SourceError>;

/// Source errors
#[derive(Debug, Error)]
pub enum SourceError {
    /// Source configuration is invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Source was started twice
    #[error("source '{0}' already started")]
    AlreadyStarted(String),

    /// Downstream buffer was closed
    #[error("buffer '{0}' closed")]
    BufferClosed(String),

    /// The buffer stayed full past the retry budget
    #[error("{0}")]
    BufferExhausted(Exhaustion),

    /// Stop was requested while a write was pending
    #[error("source cancelled")]
    Cancelled,

    /// Acknowledgement registration failed
    #[error("acknowledgement error: {0}")]
    Acknowledgement(#[from] AckError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Everything a source needs to feed its pipeline
#[derive(Debug, Clone)]
pub struct SourceContext {
    /// Owning pipeline name
    pub pipeline: String,
    /// Buffer the source writes into
    pub buffer: Buffer,
    /// Inactive when the pipeline has acknowledgements disabled
    pub acknowledgements: AcknowledgementSetManager,
    pub ack_expiry: Duration,
    /// Bound on one buffer write attempt before retrying
    pub write_timeout: Duration,
    /// Total retry budget for one batch against a full buffer
    pub full_timeout: Duration,
    /// Raised when the retry budget runs out
    pub exhaustion: ExhaustionSignal,
    /// Triggered when the pipeline stops the source
    pub cancel: CancellationToken,
}

impl SourceContext {
    /// Register acknowledgements for a batch and write it into the buffer
    ///
    /// A full buffer is retried until space frees up, the context is
    /// cancelled or `full_timeout` has passed. A batch that cannot be
    /// delivered is released negatively; running out of time also raises
    /// the exhaustion signal.
    pub async fn publish<F>(&self, mut batch: Batch, on_complete: F) -> SourceResult<()>
    where
        F: FnOnce(bool) + Send + 'static,
    {
        batch.register_acknowledgements(&self.acknowledgements, on_complete, self.ack_expiry)?;

        let started = tokio::time::Instant::now();
        loop {
            match self.buffer.write_timeout(batch, self.write_timeout).await {
                Ok(()) => return Ok(()),
                Err(err @ BufferError::WriteTimeout { .. }) => {
                    batch = err.into_batch();
                    if self.cancel.is_cancelled() {
                        batch.release_all(false);
                        return Err(SourceError::Cancelled);
                    }
                    let waited = started.elapsed();
                    if waited >= self.full_timeout {
                        let exhaustion = Exhaustion {
                            buffer: self.buffer.name().to_string(),
                            writer: self.pipeline.clone(),
                            waited,
                            records: batch.len(),
                        };
                        batch.release_all(false);
                        self.exhaustion.raise(exhaustion.clone());
                        return Err(SourceError::BufferExhausted(exhaustion));
                    }
                    tracing::warn!(
                        pipeline = %self.pipeline,
                        buffer = %self.buffer.name(),
                        records = batch.len(),
                        waited_ms = waited.as_millis() as u64,
                        "buffer full, retrying write"
                    );
                }
                Err(err) => {
                    err.into_batch().release_all(false);
                    return Err(SourceError::BufferClosed(self.buffer.name().to_string()));
                }
            }
        }
    }
}

/// Metrics shared by all source types
#[derive(Debug, Default)]
pub struct SourceMetrics {
    /// Records received from the outside
    pub records_received: AtomicU64,

    /// Batches written into the buffer
    pub batches_sent: AtomicU64,

    /// Acknowledgement sets that completed positively
    pub acks_positive: AtomicU64,

    /// Acknowledgement sets that completed negatively
    pub acks_negative: AtomicU64,

    /// Errors encountered
    pub errors: AtomicU64,
}

impl SourceMetrics {
    pub const fn new() -> Self {
        Self {
            records_received: AtomicU64::new(0),
            batches_sent: AtomicU64::new(0),
            acks_positive: AtomicU64::new(0),
            acks_negative: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn records_received(&self, count: u64) {
        self.records_received.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn batch_sent(&self) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn ack(&self, positive: bool) {
        if positive {
            self.acks_positive.fetch_add(1, Ordering::Relaxed);
        } else {
            self.acks_negative.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_received: self.records_received.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            acks_positive: self.acks_positive.load(Ordering::Relaxed),
            acks_negative: self.acks_negative.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub records_received: u64,
    pub batches_sent: u64,
    pub acks_positive: u64,
    pub acks_negative: u64,
    pub errors: u64,
}
