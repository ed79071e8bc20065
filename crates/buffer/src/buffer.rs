//! Bounded batch buffer

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use conduit_protocol::Batch;
use crossfire::{MAsyncRx, MAsyncTx};
use tokio::sync::Semaphore;

use crate::error::{BufferError, Result};

#[cfg(test)]
#[path = "buffer_test.rs"]
mod tests;

/// Bounded multi-producer, multi-consumer queue of batches
///
/// Cheap to clone; clones share the same queue. Capacity is enforced with a
/// semaphore so a write that times out can return its batch to the caller
/// instead of losing it inside a cancelled send.
#[derive(Clone)]
pub struct Buffer {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    capacity: usize,
    tx: MAsyncTx<Batch>,
    rx: MAsyncRx<Batch>,
    slots: Semaphore,
    closed: AtomicBool,
    batches: AtomicUsize,
    records: AtomicUsize,
    metrics: BufferMetrics,
}

#[derive(Default)]
struct BufferMetrics {
    batches_written: AtomicU64,
    records_written: AtomicU64,
    batches_read: AtomicU64,
    write_timeouts: AtomicU64,
    batches_discarded: AtomicU64,
}

/// Point-in-time buffer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferMetricsSnapshot {
    pub batches_written: u64,
    pub records_written: u64,
    pub batches_read: u64,
    pub write_timeouts: u64,
    pub batches_discarded: u64,
    pub queued_batches: usize,
    pub queued_records: usize,
}

impl Buffer {
    /// Create a buffer holding at most `capacity` batches
    ///
    /// A capacity of zero is raised to one.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = crossfire::mpmc::bounded_async::<Batch>(capacity);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                capacity,
                tx,
                rx,
                slots: Semaphore::new(capacity),
                closed: AtomicBool::new(false),
                batches: AtomicUsize::new(0),
                records: AtomicUsize::new(0),
                metrics: BufferMetrics::default(),
            }),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Queued batches
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.batches.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records across all queued batches
    #[inline]
    pub fn records(&self) -> usize {
        self.inner.records.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Write a batch, waiting as long as it takes for space
    pub async fn write(&self, batch: Batch) -> Result<()> {
        match self.inner.slots.acquire().await {
            Ok(permit) => {
                permit.forget();
                self.push(batch).await
            }
            Err(_) => Err(self.closed_error(batch)),
        }
    }

    /// Write a batch, giving up after `timeout`
    pub async fn write_timeout(&self, batch: Batch, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.inner.slots.acquire()).await {
            Ok(Ok(permit)) => {
                permit.forget();
                self.push(batch).await
            }
            Ok(Err(_)) => Err(self.closed_error(batch)),
            Err(_) => {
                self.inner
                    .metrics
                    .write_timeouts
                    .fetch_add(1, Ordering::Relaxed);
                Err(BufferError::WriteTimeout {
                    name: self.inner.name.clone(),
                    timeout,
                    batch,
                })
            }
        }
    }

    /// Read the next batch, waiting up to `timeout`
    ///
    /// Returns `None` when nothing arrived in time.
    pub async fn read(&self, timeout: Duration) -> Option<Batch> {
        match tokio::time::timeout(timeout, self.inner.rx.recv()).await {
            Ok(Ok(batch)) => Some(self.on_read(batch)),
            _ => None,
        }
    }

    /// Read a batch if one is queued
    pub fn try_read(&self) -> Option<Batch> {
        self.inner.rx.try_recv().ok().map(|batch| self.on_read(batch))
    }

    /// Close the buffer
    ///
    /// Pending and future writes fail with [`BufferError::Closed`]. Batches
    /// still queued are released negatively so their sources see a failed
    /// delivery. Returns the number of batches discarded.
    pub fn shutdown(&self) -> usize {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            self.inner.slots.close();
        }
        let discarded = self.inner.discard_queued();
        if discarded > 0 {
            tracing::warn!(
                buffer = %self.inner.name,
                batches = discarded,
                "discarded queued batches at shutdown"
            );
        }
        discarded
    }

    /// Snapshot of buffer counters
    pub fn metrics(&self) -> BufferMetricsSnapshot {
        let m = &self.inner.metrics;
        BufferMetricsSnapshot {
            batches_written: m.batches_written.load(Ordering::Relaxed),
            records_written: m.records_written.load(Ordering::Relaxed),
            batches_read: m.batches_read.load(Ordering::Relaxed),
            write_timeouts: m.write_timeouts.load(Ordering::Relaxed),
            batches_discarded: m.batches_discarded.load(Ordering::Relaxed),
            queued_batches: self.len(),
            queued_records: self.records(),
        }
    }

    async fn push(&self, batch: Batch) -> Result<()> {
        let records = batch.len();
        // Count before sending so a fast reader never drives the gauges below zero
        self.inner.batches.fetch_add(1, Ordering::AcqRel);
        self.inner.records.fetch_add(records, Ordering::AcqRel);

        if let Err(err) = self.inner.tx.send(batch).await {
            self.inner.batches.fetch_sub(1, Ordering::AcqRel);
            self.inner.records.fetch_sub(records, Ordering::AcqRel);
            return Err(self.closed_error(err.0));
        }

        let m = &self.inner.metrics;
        m.batches_written.fetch_add(1, Ordering::Relaxed);
        m.records_written.fetch_add(records as u64, Ordering::Relaxed);
        tracing::trace!(buffer = %self.inner.name, records, "batch written");
        Ok(())
    }

    fn on_read(&self, batch: Batch) -> Batch {
        self.inner.batches.fetch_sub(1, Ordering::AcqRel);
        self.inner.records.fetch_sub(batch.len(), Ordering::AcqRel);
        self.inner
            .metrics
            .batches_read
            .fetch_add(1, Ordering::Relaxed);
        if !self.is_closed() {
            self.inner.slots.add_permits(1);
        }
        batch
    }

    fn closed_error(&self, batch: Batch) -> BufferError {
        BufferError::Closed {
            name: self.inner.name.clone(),
            batch,
        }
    }
}

impl Inner {
    fn discard_queued(&self) -> usize {
        let mut discarded = 0;
        while let Ok(mut batch) = self.rx.try_recv() {
            self.batches.fetch_sub(1, Ordering::AcqRel);
            self.records.fetch_sub(batch.len(), Ordering::AcqRel);
            batch.release_all(false);
            discarded += 1;
        }
        self.metrics
            .batches_discarded
            .fetch_add(discarded as u64, Ordering::Relaxed);
        discarded
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.discard_queued();
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("name", &self.inner.name)
            .field("capacity", &self.inner.capacity)
            .field("batches", &self.len())
            .field("records", &self.records())
            .field("closed", &self.is_closed())
            .finish()
    }
}
