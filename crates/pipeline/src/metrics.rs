//! Pipeline metrics
//!
//! Atomic counters updated by workers and the sink stage. Relaxed ordering
//! everywhere: values are eventually consistent, never used for control.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters for one pipeline
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Batches taken from the buffer
    batches_read: AtomicU64,

    /// Records taken from the buffer
    records_read: AtomicU64,

    /// Records leaving the processor chain
    records_processed: AtomicU64,

    /// Records removed by processors
    records_dropped: AtomicU64,

    /// Records matching no sink
    records_unrouted: AtomicU64,

    /// Batches failed by a processor
    processor_failures: AtomicU64,

    /// Records handed to sinks, counting fan-out copies
    records_written: AtomicU64,

    /// Sink output calls
    sink_writes: AtomicU64,

    /// Sink output calls that failed
    sink_failures: AtomicU64,

    /// Processor chain replacements
    swaps: AtomicU64,
}

impl PipelineMetrics {
    pub const fn new() -> Self {
        Self {
            batches_read: AtomicU64::new(0),
            records_read: AtomicU64::new(0),
            records_processed: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            records_unrouted: AtomicU64::new(0),
            processor_failures: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            sink_writes: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
            swaps: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_read(&self, records: usize) {
        self.batches_read.fetch_add(1, Ordering::Relaxed);
        self.records_read.fetch_add(records as u64, Ordering::Relaxed);
    }

    /// Record a successful chain run from `input` to `output` records
    #[inline]
    pub fn record_processed(&self, input: usize, output: usize) {
        self.records_processed
            .fetch_add(output as u64, Ordering::Relaxed);
        if output < input {
            self.records_dropped
                .fetch_add((input - output) as u64, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_unrouted(&self, records: usize) {
        if records > 0 {
            self.records_unrouted
                .fetch_add(records as u64, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_processor_failure(&self) {
        self.processor_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one sink output call of `records` records
    #[inline]
    pub fn record_sink_write(&self, records: usize, success: bool) {
        self.sink_writes.fetch_add(1, Ordering::Relaxed);
        if success {
            self.records_written
                .fetch_add(records as u64, Ordering::Relaxed);
        } else {
            self.sink_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_swap(&self) {
        self.swaps.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_read: self.batches_read.load(Ordering::Relaxed),
            records_read: self.records_read.load(Ordering::Relaxed),
            records_processed: self.records_processed.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            records_unrouted: self.records_unrouted.load(Ordering::Relaxed),
            processor_failures: self.processor_failures.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            sink_writes: self.sink_writes.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            swaps: self.swaps.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of pipeline metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub batches_read: u64,
    pub records_read: u64,
    pub records_processed: u64,
    pub records_dropped: u64,
    pub records_unrouted: u64,
    pub processor_failures: u64,
    pub records_written: u64,
    pub sink_writes: u64,
    pub sink_failures: u64,
    pub swaps: u64,
}

impl MetricsSnapshot {
    /// Fraction of sink writes that succeeded
    ///
    /// Returns None if no sink write has been attempted.
    #[inline]
    pub fn sink_success_rate(&self) -> Option<f64> {
        if self.sink_writes == 0 {
            None
        } else {
            Some((self.sink_writes - self.sink_failures) as f64 / self.sink_writes as f64)
        }
    }
}

// ============================================================================
// Backpressure Tracker - rate-limited logging of full downstream buffers
// ============================================================================

/// Log interval in milliseconds
const LOG_INTERVAL_MS: u64 = 1000;

/// Aggregates "buffer full" retries and logs at most once per second
#[derive(Debug)]
pub(crate) struct BackpressureTracker {
    started: Instant,
    interval_retries: AtomicU64,
    interval_records: AtomicU64,
    last_log_ms: AtomicU64,
}

impl BackpressureTracker {
    pub(crate) fn new() -> Self {
        Self {
            started: Instant::now(),
            interval_retries: AtomicU64::new(0),
            interval_records: AtomicU64::new(0),
            last_log_ms: AtomicU64::new(0),
        }
    }

    /// Count one retry of `records` records; returns true if a log was emitted
    pub(crate) fn record_retry(&self, target: &str, records: usize) -> bool {
        self.interval_retries.fetch_add(1, Ordering::Relaxed);
        self.interval_records
            .fetch_add(records as u64, Ordering::Relaxed);

        let now = self.started.elapsed().as_millis() as u64;
        let last = self.last_log_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) < LOG_INTERVAL_MS && last != 0 {
            return false;
        }
        // Claim the log slot so concurrent workers log once
        if self
            .last_log_ms
            .compare_exchange(last, now.max(1), Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        let retries = self.interval_retries.swap(0, Ordering::Relaxed);
        let records = self.interval_records.swap(0, Ordering::Relaxed);
        tracing::warn!(
            pipeline = %target,
            retries,
            records,
            "backpressure: downstream buffer full"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processed_counts_drops() {
        let metrics = PipelineMetrics::new();
        metrics.record_read(10);
        metrics.record_processed(10, 7);
        metrics.record_processed(2, 5);
        let s = metrics.snapshot();
        assert_eq!(s.batches_read, 1);
        assert_eq!(s.records_read, 10);
        assert_eq!(s.records_processed, 12);
        assert_eq!(s.records_dropped, 3);
    }

    #[test]
    fn test_sink_success_rate() {
        let metrics = PipelineMetrics::new();
        assert_eq!(metrics.snapshot().sink_success_rate(), None);

        metrics.record_sink_write(10, true);
        metrics.record_sink_write(10, true);
        metrics.record_sink_write(10, true);
        metrics.record_sink_write(10, false);
        let s = metrics.snapshot();
        assert_eq!(s.records_written, 30);
        assert_eq!(s.sink_failures, 1);
        assert_eq!(s.sink_success_rate(), Some(0.75));
    }

    #[test]
    fn test_backpressure_tracker_rate_limited() {
        let tracker = BackpressureTracker::new();
        assert!(tracker.record_retry("downstream", 5));
        assert!(!tracker.record_retry("downstream", 5));
        assert!(!tracker.record_retry("downstream", 5));
    }
}
