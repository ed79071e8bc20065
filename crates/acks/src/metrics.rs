//! Acknowledgement counters
//!
//! Relaxed atomics; values are eventually consistent.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the acknowledgement-set manager
#[derive(Debug, Default)]
pub struct AckMetrics {
    sets_created: AtomicU64,
    sets_acknowledged: AtomicU64,
    sets_failed: AtomicU64,
    sets_expired: AtomicU64,
}

impl AckMetrics {
    /// Create a zeroed counter set
    pub const fn new() -> Self {
        Self {
            sets_created: AtomicU64::new(0),
            sets_acknowledged: AtomicU64::new(0),
            sets_failed: AtomicU64::new(0),
            sets_expired: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_created(&self) {
        self.sets_created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_completed(&self, positive: bool) {
        if positive {
            self.sets_acknowledged.fetch_add(1, Ordering::Relaxed);
        } else {
            self.sets_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_expired(&self) {
        self.sets_expired.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> AckMetricsSnapshot {
        AckMetricsSnapshot {
            sets_created: self.sets_created.load(Ordering::Relaxed),
            sets_acknowledged: self.sets_acknowledged.load(Ordering::Relaxed),
            sets_failed: self.sets_failed.load(Ordering::Relaxed),
            sets_expired: self.sets_expired.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of acknowledgement counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckMetricsSnapshot {
    pub sets_created: u64,
    pub sets_acknowledged: u64,
    pub sets_failed: u64,
    pub sets_expired: u64,
}
