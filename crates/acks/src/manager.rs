//! Acknowledgement set manager
//!
//! Owns the table of live acknowledgement sets. The manager is injected
//! state: the pipeline graph creates one, hands clones to the components
//! that need it and tears it down with the graph.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::handle::EventHandle;
use crate::metrics::{AckMetrics, AckMetricsSnapshot};
use crate::set::{AckSetId, AcknowledgementSet, SetInner};
use crate::sweeper::{ExpirySweeper, ExpirySweeperHandle};

#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;

/// Shared table of live sets
pub(crate) struct Registry {
    sets: DashMap<AckSetId, Arc<SetInner>>,
    next_id: AtomicU64,
    pub(crate) metrics: AckMetrics,
}

impl Registry {
    #[inline]
    pub(crate) fn remove(&self, id: AckSetId) {
        self.sets.remove(&id);
    }
}

/// Registry of acknowledgement sets
///
/// Cheap to clone; clones share the same table. An inactive manager
/// (acknowledgements disabled) hands out inactive sets and tracks nothing.
#[derive(Clone)]
pub struct AcknowledgementSetManager {
    registry: Option<Arc<Registry>>,
}

impl Default for AcknowledgementSetManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AcknowledgementSetManager {
    /// Create an active manager with an empty table
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Some(Arc::new(Registry {
                sets: DashMap::new(),
                next_id: AtomicU64::new(1),
                metrics: AckMetrics::new(),
            })),
        }
    }

    /// Create a manager for pipelines with acknowledgements disabled
    #[must_use]
    pub fn inactive() -> Self {
        Self { registry: None }
    }

    /// Whether this manager tracks sets
    #[inline]
    pub fn is_active(&self) -> bool {
        self.registry.is_some()
    }

    /// Register a new acknowledgement set
    ///
    /// `on_complete` runs at most once, with `true` when every record was
    /// released positively and `false` on the first negative release. It
    /// never runs if the set expires first. On an inactive manager this
    /// returns an inactive set and `on_complete` is dropped.
    pub fn create<F>(&self, on_complete: F, expiry: Duration) -> AcknowledgementSet
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let Some(registry) = &self.registry else {
            return AcknowledgementSet::inactive();
        };

        let id = AckSetId::new(registry.next_id.fetch_add(1, Ordering::Relaxed));
        let inner = Arc::new(SetInner::new(
            id,
            expiry,
            Box::new(on_complete),
            Arc::downgrade(registry),
        ));
        registry.sets.insert(id, Arc::clone(&inner));
        registry.metrics.record_created();

        tracing::trace!(ack_set = %id, expiry_ms = expiry.as_millis() as u64, "acknowledgement set created");

        AcknowledgementSet::active(inner)
    }

    /// Take an additional lease on the record behind `handle`
    #[inline]
    pub fn acquire(&self, handle: &EventHandle) -> EventHandle {
        handle.acquire()
    }

    /// Release a lease
    ///
    /// Returns false if the lease had already been released.
    #[inline]
    pub fn release(&self, handle: &EventHandle, positive: bool) -> bool {
        handle.release(positive)
    }

    /// Whether a set is still registered
    pub fn contains(&self, id: AckSetId) -> bool {
        self.registry
            .as_ref()
            .is_some_and(|r| r.sets.contains_key(&id))
    }

    /// Number of registered sets
    pub fn pending_sets(&self) -> usize {
        self.registry.as_ref().map_or(0, |r| r.sets.len())
    }

    /// Discard every set that outlived its expiry
    ///
    /// Returns the number of sets removed. No callback fires for them.
    pub fn sweep(&self) -> usize {
        let Some(registry) = &self.registry else {
            return 0;
        };

        // Snapshot first: expiring a set removes it from the map, which must
        // not happen while a shard guard is held.
        let sets: Vec<Arc<SetInner>> = registry
            .sets
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let now = Instant::now();
        let mut swept = 0;
        for set in sets {
            if set.expire_if_due(now) {
                registry.remove(set.id());
                swept += 1;
            }
        }
        swept
    }

    /// Spawn the background expiry sweeper
    ///
    /// The sweeper runs until `cancel` is triggered or the handle is shut
    /// down. On an inactive manager the sweeper exits immediately.
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> ExpirySweeperHandle {
        ExpirySweeper::new(self.clone(), interval, cancel).spawn()
    }

    /// Snapshot of acknowledgement counters
    pub fn metrics(&self) -> AckMetricsSnapshot {
        self.registry
            .as_ref()
            .map(|r| r.metrics.snapshot())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for AcknowledgementSetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcknowledgementSetManager")
            .field("active", &self.is_active())
            .field("pending_sets", &self.pending_sets())
            .finish()
    }
}
