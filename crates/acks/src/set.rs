//! Acknowledgement sets
//!
//! An acknowledgement set tracks a cohort of records released together by a
//! source. Each record carries a reference count of outstanding consumers;
//! the set completes when every count reaches zero after it was sealed.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{AckError, Result};
use crate::handle::EventHandle;
use crate::manager::Registry;
use crate::CompletionCallback;

#[cfg(test)]
#[path = "set_test.rs"]
mod tests;

/// Identifier of an acknowledgement set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AckSetId(u64);

impl AckSetId {
    /// Create an identifier from its numeric value
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Numeric value of this identifier
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AckSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ack:{}", self.0)
    }
}

/// Mutable state of a set, guarded by the set's own lock
struct SetState {
    /// Record ordinal → outstanding consumers
    pending: HashMap<u64, u32>,

    /// No more records will be added
    sealed: bool,

    /// A consumer released negatively
    failed: bool,

    /// The callback has been taken (fired or discarded)
    fired: bool,

    /// The set outlived its expiry; all later releases are ignored
    expired: bool,

    callback: Option<CompletionCallback>,
}

/// What to do once the lock is dropped
#[derive(Default)]
struct Outcome {
    fire: Option<(CompletionCallback, bool)>,
    discard: Option<CompletionCallback>,
    finished: bool,
    expired: bool,
}

pub(crate) struct SetInner {
    id: AckSetId,
    created: Instant,
    expiry: Duration,
    next_record: AtomicU64,
    state: Mutex<SetState>,
    registry: Weak<Registry>,
}

impl SetInner {
    pub(crate) fn new(
        id: AckSetId,
        expiry: Duration,
        callback: CompletionCallback,
        registry: Weak<Registry>,
    ) -> Self {
        Self {
            id,
            created: Instant::now(),
            expiry,
            next_record: AtomicU64::new(0),
            state: Mutex::new(SetState {
                pending: HashMap::new(),
                sealed: false,
                failed: false,
                fired: false,
                expired: false,
                callback: Some(callback),
            }),
            registry,
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> AckSetId {
        self.id
    }

    #[inline]
    fn past_expiry(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created) >= self.expiry
    }

    /// Register a new record with one outstanding consumer
    fn add_record(&self) -> Result<u64> {
        let mut state = self.state.lock();
        if state.expired {
            return Err(AckError::Expired(self.id));
        }
        if state.sealed {
            return Err(AckError::AlreadyComplete(self.id));
        }
        let record = self.next_record.fetch_add(1, Ordering::Relaxed);
        state.pending.insert(record, 1);
        Ok(record)
    }

    /// Add one outstanding consumer to a record still in flight
    ///
    /// Returns false if the record is no longer tracked (fully released, or
    /// the set expired).
    pub(crate) fn acquire(&self, record: u64) -> bool {
        let mut state = self.state.lock();
        if state.expired {
            return false;
        }
        match state.pending.get_mut(&record) {
            Some(count) => {
                *count += 1;
                true
            }
            None => false,
        }
    }

    /// Drop one outstanding consumer of a record
    pub(crate) fn release(&self, record: u64, positive: bool) {
        let outcome = {
            let mut state = self.state.lock();
            if state.expired {
                return;
            }
            if self.past_expiry(Instant::now()) {
                Self::expire_locked(&mut state)
            } else {
                match state.pending.get_mut(&record) {
                    Some(count) if *count > 1 => *count -= 1,
                    Some(_) => {
                        state.pending.remove(&record);
                    }
                    None => return,
                }
                if !positive {
                    state.failed = true;
                }
                Self::settle_locked(&mut state)
            }
        };
        self.apply(outcome);
    }

    /// Seal the set: no more records may be added
    fn seal(&self) {
        let outcome = {
            let mut state = self.state.lock();
            if state.expired || state.sealed {
                return;
            }
            if self.past_expiry(Instant::now()) {
                Self::expire_locked(&mut state)
            } else {
                state.sealed = true;
                Self::settle_locked(&mut state)
            }
        };
        self.apply(outcome);
    }

    /// Discard the set if it outlived its expiry
    ///
    /// Returns true if the set is (now) expired or finished and can be dropped
    /// from the registry.
    pub(crate) fn expire_if_due(&self, now: Instant) -> bool {
        let outcome = {
            let mut state = self.state.lock();
            if state.expired {
                return true;
            }
            if !self.past_expiry(now) {
                return false;
            }
            Self::expire_locked(&mut state)
        };
        self.apply(outcome);
        true
    }

    fn expire_locked(state: &mut SetState) -> Outcome {
        state.expired = true;
        state.pending.clear();
        let was_fired = state.fired;
        state.fired = true;
        Outcome {
            discard: state.callback.take(),
            finished: true,
            expired: !was_fired,
            ..Outcome::default()
        }
    }

    fn settle_locked(state: &mut SetState) -> Outcome {
        let mut outcome = Outcome::default();
        if !state.fired {
            let result = if state.failed {
                Some(false)
            } else if state.sealed && state.pending.is_empty() {
                Some(true)
            } else {
                None
            };
            if let Some(result) = result {
                state.fired = true;
                outcome.fire = state.callback.take().map(|cb| (cb, result));
            }
        }
        outcome.finished = state.sealed && state.pending.is_empty();
        outcome
    }

    fn apply(&self, outcome: Outcome) {
        let registry = self.registry.upgrade();

        if let Some((callback, result)) = outcome.fire {
            tracing::trace!(ack_set = %self.id, result, "acknowledgement set completed");
            if let Some(registry) = &registry {
                registry.metrics.record_completed(result);
            }
            callback(result);
        }

        if outcome.expired {
            tracing::debug!(
                ack_set = %self.id,
                age_ms = self.created.elapsed().as_millis() as u64,
                "acknowledgement set expired before completion"
            );
            if let Some(registry) = &registry {
                registry.metrics.record_expired();
            }
        }

        // Dropping an unfired callback may release handles of a parent set.
        drop(outcome.discard);

        if outcome.finished
            && let Some(registry) = &registry
        {
            registry.remove(self.id);
        }
    }

    fn pending_records(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn is_done(&self) -> bool {
        self.state.lock().fired
    }

    fn is_expired(&self) -> bool {
        self.state.lock().expired
    }
}

/// Handle to an acknowledgement set
///
/// Cheap to clone. An inactive set (acknowledgements disabled) accepts every
/// call and does nothing; records added to it carry no [`EventHandle`].
#[derive(Clone, Default)]
pub struct AcknowledgementSet {
    inner: Option<Arc<SetInner>>,
}

impl AcknowledgementSet {
    pub(crate) fn active(inner: Arc<SetInner>) -> Self {
        Self { inner: Some(inner) }
    }

    /// A set that tracks nothing
    #[inline]
    #[must_use]
    pub fn inactive() -> Self {
        Self { inner: None }
    }

    /// Whether this set tracks records
    #[inline]
    pub fn is_active(&self) -> bool {
        self.inner.is_some()
    }

    /// Identifier of this set, if active
    #[inline]
    pub fn id(&self) -> Option<AckSetId> {
        self.inner.as_ref().map(|i| i.id())
    }

    /// Register a record and return the handle the record should carry
    ///
    /// Returns `Ok(None)` for an inactive set.
    ///
    /// # Errors
    ///
    /// Fails if the set was already sealed by [`complete`](Self::complete) or
    /// has expired.
    pub fn add(&self) -> Result<Option<EventHandle>> {
        let Some(inner) = &self.inner else {
            return Ok(None);
        };
        let record = inner.add_record()?;
        Ok(Some(EventHandle::new(Arc::clone(inner), record)))
    }

    /// Seal the set
    ///
    /// Must be called once every record has been added; the completion
    /// callback can only report success after this point. A sealed set with
    /// no outstanding records completes immediately.
    pub fn complete(&self) {
        if let Some(inner) = &self.inner {
            inner.seal();
        }
    }

    /// Number of records with outstanding consumers
    pub fn pending_records(&self) -> usize {
        self.inner.as_ref().map_or(0, |i| i.pending_records())
    }

    /// Whether the completion callback has fired (or been discarded)
    pub fn is_done(&self) -> bool {
        self.inner.as_ref().is_some_and(|i| i.is_done())
    }

    /// Whether the set expired before completing
    pub fn is_expired(&self) -> bool {
        self.inner.as_ref().is_some_and(|i| i.is_expired())
    }
}

impl fmt::Debug for AcknowledgementSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(inner) => f
                .debug_struct("AcknowledgementSet")
                .field("id", &inner.id)
                .field("pending", &inner.pending_records())
                .finish(),
            None => f.write_str("AcknowledgementSet(inactive)"),
        }
    }
}
