//! Per-record acknowledgement handles
//!
//! An `EventHandle` is one consumer's lease on a record of an
//! acknowledgement set. Releasing it drops that consumer from the record's
//! outstanding count. Each lease releases at most once: a second `release`
//! on the same handle is a no-op.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::set::{AckSetId, SetInner};

/// A consumer's lease on one record of an acknowledgement set
///
/// Dropping a handle without releasing it releases it with its drop result:
/// positive for ordinary leases (a record discarded on purpose, e.g. filtered
/// out or matching no route, counts as handled), negative for guards obtained
/// with [`acquire_guard`](Self::acquire_guard).
pub struct EventHandle {
    set: Arc<SetInner>,
    record: u64,
    released: AtomicBool,
    drop_result: bool,
}

impl EventHandle {
    pub(crate) fn new(set: Arc<SetInner>, record: u64) -> Self {
        Self {
            set,
            record,
            released: AtomicBool::new(false),
            drop_result: true,
        }
    }

    fn lease(&self, drop_result: bool) -> Self {
        let tracked = !self.is_released() && self.set.acquire(self.record);
        Self {
            set: Arc::clone(&self.set),
            record: self.record,
            released: AtomicBool::new(!tracked),
            drop_result,
        }
    }

    /// Take an additional lease on the same record
    ///
    /// Used when a record is copied to another consumer (fan-out): the record
    /// is only fully acknowledged once every lease is released.
    #[must_use]
    pub fn acquire(&self) -> Self {
        self.lease(true)
    }

    /// Take a lease that releases negatively if dropped unreleased
    ///
    /// Workers hold one guard per record while a batch is inside the
    /// processor chain, so a failing (or panicking) processor fails the
    /// record even though the chain consumed it.
    #[must_use]
    pub fn acquire_guard(&self) -> Self {
        self.lease(false)
    }

    /// Release this lease
    ///
    /// Returns true if this call performed the release, false if the handle
    /// was already released or detached.
    pub fn release(&self, positive: bool) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.set.release(self.record, positive);
        true
    }

    /// Give up this lease without affecting the record's count
    ///
    /// The record will never be fully acknowledged through this lease; the
    /// set can then only complete negatively or expire.
    pub fn detach(&self) {
        self.released.store(true, Ordering::Release);
    }

    /// Whether this lease was released or detached
    #[inline]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Identifier of the owning set
    #[inline]
    pub fn set_id(&self) -> AckSetId {
        self.set.id()
    }
}

impl Drop for EventHandle {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.set.release(self.record, self.drop_result);
        }
    }
}

impl fmt::Debug for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandle")
            .field("set", &self.set.id())
            .field("record", &self.record)
            .field("released", &self.is_released())
            .finish()
    }
}
