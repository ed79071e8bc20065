//! Batch - ordered records processed as a unit

use std::time::Duration;

use conduit_acks::{AcknowledgementSet, AcknowledgementSetManager};

use crate::event::Event;
use crate::record::Record;

#[cfg(test)]
#[path = "batch_test.rs"]
mod tests;

/// An ordered group of records
#[derive(Debug, Default)]
pub struct Batch {
    records: Vec<Record>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    /// Build a batch of untracked records from events
    pub fn from_events(events: impl IntoIterator<Item = Event>) -> Self {
        Self {
            records: events.into_iter().map(Record::new).collect(),
        }
    }

    #[inline]
    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[inline]
    pub fn records_mut(&mut self) -> &mut Vec<Record> {
        &mut self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Events in order
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.records.iter().map(Record::event)
    }

    /// Register one acknowledgement set covering every record
    ///
    /// Each record gets a fresh lease; any lease it held before is released
    /// positively. The set is sealed before returning, so `on_complete` may
    /// fire as soon as the leases are released. An empty batch completes
    /// immediately with `true`. On an inactive manager the records are left
    /// untouched and an inactive set is returned.
    pub fn register_acknowledgements<F>(
        &mut self,
        manager: &AcknowledgementSetManager,
        on_complete: F,
        expiry: Duration,
    ) -> conduit_acks::Result<AcknowledgementSet>
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let set = manager.create(on_complete, expiry);
        if !set.is_active() {
            return Ok(set);
        }
        self.attach(&set)?;
        set.complete();
        Ok(set)
    }

    /// Add every record to an open set without sealing it
    pub fn attach(&mut self, set: &AcknowledgementSet) -> conduit_acks::Result<()> {
        for record in &mut self.records {
            if let Some(handle) = set.add()? {
                record.set_handle(handle);
            }
        }
        Ok(())
    }

    /// Release every lease still held by the batch
    ///
    /// Returns the number of leases released.
    pub fn release_all(&mut self, positive: bool) -> usize {
        self.records
            .iter_mut()
            .filter_map(Record::take_handle)
            .filter(|handle| handle.release(positive))
            .count()
    }
}

impl From<Vec<Record>> for Batch {
    fn from(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl FromIterator<Record> for Batch {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Batch {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
