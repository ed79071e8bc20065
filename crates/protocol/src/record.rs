//! Record - an event plus its acknowledgement lease

use conduit_acks::EventHandle;

use crate::event::Event;

/// An event in flight
///
/// The record owns at most one [`EventHandle`]. Dropping a record that still
/// holds its handle releases it positively: the event was consumed.
#[derive(Debug)]
pub struct Record {
    event: Event,
    handle: Option<EventHandle>,
}

impl Record {
    /// Wrap an event with no acknowledgement tracking
    pub fn new(event: Event) -> Self {
        Self {
            event,
            handle: None,
        }
    }

    /// Wrap an event with an acknowledgement lease
    pub fn with_handle(event: Event, handle: EventHandle) -> Self {
        Self {
            event,
            handle: Some(handle),
        }
    }

    #[inline]
    pub fn event(&self) -> &Event {
        &self.event
    }

    #[inline]
    pub fn event_mut(&mut self) -> &mut Event {
        &mut self.event
    }

    /// Consume the record, releasing any lease positively
    pub fn into_event(self) -> Event {
        let Self { event, handle } = self;
        drop(handle);
        event
    }

    #[inline]
    pub fn handle(&self) -> Option<&EventHandle> {
        self.handle.as_ref()
    }

    /// Take ownership of the lease
    ///
    /// The caller becomes responsible for releasing it.
    #[inline]
    pub fn take_handle(&mut self) -> Option<EventHandle> {
        self.handle.take()
    }

    /// Attach a lease, returning any previous one
    #[inline]
    pub fn set_handle(&mut self, handle: EventHandle) -> Option<EventHandle> {
        self.handle.replace(handle)
    }

    /// Deep-copy the event and take an additional lease on the same record
    pub fn duplicate(&self) -> Self {
        Self {
            event: self.event.clone(),
            handle: self.handle.as_ref().map(EventHandle::acquire),
        }
    }
}

impl From<Event> for Record {
    fn from(event: Event) -> Self {
        Self::new(event)
    }
}
