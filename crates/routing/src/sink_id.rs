//! Sink identifier type
//!
//! `SinkId` is the position of a sink in its pipeline's router.

use std::fmt;

/// Sink identifier assigned in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkId(u16);

impl SinkId {
    /// Maximum number of sinks per router
    pub const MAX: u16 = u16::MAX;

    #[inline]
    #[must_use]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> u16 {
        self.0
    }

    /// Index as usize (for slot lookup)
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink:{}", self.0)
    }
}

impl From<u16> for SinkId {
    #[inline]
    fn from(index: u16) -> Self {
        Self::new(index)
    }
}

impl From<SinkId> for usize {
    #[inline]
    fn from(id: SinkId) -> Self {
        id.0 as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_and_display() {
        let id = SinkId::new(3);
        assert_eq!(id.index(), 3);
        assert_eq!(id.as_usize(), 3);
        assert_eq!(id.to_string(), "sink:3");
    }

    #[test]
    fn test_ordering_follows_registration() {
        assert!(SinkId::new(0) < SinkId::new(1));
        let slots = ["stdout", "archive"];
        assert_eq!(slots[SinkId::from(1u16).as_usize()], "archive");
    }
}
