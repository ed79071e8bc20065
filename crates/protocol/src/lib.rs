//! Conduit Protocol - Core types flowing through pipelines
//!
//! - `Event` - ordered, nested key/value document plus event-type metadata
//! - `Record` - an `Event` plus its optional acknowledgement lease
//! - `Batch` - ordered sequence of records processed together
//!
//! # Design Principles
//!
//! - **Owned records**: a record belongs to exactly one consumer at a time;
//!   fan-out copies the event and takes a new acknowledgement lease
//! - **Order preserving**: a batch keeps insertion order end to end
//! - **Mutable content**: processors edit events in place via key paths

mod batch;
mod error;
mod event;
mod record;

pub use batch::Batch;
pub use error::ProtocolError;
pub use event::{Event, EventMetadata, event_types};
pub use record::Record;

// Re-export JSON value types used by `Event`
pub use serde_json::{Map, Value};

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
