//! Conduit - Transform
//!
//! Processors modify batches between a pipeline's buffer and its router.
//!
//! # Overview
//!
//! A processor receives a whole batch and returns a batch. It may edit events
//! in place, drop records or add new ones. Dropping a record releases its
//! acknowledgement lease positively: the record was handled on purpose.
//!
//! ```text
//! [Batch] → [Processor 1] → [Processor 2] → ... → [Batch']
//! ```
//!
//! # Worker Affinity
//!
//! Most processors are thread-safe and one instance is shared by every worker
//! of a pipeline. A factory may instead declare its processor
//! single-threaded: the chain then holds one instance per worker, created up
//! front, and worker `i` always runs instance `i`.
//!
//! ```text
//!            shared          per-worker
//! worker 0 ─→ [add_field] ─→ [sequence #0]
//! worker 1 ─→ [add_field] ─→ [sequence #1]
//! ```
//!
//! # Modules
//!
//! - `chain` - Ordered slots executed sequentially per worker
//! - `registry` - Factories keyed by processor type name
//! - `noop` - Pass-through
//! - `add_field` - Set a field on every event
//! - `drop_events` - Drop events matching a field test
//! - `sequence` - Per-instance event numbering (single-threaded)

mod chain;
mod error;
pub mod add_field;
pub mod drop_events;
pub mod noop;
pub mod registry;
pub mod sequence;

pub use add_field::{AddFieldFactory, AddFieldProcessor};
pub use chain::{ProcessorChain, ProcessorSlot};
pub use drop_events::{DropEventsFactory, DropEventsProcessor};
pub use error::ProcessorError;
pub use noop::NoopProcessor;
pub use registry::{NoopFactory, ProcessorConfig, ProcessorFactory, ProcessorRegistry};
pub use sequence::{INSTANCE_ATTRIBUTE, SequenceFactory, SequenceProcessor};

use conduit_protocol::Batch;
use std::future::Future;
use std::pin::Pin;

/// Result type for processor operations
pub type ProcessorResult<T> = Result<T, ProcessorError>;

/// Future returned by [`Processor::execute`]
pub type ProcessorFuture<'a> = Pin<Box<dyn Future<Output = ProcessorResult<Batch>> + Send + 'a>>;

/// Trait for batch processors
///
/// Implementors must be `Send + Sync`; shared processors are called from
/// every worker concurrently.
///
/// # Example
///
/// ```ignore
/// struct Uppercase;
///
/// impl Processor for Uppercase {
///     fn execute<'a>(&'a self, mut batch: Batch) -> ProcessorFuture<'a> {
///         Box::pin(async move {
///             for record in batch.records_mut() {
///                 // edit record.event_mut()
///             }
///             Ok(batch)
///         })
///     }
///
///     fn name(&self) -> &'static str {
///         "uppercase"
///     }
/// }
/// ```
pub trait Processor: Send + Sync {
    /// Process a batch, returning the resulting batch
    ///
    /// Returning an error fails every record of the input batch.
    fn execute<'a>(&'a self, batch: Batch) -> ProcessorFuture<'a>;

    /// Name of this processor for logging and metrics
    fn name(&self) -> &'static str;

    /// Called once when the pipeline starts stopping
    ///
    /// Processors holding records across batches should start flushing.
    fn prepare_for_shutdown(&self) {}

    /// Whether the processor has nothing left to flush
    ///
    /// Workers keep pulling from the buffer until every processor reports
    /// ready (or the shutdown timeout expires).
    fn is_ready_for_shutdown(&self) -> bool {
        true
    }

    /// Release resources after the last worker exited
    fn close(&self) -> ProcessorResult<()> {
        Ok(())
    }
}

/// Create a registry with all built-in processors
///
/// Includes:
/// - `noop` - Pass-through
/// - `add_field` - Set a field on every event
/// - `drop_events` - Drop events matching a field test
/// - `sequence` - Per-instance numbering, single-threaded
pub fn create_default_registry() -> ProcessorRegistry {
    let mut registry = ProcessorRegistry::new();
    registry.register("noop", NoopFactory);
    registry.register("add_field", AddFieldFactory);
    registry.register("drop_events", DropEventsFactory);
    registry.register("sequence", SequenceFactory::default());
    registry
}
