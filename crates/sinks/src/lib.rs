//! Conduit - Sinks
//!
//! Output stage of a pipeline. A sink receives the records the router
//! selected for it and reports success or failure for the whole write.
//!
//! # Acknowledgements
//!
//! Sinks normally never touch acknowledgement leases. The pipeline takes
//! each record's lease before calling [`Sink::output`] and releases it with
//! the outcome: positive on `Ok`, negative on `Err`. A sink that forwards
//! records somewhere that completes acknowledgements later (another
//! pipeline) opts out with [`Sink::manages_acknowledgements`] and receives
//! the records with their leases attached.
//!
//! ```text
//! [Router] --Vec<Record>--> [Sink::output] --Ok/Err--> release leases
//! ```
//!
//! # Available Sinks
//!
//! | Sink | Purpose |
//! |------|---------|
//! | `null` | Discard everything (benchmarks) |
//! | `stdout` | JSON lines on standard output |
//! | `in_memory` | Store events for inspection in tests |

// =============================================================================
// Sink implementations (each in its own submodule)
// =============================================================================

/// Null sink - discards all data
pub mod null;

/// Stdout sink - JSON lines output
pub mod stdout;

/// In-memory sink - stores events for tests
pub mod in_memory;

// =============================================================================
// Shared types
// =============================================================================

mod common;
mod registry;

pub use common::{MetricsSnapshot, SinkError, SinkMetrics, SinkResult};
pub use in_memory::{InMemorySink, InMemorySinkAccessor, InMemorySinkFactory};
pub use null::{NullSink, NullSinkFactory};
pub use registry::{SinkFactory, SinkPluginConfig, SinkRegistry};
pub use stdout::{StdoutSink, StdoutSinkFactory};

use async_trait::async_trait;
use conduit_protocol::Record;

/// Output plugin contract
#[async_trait]
pub trait Sink: Send + Sync {
    /// Instance name for logging and metrics
    fn name(&self) -> &str;

    /// Prepare the sink (open connections, files)
    ///
    /// Called repeatedly until [`is_ready`](Self::is_ready) reports true.
    async fn initialize(&self) -> SinkResult<()> {
        Ok(())
    }

    /// Whether the sink can accept output
    fn is_ready(&self) -> bool {
        true
    }

    /// Write records
    ///
    /// An error fails every record of this call.
    async fn output(&self, records: Vec<Record>) -> SinkResult<()>;

    /// Whether the sink releases acknowledgement leases itself
    fn manages_acknowledgements(&self) -> bool {
        false
    }

    /// Flush and release resources after the last worker exited
    async fn close(&self) -> SinkResult<()> {
        Ok(())
    }

    /// Point-in-time metrics, if the sink keeps any
    fn metrics(&self) -> Option<MetricsSnapshot> {
        None
    }
}

/// Create a registry with the built-in sinks that need no shared state
///
/// Includes `null` and `stdout`. Register `in_memory` with an
/// [`InMemorySinkFactory`] holding the accessor the caller inspects.
pub fn create_default_registry() -> SinkRegistry {
    let mut registry = SinkRegistry::new();
    registry.register("null", NullSinkFactory);
    registry.register("stdout", StdoutSinkFactory);
    registry
}
