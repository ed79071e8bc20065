//! Conduit - Sources
//!
//! Sources bring data into a pipeline: they build batches, optionally
//! register an acknowledgement set per submission, and write the batches
//! into the pipeline's buffer.
//!
//! # Available Sources
//!
//! - **in_memory** - Batches submitted programmatically through an
//!   [`InMemorySourceAccessor`]; reports acknowledgement outcomes back
//! - **stdin** - JSON lines from standard input
//!
//! # Design Principles
//!
//! - **Backpressure**: a full buffer blocks the source; writes retry until
//!   space frees up or the source is stopped
//! - **Acknowledgements**: one set per submission; the outcome is `true`,
//!   `false`, or never reported if the set expires
//! - **Cooperative stop**: every source task watches a cancellation token
//!
//! # Example
//!
//! ```ignore
//! let accessor = InMemorySourceAccessor::new();
//! let source = InMemorySource::new("in", "key", accessor.clone());
//! source.start(ctx).await?;
//!
//! accessor.submit("key", events);
//! ```

pub mod in_memory;
pub mod stdin;

mod common;
mod registry;

pub use common::{MetricsSnapshot, SourceContext, SourceError, SourceMetrics, SourceResult};
pub use in_memory::{InMemorySource, InMemorySourceAccessor, InMemorySourceFactory};
pub use registry::{SourceFactory, SourcePluginConfig, SourceRegistry};
pub use stdin::{StdinSource, StdinSourceFactory};

use async_trait::async_trait;

/// Input plugin contract
#[async_trait]
pub trait Source: Send + Sync {
    /// Instance name for logging and metrics
    fn name(&self) -> &str;

    /// Begin producing into `ctx.buffer`
    ///
    /// Spawns the source's tasks and returns once they are running.
    async fn start(&self, ctx: SourceContext) -> SourceResult<()>;

    /// Stop producing and wait for the source's tasks to exit
    async fn stop(&self);

    /// Point-in-time metrics, if the source keeps any
    fn metrics(&self) -> Option<MetricsSnapshot> {
        None
    }
}

/// Create a registry with the built-in sources that need no shared state
///
/// Includes `stdin`. Register `in_memory` with an [`InMemorySourceFactory`]
/// holding the accessor the caller submits through.
pub fn create_default_registry() -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    registry.register("stdin", StdinSourceFactory);
    registry
}
