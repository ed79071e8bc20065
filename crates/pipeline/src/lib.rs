//! Conduit Pipeline - runs pipelines and connects them into a graph
//!
//! # Architecture
//!
//! ```text
//!              ┌────────────────────── PipelineRuntime ───────────────────────┐
//! [Source] ──→ │ Buffer ──→ [Worker 0..N] ──→ ProcessorChain ──→ EventRouter ──┼──→ [Sink]
//!              │                                   ▲                          │──→ [Sink]
//!              │                         ArcSwap (hot swap)                   │──→ PipelineConnector ──→ downstream Buffer
//!              └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Design
//!
//! - **Bounded buffer**: sources and connectors block (with retries) when a
//!   pipeline falls behind
//! - **Worker affinity**: worker `i` always runs instance `i` of
//!   single-threaded processors
//! - **Hot swap**: the chain lives in an `ArcSwap`; each batch loads it once,
//!   so a batch never straddles two chains
//! - **End-to-end acknowledgements**: every record carries a lease on its
//!   source's acknowledgement set; connectors chain downstream sets to the
//!   upstream leases
//! - **Ordered lifecycle**: the graph starts upstream-first and stops
//!   downstream-first
//!
//! # Example
//!
//! ```ignore
//! use conduit_config::Config;
//! use conduit_pipeline::{PipelineGraph, PluginRegistries};
//!
//! let config: Config = std::fs::read_to_string("conduit.toml")?.parse()?;
//! let graph = PipelineGraph::from_config(&config, &PluginRegistries::with_defaults())?;
//! graph.start().await?;
//! tokio::signal::ctrl_c().await?;
//! graph.stop().await;
//! ```

mod connector;
mod error;
mod graph;
mod metrics;
mod runtime;
mod sink_stage;
mod state;
mod worker;

pub use connector::{ConnectorSource, PipelineConnector};
pub use error::{PipelineError, Result};
pub use graph::{PipelineGraph, PluginRegistries};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use runtime::{PipelineBuilder, PipelineRuntime, PipelineSettings};
pub use state::PipelineState;
pub use worker::ProcessorWorkerPool;
