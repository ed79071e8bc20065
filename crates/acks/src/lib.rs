//! Conduit - Acknowledgements
//!
//! End-to-end delivery confirmation for batches flowing through pipelines.
//!
//! # Model
//!
//! A source that wants to know whether its data made it out the other end
//! creates an [`AcknowledgementSet`] per submission and attaches one
//! [`EventHandle`] to each record. Every downstream consumer (sink, processor
//! that drops records, sub-pipeline) releases the handle it owns exactly once,
//! positively or negatively. When the last handle of a sealed set is
//! released, the set's completion callback fires once:
//!
//! - `true` when every record was released positively
//! - `false` as soon as any consumer releases negatively (short-circuit)
//! - never, if the set outlives its expiry (the source sees "absent")
//!
//! ```text
//! [Source] ──create──→ AcknowledgementSet ──add──→ EventHandle per record
//!                                                     │ acquire (fan-out)
//!                                              ┌──────┼──────┐
//!                                           [Sink A] [Sink B] [Sub-pipeline set]
//!                                              └──release──┴──────┘
//!                                                     ↓
//!                                        completion(true | false)
//! ```
//!
//! # Concurrency
//!
//! The set table is a `DashMap`; each set guards its pending-record counts
//! with its own `parking_lot::Mutex`, so releases for different sets never
//! contend. Callbacks run on the thread performing the final release, outside
//! of any lock.

mod error;
mod handle;
mod manager;
mod metrics;
mod set;
mod sweeper;

pub use error::{AckError, Result};
pub use handle::EventHandle;
pub use manager::AcknowledgementSetManager;
pub use metrics::{AckMetrics, AckMetricsSnapshot};
pub use set::{AckSetId, AcknowledgementSet};
pub use sweeper::{ExpirySweeper, ExpirySweeperHandle};

use std::time::Duration;

/// Default lifetime of an acknowledgement set before it is discarded
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(30);

/// Default interval between expiry sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Completion callback invoked once with the aggregated result
pub type CompletionCallback = Box<dyn FnOnce(bool) + Send + 'static>;
