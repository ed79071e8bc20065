//! Conduit Buffer - bounded queue between a producer and pipeline workers
//!
//! A `Buffer` carries whole batches from a source (or an upstream pipeline's
//! connector) to the worker loops of one pipeline.
//!
//! # Semantics
//!
//! - **Bounded** in batches; `write` waits for space, `write_timeout` gives
//!   up after a bound and hands the batch back
//! - **Multi-consumer**: any number of workers read concurrently; FIFO holds
//!   per reader only
//! - **Timed reads**: `read(timeout)` returns `None` on an empty wait so
//!   workers can re-check their stop signal
//! - **Shutdown** rejects further writes and releases leftover batches
//!   negatively
//! - **Exhaustion**: writers that give up on a buffer that stays full raise
//!   an [`ExhaustionSignal`]
//!
//! ```text
//! [Source] ─write─→ Buffer(capacity) ─read─→ worker 0..N
//! ```

mod buffer;
mod error;
mod exhaustion;

pub use buffer::{Buffer, BufferMetricsSnapshot};
pub use error::{BufferError, Result};
pub use exhaustion::{Exhaustion, ExhaustionSignal};

/// Default capacity in batches
pub const DEFAULT_CAPACITY: usize = 512;

/// Default total time a writer retries a full buffer
pub const DEFAULT_FULL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);
