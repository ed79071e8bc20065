//! Escalation of buffers that stay full
//!
//! Writers retry a full buffer for a bounded total time. A writer that runs
//! out of time fails its batch and raises the shared [`ExhaustionSignal`];
//! whoever owns the signal treats the condition as fatal.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// A writer gave up on a buffer that never freed a slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhaustion {
    /// Buffer that stayed full
    pub buffer: String,
    /// Source or connector that was writing
    pub writer: String,
    /// Total time spent retrying
    pub waited: Duration,
    /// Records in the failed batch
    pub records: usize,
}

impl fmt::Display for Exhaustion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "buffer '{}' stayed full for {:?}, '{}' failed {} records",
            self.buffer, self.waited, self.writer, self.records
        )
    }
}

/// Raised by the first writer that gives up on a full buffer
///
/// Cheap to clone; clones share one signal. Later raises are logged and
/// otherwise ignored.
#[derive(Debug, Clone, Default)]
pub struct ExhaustionSignal {
    token: CancellationToken,
    first: Arc<OnceLock<Exhaustion>>,
}

impl ExhaustionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self, exhaustion: Exhaustion) {
        tracing::error!(
            buffer = %exhaustion.buffer,
            writer = %exhaustion.writer,
            waited_ms = exhaustion.waited.as_millis() as u64,
            records = exhaustion.records,
            "buffer exhausted"
        );
        let _ = self.first.set(exhaustion);
        self.token.cancel();
    }

    #[inline]
    pub fn is_raised(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The first exhaustion reported, if any
    pub fn get(&self) -> Option<&Exhaustion> {
        self.first.get()
    }

    /// Wait until the signal is raised
    pub async fn raised(&self) -> Exhaustion {
        self.token.cancelled().await;
        // set before the token is cancelled
        self.first.wait().clone()
    }
}
