//! Noop Processor - pass-through

use conduit_protocol::Batch;

use crate::{Processor, ProcessorFuture};


/// A processor that passes batches through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProcessor;

impl NoopProcessor {
    #[inline]
    pub const fn new() -> Self {
        Self
    }
}

impl Processor for NoopProcessor {
    fn execute<'a>(&'a self, batch: Batch) -> ProcessorFuture<'a> {
        Box::pin(async move { Ok(batch) })
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
