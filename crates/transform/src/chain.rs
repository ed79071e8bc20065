//! Processor Chain - ordered processors executed per worker
//!
//! # Design
//!
//! - **Slots**: each position in the chain is either one shared instance or
//!   one instance per worker
//! - **Sequential execution**: processors run in order, each receiving the
//!   output of the previous
//! - **Fail-fast**: the first error stops the chain and fails the batch
//! - **Immutable**: a chain is never edited after construction; hot swap
//!   replaces the whole chain

use std::sync::Arc;

use conduit_protocol::Batch;

use crate::{Processor, ProcessorError, ProcessorResult};

#[cfg(test)]
#[path = "chain_test.rs"]
mod tests;

/// One position in a processor chain
#[derive(Clone)]
pub enum ProcessorSlot {
    /// Thread-safe processor shared by every worker
    Shared(Arc<dyn Processor>),
    /// Single-threaded processor: index `i` belongs to worker `i`
    PerWorker(Vec<Arc<dyn Processor>>),
}

impl ProcessorSlot {
    /// Instance to run on a worker
    fn for_worker(&self, worker: usize) -> ProcessorResult<&Arc<dyn Processor>> {
        match self {
            Self::Shared(processor) => Ok(processor),
            Self::PerWorker(instances) => {
                instances.get(worker).ok_or(ProcessorError::NoInstance {
                    processor: self.name(),
                    worker,
                })
            }
        }
    }

    /// Name of the processor in this slot
    pub fn name(&self) -> &'static str {
        match self {
            Self::Shared(processor) => processor.name(),
            Self::PerWorker(instances) => instances.first().map_or("unknown", |p| p.name()),
        }
    }

    /// Whether the slot pins one instance per worker
    #[inline]
    pub fn is_per_worker(&self) -> bool {
        matches!(self, Self::PerWorker(_))
    }

    /// Every instance held by the slot
    pub fn instances(&self) -> &[Arc<dyn Processor>] {
        match self {
            Self::Shared(processor) => std::slice::from_ref(processor),
            Self::PerWorker(instances) => instances,
        }
    }
}

impl std::fmt::Debug for ProcessorSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shared(p) => write!(f, "Shared({})", p.name()),
            Self::PerWorker(instances) => {
                write!(f, "PerWorker({} x{})", self.name(), instances.len())
            }
        }
    }
}

/// Chain of processors applied sequentially
///
/// Built for a fixed number of workers. Per-worker slots must hold exactly
/// that many instances.
#[derive(Debug, Clone)]
pub struct ProcessorChain {
    slots: Vec<ProcessorSlot>,
    workers: usize,
}

impl ProcessorChain {
    /// Create a chain for `workers` workers
    pub fn new(slots: Vec<ProcessorSlot>, workers: usize) -> ProcessorResult<Self> {
        for slot in &slots {
            if let ProcessorSlot::PerWorker(instances) = slot
                && instances.len() != workers
            {
                return Err(ProcessorError::WorkerCountMismatch {
                    processor: slot.name(),
                    expected: workers,
                    actual: instances.len(),
                });
            }
        }
        Ok(Self { slots, workers })
    }

    /// Create an empty chain (batches pass through unchanged)
    pub fn empty(workers: usize) -> Self {
        Self {
            slots: Vec::new(),
            workers,
        }
    }

    /// Number of workers this chain was built for
    #[inline]
    pub fn worker_count(&self) -> usize {
        self.workers
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[ProcessorSlot] {
        &self.slots
    }

    /// Names of the processors in order
    pub fn names(&self) -> Vec<&'static str> {
        self.slots.iter().map(ProcessorSlot::name).collect()
    }

    /// Every processor instance, shared ones once
    pub fn processors(&self) -> impl Iterator<Item = &Arc<dyn Processor>> {
        self.slots.iter().flat_map(ProcessorSlot::instances)
    }

    /// Run a batch through the chain on behalf of `worker`
    ///
    /// If any processor fails, the chain stops immediately and returns the
    /// error wrapped with the processor's name. The batch is consumed.
    pub async fn execute(&self, worker: usize, batch: Batch) -> ProcessorResult<Batch> {
        let mut current = batch;
        for slot in &self.slots {
            let processor = slot.for_worker(worker)?;
            current = processor
                .execute(current)
                .await
                .map_err(|e| ProcessorError::chain(processor.name(), e))?;
        }
        Ok(current)
    }

    /// Signal every processor that shutdown has begun
    pub fn prepare_for_shutdown(&self) {
        for processor in self.processors() {
            processor.prepare_for_shutdown();
        }
    }

    /// Whether every processor is ready to shut down
    pub fn is_ready_for_shutdown(&self) -> bool {
        self.processors().all(|p| p.is_ready_for_shutdown())
    }

    /// Close every processor
    ///
    /// All processors are closed even if some fail; the first error is
    /// returned.
    pub fn close(&self) -> ProcessorResult<()> {
        let mut first_error = None;
        for processor in self.processors() {
            if let Err(e) = processor.close() {
                tracing::warn!(processor = processor.name(), error = %e, "processor close failed");
                first_error.get_or_insert(ProcessorError::chain(processor.name(), e));
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
