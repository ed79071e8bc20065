//! Processor worker pool
//!
//! `workers` independent loops share one buffer. Each iteration reads a
//! batch, loads the current processor chain once, runs the batch through
//! it, routes the result and waits for the sink stage.
//!
//! # Hot swap
//!
//! The chain lives behind an [`ArcSwap`]. A worker takes a full snapshot at
//! the top of each iteration, so a batch always runs against exactly one
//! chain; a swap becomes visible at the next read without pausing anyone.
//!
//! # Single-thread affinity
//!
//! Worker `i` always calls instance `i` of a per-worker processor slot. The
//! worker index is fixed for the life of the loop.
//!
//! # Failures
//!
//! A chain that errors or panics fails the records of that batch only; the
//! worker moves on to the next batch unless `stop_on_processor_error` is set.
//!
//! # Shutdown
//!
//! `stop` asks workers to exit once the buffer is empty and every processor
//! reports ready; `force` makes them exit after the batch in hand.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use conduit_acks::EventHandle;
use conduit_buffer::Buffer;
use conduit_protocol::Batch;
use conduit_routing::EventRouter;
use conduit_transform::ProcessorChain;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::metrics::PipelineMetrics;
use crate::sink_stage::SinkStage;

/// Everything a worker loop reads
pub(crate) struct WorkerContext {
    pub(crate) pipeline: Arc<str>,
    pub(crate) buffer: Buffer,
    pub(crate) chain: Arc<ArcSwap<ProcessorChain>>,
    pub(crate) router: Arc<EventRouter>,
    pub(crate) sinks: Arc<SinkStage>,
    pub(crate) metrics: Arc<PipelineMetrics>,
    pub(crate) read_timeout: Duration,
    pub(crate) stop_on_processor_error: bool,
}

/// Fixed-size pool of worker loops
pub struct ProcessorWorkerPool {
    pipeline: Arc<str>,
    handles: Vec<JoinHandle<()>>,
    stop: CancellationToken,
    force: CancellationToken,
}

impl ProcessorWorkerPool {
    /// Spawn `workers` loops over `ctx`
    pub(crate) fn start(ctx: Arc<WorkerContext>, workers: usize) -> Self {
        let stop = CancellationToken::new();
        let force = CancellationToken::new();
        let handles = (0..workers)
            .map(|worker_id| {
                let worker = Worker {
                    id: worker_id,
                    ctx: Arc::clone(&ctx),
                    stop: stop.clone(),
                    force: force.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        tracing::debug!(pipeline = %ctx.pipeline, workers, "worker pool started");
        Self {
            pipeline: Arc::clone(&ctx.pipeline),
            handles,
            stop,
            force,
        }
    }

    /// Number of spawned workers
    #[inline]
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Workers that have not exited yet
    pub fn active_workers(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Drain the buffer and wait for every worker
    ///
    /// Workers still running after `timeout` are told to exit after their
    /// current batch and are then awaited; a processor is never interrupted
    /// mid-call. Returns false if the timeout was hit.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        self.stop.cancel();
        let deadline = tokio::time::Instant::now() + timeout;
        let mut drained = true;

        for (worker_id, mut handle) in self.handles.into_iter().enumerate() {
            let joined = if drained {
                match tokio::time::timeout_at(deadline, &mut handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        tracing::warn!(
                            pipeline = %self.pipeline,
                            timeout_ms = timeout.as_millis() as u64,
                            "workers did not drain in time, forcing exit"
                        );
                        drained = false;
                        self.force.cancel();
                        handle.await
                    }
                }
            } else {
                handle.await
            };

            if let Err(e) = joined {
                tracing::error!(pipeline = %self.pipeline, worker_id, error = %e, "worker task failed");
            }
        }
        drained
    }
}

struct Worker {
    id: usize,
    ctx: Arc<WorkerContext>,
    stop: CancellationToken,
    force: CancellationToken,
}

impl Worker {
    async fn run(self) {
        tracing::debug!(pipeline = %self.ctx.pipeline, worker_id = self.id, "worker started");

        loop {
            if self.force.is_cancelled() {
                break;
            }
            let stopping = self.stop.is_cancelled();
            if stopping && self.ctx.buffer.is_empty() && self.ctx.chain.load().is_ready_for_shutdown() {
                break;
            }

            let read = tokio::select! {
                _ = self.force.cancelled() => break,
                read = self.ctx.buffer.read(self.ctx.read_timeout) => read,
            };
            let batch = match read {
                Some(batch) => batch,
                // Give processors holding records a chance to flush
                None if stopping => Batch::new(),
                None => continue,
            };

            if !self.process(batch).await && self.ctx.stop_on_processor_error {
                tracing::error!(
                    pipeline = %self.ctx.pipeline,
                    worker_id = self.id,
                    "worker exiting after processor failure"
                );
                break;
            }
        }

        tracing::debug!(pipeline = %self.ctx.pipeline, worker_id = self.id, "worker exited");
    }

    /// Run one batch end to end; false if the processor chain failed
    async fn process(&self, batch: Batch) -> bool {
        let ctx = &self.ctx;
        let chain = ctx.chain.load_full();
        let input = batch.len();
        if input > 0 {
            ctx.metrics.record_read(input);
        }

        // Guards fail every record if the chain errors or panics
        let guards: Vec<EventHandle> = batch
            .iter()
            .filter_map(|record| record.handle().map(EventHandle::acquire_guard))
            .collect();

        let executed = AssertUnwindSafe(chain.execute(self.id, batch))
            .catch_unwind()
            .await;
        let output = match executed {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::warn!(
                    pipeline = %ctx.pipeline,
                    worker_id = self.id,
                    processor = e.processor().unwrap_or("unknown"),
                    records = input,
                    error = %e,
                    "processor chain failed, batch dropped"
                );
                self.fail(&guards);
                return false;
            }
            Err(panic) => {
                tracing::error!(
                    pipeline = %ctx.pipeline,
                    worker_id = self.id,
                    records = input,
                    panic = panic_message(panic.as_ref()),
                    "processor panicked, batch dropped"
                );
                self.fail(&guards);
                return false;
            }
        };

        for guard in &guards {
            guard.release(true);
        }
        ctx.metrics.record_processed(input, output.len());
        if output.is_empty() {
            return true;
        }

        tracing::trace!(
            pipeline = %ctx.pipeline,
            worker_id = self.id,
            records = output.len(),
            "batch processed"
        );
        let routed = ctx.router.route(output);
        ctx.metrics.record_unrouted(routed.unrouted());
        ctx.sinks.dispatch(routed).await;
        true
    }

    fn fail(&self, guards: &[EventHandle]) {
        self.ctx.metrics.record_processor_failure();
        for guard in guards {
            guard.release(false);
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
#[path = "worker_test.rs"]
mod tests;
