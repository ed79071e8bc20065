//! Pipeline runtime - one pipeline's buffer, workers, router and sinks
//!
//! # Lifecycle
//!
//! - `start`: waits for every sink to report ready, spawns the worker pool
//!   with the configured chain, then starts the source
//! - `swap_processors`: atomically publishes a new chain; batches already
//!   taken finish on the old one
//! - `stop`: stops the source, drains the buffer through the workers,
//!   discards what is left (failing it), closes processors and sinks
//!
//! [`PipelineRuntime::stopping`] lets an owner observe a stop no matter who
//! initiated it; the graph uses it to stop connected pipelines together.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use conduit_acks::AcknowledgementSetManager;
use conduit_buffer::{Buffer, ExhaustionSignal};
use conduit_config::{GlobalConfig, PipelineConfig};
use conduit_routing::{EventRouter, ExpressionEvaluator, FieldEvaluator, Route};
use conduit_sinks::{MetricsSnapshot as SinkMetricsSnapshot, Sink};
use conduit_sources::{Source, SourceContext};
use conduit_transform::ProcessorChain;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, Result};
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::sink_stage::SinkStage;
use crate::state::{PipelineState, StateCell};
use crate::worker::{ProcessorWorkerPool, WorkerContext};

/// Interval between sink readiness checks during start
const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Tunables of one pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub workers: usize,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub full_timeout: Duration,
    pub ack_expiry: Duration,
    pub drain_timeout: Duration,
    pub processor_shutdown_timeout: Duration,
    pub sink_shutdown_timeout: Duration,
    pub stop_on_processor_error: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_global(&GlobalConfig::default())
    }
}

impl PipelineSettings {
    fn from_global(global: &GlobalConfig) -> Self {
        Self {
            workers: global.workers,
            read_timeout: global.read_timeout,
            write_timeout: global.write_timeout,
            full_timeout: global.buffer_full_timeout,
            ack_expiry: global.acknowledgement_expiry,
            drain_timeout: global.drain_timeout,
            processor_shutdown_timeout: global.processor_shutdown_timeout,
            sink_shutdown_timeout: global.sink_shutdown_timeout,
            stop_on_processor_error: false,
        }
    }

    /// Settings for `pipeline`, falling back to `global`
    pub fn from_config(global: &GlobalConfig, pipeline: &PipelineConfig) -> Self {
        Self {
            workers: pipeline.workers.unwrap_or(global.workers),
            stop_on_processor_error: pipeline.stop_on_processor_error,
            ..Self::from_global(global)
        }
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// Assembles a [`PipelineRuntime`]
pub struct PipelineBuilder {
    name: String,
    settings: PipelineSettings,
    buffer: Option<Buffer>,
    source: Option<Arc<dyn Source>>,
    chain: Option<ProcessorChain>,
    routes: Vec<Route>,
    sinks: Vec<(Arc<dyn Sink>, Vec<String>)>,
    evaluator: Option<Arc<dyn ExpressionEvaluator>>,
    acknowledgements: AcknowledgementSetManager,
    exhaustion: ExhaustionSignal,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: PipelineSettings::default(),
            buffer: None,
            source: None,
            chain: None,
            routes: Vec::new(),
            sinks: Vec::new(),
            evaluator: None,
            acknowledgements: AcknowledgementSetManager::inactive(),
            exhaustion: ExhaustionSignal::new(),
        }
    }

    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use an existing buffer (one upstream connectors already write to)
    pub fn buffer(mut self, buffer: Buffer) -> Self {
        self.buffer = Some(buffer);
        self
    }

    pub fn source(mut self, source: Arc<dyn Source>) -> Self {
        self.source = Some(source);
        self
    }

    /// Initial processor chain; must be built for `settings.workers`
    pub fn processors(mut self, chain: ProcessorChain) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Add a sink subscribed to `routes` (empty receives everything)
    pub fn sink<S: Into<String>>(
        mut self,
        sink: Arc<dyn Sink>,
        routes: impl IntoIterator<Item = S>,
    ) -> Self {
        self.sinks
            .push((sink, routes.into_iter().map(Into::into).collect()));
        self
    }

    /// Route condition evaluator; defaults to [`FieldEvaluator`]
    pub fn evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Manager the source registers acknowledgement sets with
    ///
    /// Leave unset (inactive) to run without acknowledgements.
    pub fn acknowledgements(mut self, manager: AcknowledgementSetManager) -> Self {
        self.acknowledgements = manager;
        self
    }

    /// Signal the source raises when the buffer stays full too long
    pub fn exhaustion(mut self, signal: ExhaustionSignal) -> Self {
        self.exhaustion = signal;
        self
    }

    pub fn build(self) -> Result<PipelineRuntime> {
        let name: Arc<str> = Arc::from(self.name.as_str());
        let workers = self.settings.workers;
        if workers == 0 {
            return Err(PipelineError::build(&self.name, "at least one worker is required"));
        }
        let source = self
            .source
            .ok_or_else(|| PipelineError::build(&self.name, "no source configured"))?;
        if self.sinks.is_empty() {
            return Err(PipelineError::build(&self.name, "no sinks configured"));
        }

        let chain = self.chain.unwrap_or_else(|| ProcessorChain::empty(workers));
        if chain.worker_count() != workers {
            return Err(PipelineError::WorkerCountMismatch {
                pipeline: self.name,
                expected: workers,
                actual: chain.worker_count(),
            });
        }

        let mut router = EventRouter::builder();
        for route in self.routes {
            router.add_route(route)?;
        }
        let mut sinks = Vec::with_capacity(self.sinks.len());
        for (sink, routes) in self.sinks {
            router.register_sink(sink.name(), &routes)?;
            sinks.push(sink);
        }
        let evaluator = self
            .evaluator
            .unwrap_or_else(|| Arc::new(FieldEvaluator) as Arc<dyn ExpressionEvaluator>);
        let router = Arc::new(router.build(evaluator));

        let metrics = Arc::new(PipelineMetrics::new());
        let sinks = Arc::new(SinkStage::new(
            Arc::clone(&name),
            sinks,
            Arc::clone(&metrics),
        ));
        let buffer = self
            .buffer
            .unwrap_or_else(|| Buffer::new(self.name.as_str(), conduit_buffer::DEFAULT_CAPACITY));

        Ok(PipelineRuntime {
            name,
            settings: self.settings,
            state: StateCell::new(PipelineState::Created),
            buffer,
            source,
            chain: Arc::new(ArcSwap::from_pointee(chain)),
            router,
            sinks,
            acknowledgements: self.acknowledgements,
            exhaustion: self.exhaustion,
            metrics,
            startup: CancellationToken::new(),
            source_cancel: CancellationToken::new(),
            stopping: CancellationToken::new(),
            stopped: CancellationToken::new(),
            pool: Mutex::new(None),
        })
    }
}

/// A running (or runnable) pipeline
pub struct PipelineRuntime {
    name: Arc<str>,
    settings: PipelineSettings,
    state: StateCell,
    buffer: Buffer,
    source: Arc<dyn Source>,
    chain: Arc<ArcSwap<ProcessorChain>>,
    router: Arc<EventRouter>,
    sinks: Arc<SinkStage>,
    acknowledgements: AcknowledgementSetManager,
    exhaustion: ExhaustionSignal,
    metrics: Arc<PipelineMetrics>,
    /// Aborts a start still waiting for sinks
    startup: CancellationToken,
    source_cancel: CancellationToken,
    stopping: CancellationToken,
    stopped: CancellationToken,
    pool: Mutex<Option<ProcessorWorkerPool>>,
}

impl PipelineRuntime {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn state(&self) -> PipelineState {
        self.state.load()
    }

    #[inline]
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    #[inline]
    pub fn worker_count(&self) -> usize {
        self.settings.workers
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// The chain the next batch will run through
    pub fn processors(&self) -> Arc<ProcessorChain> {
        self.chain.load_full()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn exhaustion(&self) -> &ExhaustionSignal {
        &self.exhaustion
    }

    /// Cancelled as soon as a stop begins, whoever called it
    pub fn stopping(&self) -> CancellationToken {
        self.stopping.clone()
    }

    /// Per-sink metrics, in sink order
    pub fn sink_metrics(&self) -> Vec<(String, Option<SinkMetricsSnapshot>)> {
        self.sinks
            .sinks()
            .iter()
            .map(|s| (s.name().to_string(), s.metrics()))
            .collect()
    }

    /// Start sinks, workers and source
    ///
    /// # Errors
    ///
    /// Fails with `InvalidState` unless the pipeline was just created, and
    /// with `SinkNotReady` if the pipeline is stopped while sinks are still
    /// initialising. A source that fails to start leaves the pipeline
    /// running without input; the caller is expected to stop it.
    pub async fn start(&self) -> Result<()> {
        self.state
            .transition(PipelineState::Created, PipelineState::Started)
            .map_err(|state| PipelineError::invalid_state(self.name(), "start", state))?;

        tracing::info!(
            pipeline = %self.name,
            workers = self.settings.workers,
            processors = ?self.chain.load().names(),
            routes = self.router.routes().len(),
            sinks = self.sinks.sinks().len(),
            "starting pipeline"
        );

        self.wait_for_sinks().await?;

        let ctx = Arc::new(WorkerContext {
            pipeline: Arc::clone(&self.name),
            buffer: self.buffer.clone(),
            chain: Arc::clone(&self.chain),
            router: Arc::clone(&self.router),
            sinks: Arc::clone(&self.sinks),
            metrics: Arc::clone(&self.metrics),
            read_timeout: self.settings.read_timeout,
            stop_on_processor_error: self.settings.stop_on_processor_error,
        });
        *self.pool.lock() = Some(ProcessorWorkerPool::start(ctx, self.settings.workers));

        if let Err(state) = self
            .state
            .transition(PipelineState::Started, PipelineState::Running)
        {
            // stopped while starting: the stop may have missed the pool
            let pool = self.pool.lock().take();
            if let Some(pool) = pool {
                pool.shutdown(Duration::ZERO).await;
            }
            return Err(PipelineError::invalid_state(self.name(), "start", state));
        }

        self.source
            .start(SourceContext {
                pipeline: self.name.to_string(),
                buffer: self.buffer.clone(),
                acknowledgements: self.acknowledgements.clone(),
                ack_expiry: self.settings.ack_expiry,
                write_timeout: self.settings.write_timeout,
                full_timeout: self.settings.full_timeout,
                exhaustion: self.exhaustion.clone(),
                cancel: self.source_cancel.clone(),
            })
            .await?;

        if self.source_cancel.is_cancelled() {
            // stopped while the source was starting; its stop may have run first
            self.source.stop().await;
            return Err(PipelineError::invalid_state(self.name(), "start", self.state()));
        }

        tracing::info!(pipeline = %self.name, "pipeline running");
        Ok(())
    }

    async fn wait_for_sinks(&self) -> Result<()> {
        let started = tokio::time::Instant::now();
        for sink in self.sinks.sinks() {
            loop {
                if sink.is_ready() {
                    break;
                }
                if let Err(e) = sink.initialize().await {
                    tracing::warn!(pipeline = %self.name, sink = %sink.name(), error = %e, "sink initialization failed, retrying");
                }
                if sink.is_ready() {
                    break;
                }
                tokio::select! {
                    _ = self.startup.cancelled() => {
                        return Err(PipelineError::SinkNotReady {
                            pipeline: self.name.to_string(),
                            sink: sink.name().to_string(),
                            waited: started.elapsed(),
                        });
                    }
                    _ = tokio::time::sleep(READINESS_POLL_INTERVAL) => {}
                }
            }
        }
        Ok(())
    }

    /// Replace the processor chain of a running pipeline
    ///
    /// Returns the previous chain. Batches already taken by a worker finish
    /// on it; every batch read afterwards uses `chain`. The caller owns the
    /// old processors and may close them once it no longer needs them.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the pipeline is running, `WorkerCountMismatch`
    /// if `chain` was built for a different number of workers.
    pub fn swap_processors(&self, chain: ProcessorChain) -> Result<Arc<ProcessorChain>> {
        self.state
            .transition(PipelineState::Running, PipelineState::Swapping)
            .map_err(|state| PipelineError::invalid_state(self.name(), "swap processors", state))?;

        if chain.worker_count() != self.settings.workers {
            self.state.store(PipelineState::Running);
            return Err(PipelineError::WorkerCountMismatch {
                pipeline: self.name.to_string(),
                expected: self.settings.workers,
                actual: chain.worker_count(),
            });
        }

        let names = chain.names();
        let previous = self.chain.swap(Arc::new(chain));
        self.metrics.record_swap();
        self.state.store(PipelineState::Running);

        tracing::info!(
            pipeline = %self.name,
            previous = ?previous.names(),
            processors = ?names,
            "processor chain swapped"
        );
        Ok(previous)
    }

    /// Stop the pipeline
    ///
    /// Idempotent; a second call waits for the first to finish. Stopping a
    /// pipeline that never started only closes its buffer. In-flight
    /// batches are drained for up to
    /// `drain_timeout + processor_shutdown_timeout`.
    pub async fn stop(&self) {
        let previous = loop {
            let current = self.state.load();
            match current {
                PipelineState::Stopping | PipelineState::Stopped => {
                    self.stopped.cancelled().await;
                    return;
                }
                PipelineState::Swapping => tokio::task::yield_now().await,
                _ => {
                    if self
                        .state
                        .transition(current, PipelineState::Stopping)
                        .is_ok()
                    {
                        break current;
                    }
                }
            }
        };

        tracing::info!(
            pipeline = %self.name,
            buffered = self.buffer.len(),
            drain_timeout_ms = self.settings.drain_timeout.as_millis() as u64,
            "stopping pipeline"
        );
        self.stopping.cancel();
        self.startup.cancel();

        self.source_cancel.cancel();
        if previous != PipelineState::Created {
            self.source.stop().await;
        }

        let chain = self.chain.load_full();
        chain.prepare_for_shutdown();

        let pool = self.pool.lock().take();
        if let Some(pool) = pool {
            let timeout = self.settings.drain_timeout + self.settings.processor_shutdown_timeout;
            pool.shutdown(timeout).await;
        }

        let discarded = self.buffer.shutdown();
        if discarded > 0 {
            tracing::warn!(pipeline = %self.name, batches = discarded, "undrained batches failed");
        }

        if let Err(e) = self.chain.load().close() {
            tracing::warn!(pipeline = %self.name, error = %e, "processor close failed");
        }

        for sink in self.sinks.sinks() {
            match tokio::time::timeout(self.settings.sink_shutdown_timeout, sink.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(pipeline = %self.name, sink = %sink.name(), error = %e, "sink close failed")
                }
                Err(_) => {
                    tracing::warn!(pipeline = %self.name, sink = %sink.name(), "sink close timed out")
                }
            }
        }

        self.state.store(PipelineState::Stopped);
        self.stopped.cancel();

        let m = self.metrics.snapshot();
        tracing::info!(
            pipeline = %self.name,
            records_read = m.records_read,
            records_processed = m.records_processed,
            records_dropped = m.records_dropped,
            records_unrouted = m.records_unrouted,
            records_written = m.records_written,
            processor_failures = m.processor_failures,
            sink_failures = m.sink_failures,
            swaps = m.swaps,
            "pipeline stopped"
        );
    }
}

impl std::fmt::Debug for PipelineRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRuntime")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("workers", &self.settings.workers)
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "runtime_test.rs"]
mod tests;
