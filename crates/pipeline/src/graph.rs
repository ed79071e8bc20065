//! Pipeline graph - builds every pipeline of a configuration and runs them
//! as one unit
//!
//! Pipelines are connected through `pipeline` sinks that write into the
//! buffer of a downstream pipeline whose source is of type `pipeline`. The
//! graph is a DAG: it starts pipelines upstream-first and stops them in the
//! reverse order.
//!
//! # Supervision
//!
//! Once running, the graph watches its pipelines:
//!
//! - a pipeline stopped on its own (directly, or after a failure) takes
//!   every pipeline it is connected to down with it, downstream-first
//! - a buffer that stays full past `buffer_full_timeout` is fatal: every
//!   pipeline is stopped and [`PipelineGraph::failed`] resolves

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use conduit_acks::{AckMetricsSnapshot, AcknowledgementSetManager, ExpirySweeperHandle};
use conduit_buffer::{Buffer, ExhaustionSignal};
use conduit_config::{Config, GlobalConfig, PipelineConfig};
use conduit_routing::{ExpressionEvaluator, FieldEvaluator, Route};
use conduit_sinks::{Sink, SinkRegistry};
use conduit_sources::{Source, SourceRegistry};
use conduit_transform::{ProcessorChain, ProcessorConfig, ProcessorRegistry};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::connector::{ConnectorSource, PipelineConnector};
use crate::error::{PipelineError, Result};
use crate::metrics::MetricsSnapshot;
use crate::runtime::{PipelineRuntime, PipelineSettings};

/// Plugin factories used to build a graph
pub struct PluginRegistries {
    pub sources: SourceRegistry,
    pub processors: ProcessorRegistry,
    pub sinks: SinkRegistry,
    /// Evaluator for every pipeline's route conditions
    pub evaluator: Arc<dyn ExpressionEvaluator>,
}

impl PluginRegistries {
    /// Built-in plugins with the field evaluator
    pub fn with_defaults() -> Self {
        Self {
            sources: conduit_sources::create_default_registry(),
            processors: conduit_transform::create_default_registry(),
            sinks: conduit_sinks::create_default_registry(),
            evaluator: Arc::new(FieldEvaluator),
        }
    }
}

impl Default for PluginRegistries {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Every pipeline of a configuration, connected
pub struct PipelineGraph {
    /// Upstream-first
    pipelines: Vec<Arc<PipelineRuntime>>,
    index: HashMap<String, usize>,
    /// Per pipeline, every pipeline sharing its connected component, upstream-first
    connected: Vec<Vec<usize>>,
    acknowledgements: AcknowledgementSetManager,
    exhaustion: ExhaustionSignal,
    global: GlobalConfig,
    cancel: CancellationToken,
    /// Cancelled when the graph itself stops
    stopping: CancellationToken,
    sweeper: Mutex<Option<ExpirySweeperHandle>>,
    supervisors: Mutex<Vec<JoinHandle<()>>>,
}

impl PipelineGraph {
    /// Build every pipeline of `config`
    ///
    /// # Errors
    ///
    /// Fails on an invalid topology, an unknown plugin type or plugin
    /// options a factory rejects.
    pub fn from_config(config: &Config, registries: &PluginRegistries) -> Result<Self> {
        config.validate()?;
        let order = topological_order(&config.pipelines)?;
        let acknowledgements = AcknowledgementSetManager::new();
        let exhaustion = ExhaustionSignal::new();

        // Every buffer exists before any connector needs one
        let buffers: HashMap<&str, Buffer> = config
            .pipelines
            .iter()
            .map(|(name, p)| {
                (
                    name.as_str(),
                    Buffer::new(name.as_str(), config.buffer_capacity_for(p)),
                )
            })
            .collect();

        let mut pipelines = Vec::with_capacity(order.len());
        for name in &order {
            let pipeline = &config.pipelines[name.as_str()];
            let runtime = build_pipeline(
                name,
                pipeline,
                config,
                registries,
                &buffers,
                &acknowledgements,
                &exhaustion,
            )?;
            pipelines.push(Arc::new(runtime));
        }

        let connected = connected_components(&order, &config.pipelines);
        let index = order
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name, i))
            .collect();

        tracing::info!(
            pipelines = pipelines.len(),
            order = ?pipelines.iter().map(|p| p.name()).collect::<Vec<_>>(),
            "pipeline graph built"
        );

        Ok(Self {
            pipelines,
            index,
            connected,
            acknowledgements,
            exhaustion,
            global: config.global.clone(),
            cancel: CancellationToken::new(),
            stopping: CancellationToken::new(),
            sweeper: Mutex::new(None),
            supervisors: Mutex::new(Vec::new()),
        })
    }

    /// Start the expiry sweeper, then every pipeline upstream-first
    ///
    /// # Errors
    ///
    /// If a pipeline fails to start, the ones already started are stopped
    /// again and `StartupFailed` names the failing pipeline.
    pub async fn start(&self) -> Result<()> {
        {
            let mut sweeper = self.sweeper.lock();
            if sweeper.is_none() {
                *sweeper = Some(self.acknowledgements.spawn_sweeper(
                    self.global.expiry_sweep_interval,
                    self.cancel.child_token(),
                ));
            }
        }

        for (i, pipeline) in self.pipelines.iter().enumerate() {
            if let Err(e) = pipeline.start().await {
                tracing::error!(pipeline = %pipeline.name(), error = %e, "pipeline failed to start");
                pipeline.stop().await;
                for started in self.pipelines[..i].iter().rev() {
                    started.stop().await;
                }
                self.shutdown_sweeper().await;
                return Err(PipelineError::startup_failed(pipeline.name(), e));
            }
        }

        self.spawn_supervisors();
        tracing::info!(pipelines = self.pipelines.len(), "pipeline graph running");
        Ok(())
    }

    fn spawn_supervisors(&self) {
        let mut supervisors = self.supervisors.lock();

        for (i, pipeline) in self.pipelines.iter().enumerate() {
            // downstream-first
            let connected: Vec<Arc<PipelineRuntime>> = self.connected[i]
                .iter()
                .rev()
                .filter(|&&j| j != i)
                .map(|&j| Arc::clone(&self.pipelines[j]))
                .collect();
            if connected.is_empty() {
                continue;
            }
            let name = pipeline.name().to_string();
            let stopped = pipeline.stopping();
            let graph_stopping = self.stopping.clone();
            supervisors.push(tokio::spawn(async move {
                tokio::select! {
                    biased;
                    _ = graph_stopping.cancelled() => {}
                    _ = stopped.cancelled() => {
                        tracing::warn!(
                            pipeline = %name,
                            connected = ?connected.iter().map(|p| p.name()).collect::<Vec<_>>(),
                            "pipeline stopped, stopping connected pipelines"
                        );
                        for other in &connected {
                            other.stop().await;
                        }
                    }
                }
            }));
        }

        let pipelines = self.pipelines.clone();
        let exhaustion = self.exhaustion.clone();
        let graph_stopping = self.stopping.clone();
        supervisors.push(tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = graph_stopping.cancelled() => {}
                exhausted = exhaustion.raised() => {
                    tracing::error!(error = %exhausted, "fatal failure, stopping every pipeline");
                    for pipeline in pipelines.iter().rev() {
                        pipeline.stop().await;
                    }
                }
            }
        }));
    }

    /// Stop every pipeline downstream-first, then the sweeper
    pub async fn stop(&self) {
        tracing::info!(pipelines = self.pipelines.len(), "stopping pipeline graph");
        self.stopping.cancel();
        for pipeline in self.pipelines.iter().rev() {
            pipeline.stop().await;
        }
        let supervisors = std::mem::take(&mut *self.supervisors.lock());
        for supervisor in supervisors {
            if let Err(e) = supervisor.await {
                tracing::warn!(error = %e, "pipeline supervisor failed");
            }
        }
        self.shutdown_sweeper().await;

        let acks = self.acknowledgements.metrics();
        tracing::info!(
            ack_sets_created = acks.sets_created,
            ack_sets_acknowledged = acks.sets_acknowledged,
            ack_sets_failed = acks.sets_failed,
            ack_sets_expired = acks.sets_expired,
            ack_sets_pending = self.acknowledgements.pending_sets(),
            "pipeline graph stopped"
        );
    }

    async fn shutdown_sweeper(&self) {
        self.cancel.cancel();
        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.shutdown().await;
        }
    }

    /// The fatal failure that stopped the graph, if any
    pub fn failure(&self) -> Option<PipelineError> {
        self.exhaustion
            .get()
            .map(|exhausted| PipelineError::BufferExhausted(exhausted.clone()))
    }

    /// Resolve once a fatal failure has been escalated
    pub async fn failed(&self) -> PipelineError {
        PipelineError::BufferExhausted(self.exhaustion.raised().await)
    }

    pub fn pipeline(&self, name: &str) -> Option<&Arc<PipelineRuntime>> {
        self.index.get(name).map(|&i| &self.pipelines[i])
    }

    /// All pipelines, upstream-first
    pub fn pipelines(&self) -> &[Arc<PipelineRuntime>] {
        &self.pipelines
    }

    /// Pipeline names in start order
    pub fn start_order(&self) -> Vec<&str> {
        self.pipelines.iter().map(|p| p.name()).collect()
    }

    /// Hot swap the processors of one pipeline
    ///
    /// # Errors
    ///
    /// `UnknownPipeline` for a name not in the graph, otherwise whatever
    /// [`PipelineRuntime::swap_processors`] returns.
    pub fn swap_processors(
        &self,
        pipeline: &str,
        chain: ProcessorChain,
    ) -> Result<Arc<ProcessorChain>> {
        self.pipeline(pipeline)
            .ok_or_else(|| PipelineError::UnknownPipeline(pipeline.to_string()))?
            .swap_processors(chain)
    }

    /// The manager shared by every pipeline of the graph
    pub fn acknowledgements(&self) -> &AcknowledgementSetManager {
        &self.acknowledgements
    }

    pub fn ack_metrics(&self) -> AckMetricsSnapshot {
        self.acknowledgements.metrics()
    }

    /// Metrics of every pipeline, keyed by name
    pub fn metrics(&self) -> BTreeMap<String, MetricsSnapshot> {
        self.pipelines
            .iter()
            .map(|p| (p.name().to_string(), p.metrics()))
            .collect()
    }
}

impl std::fmt::Debug for PipelineGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineGraph")
            .field("pipelines", &self.start_order())
            .field("acknowledgements", &self.acknowledgements)
            .finish_non_exhaustive()
    }
}

fn build_pipeline(
    name: &str,
    pipeline: &PipelineConfig,
    config: &Config,
    registries: &PluginRegistries,
    buffers: &HashMap<&str, Buffer>,
    acknowledgements: &AcknowledgementSetManager,
    exhaustion: &ExhaustionSignal,
) -> Result<PipelineRuntime> {
    let settings = PipelineSettings::from_config(&config.global, pipeline);

    let source: Arc<dyn Source> = if pipeline.source.is_pipeline() {
        Arc::new(ConnectorSource::new(name))
    } else {
        registries.sources.create(
            &pipeline.source.plugin_type,
            name,
            &pipeline.source.options,
        )?
    };

    let processors: Vec<(&str, ProcessorConfig)> = pipeline
        .processors
        .iter()
        .map(|p| (p.plugin_type.as_str(), p.options.clone()))
        .collect();
    let chain = registries
        .processors
        .build_chain(&processors, settings.workers)?;

    let buffer = buffers
        .get(name)
        .cloned()
        .ok_or_else(|| PipelineError::UnknownPipeline(name.to_string()))?;

    let mut builder = PipelineRuntime::builder(name)
        .settings(settings.clone())
        .buffer(buffer)
        .source(source)
        .processors(chain)
        .evaluator(Arc::clone(&registries.evaluator))
        .exhaustion(exhaustion.clone());

    if pipeline.acknowledgements {
        builder = builder.acknowledgements(acknowledgements.clone());
    }
    for route in &pipeline.routes {
        builder = builder.route(Route::new(&route.name, &route.condition));
    }

    for (i, sink) in pipeline.sinks.iter().enumerate() {
        let sink_name = sink.display_name(i);
        let instance: Arc<dyn Sink> = if sink.is_pipeline() {
            let target = sink.pipeline.as_deref().unwrap_or_default();
            let target_buffer = buffers
                .get(target)
                .cloned()
                .ok_or_else(|| PipelineError::UnknownPipeline(target.to_string()))?;
            Arc::new(
                PipelineConnector::new(sink_name, target, target_buffer, acknowledgements.clone())
                    .with_ack_expiry(settings.ack_expiry)
                    .with_write_timeout(settings.write_timeout)
                    .with_exhaustion(settings.full_timeout, exhaustion.clone()),
            )
        } else {
            registries
                .sinks
                .create(&sink.sink_type, &sink_name, &sink.options)?
        };
        builder = builder.sink(instance, sink.routes.iter().map(String::as_str));
    }

    builder.build()
}

/// Kahn's algorithm over pipeline connections, ties broken by name
fn topological_order(pipelines: &BTreeMap<String, PipelineConfig>) -> Result<Vec<String>> {
    let mut indegree: BTreeMap<&str, usize> =
        pipelines.keys().map(|name| (name.as_str(), 0)).collect();
    for pipeline in pipelines.values() {
        for target in pipeline.downstream() {
            if let Some(degree) = indegree.get_mut(target) {
                *degree += 1;
            }
        }
    }

    let mut ready: VecDeque<&str> = indegree
        .iter()
        .filter(|&(_, &degree)| degree == 0)
        .map(|(&name, _)| name)
        .collect();
    let mut order = Vec::with_capacity(pipelines.len());

    while let Some(name) = ready.pop_front() {
        order.push(name.to_string());
        for target in pipelines[name].downstream() {
            if let Some(degree) = indegree.get_mut(target) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push_back(target);
                }
            }
        }
    }

    if order.len() != pipelines.len() {
        let stuck: Vec<&str> = indegree
            .into_iter()
            .filter(|&(_, degree)| degree > 0)
            .map(|(name, _)| name)
            .collect();
        return Err(PipelineError::Cycle(stuck.join(", ")));
    }
    Ok(order)
}

/// Group pipelines linked by connectors, in either direction
///
/// Returns, for each position of `order`, the positions of its group in
/// ascending (upstream-first) order.
fn connected_components(
    order: &[String],
    pipelines: &BTreeMap<String, PipelineConfig>,
) -> Vec<Vec<usize>> {
    fn root(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    let position: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();
    let mut parent: Vec<usize> = (0..order.len()).collect();
    for (name, pipeline) in pipelines {
        let Some(&from) = position.get(name.as_str()) else {
            continue;
        };
        for target in pipeline.downstream() {
            if let Some(&to) = position.get(target) {
                let (a, b) = (root(&mut parent, from), root(&mut parent, to));
                parent[a.max(b)] = a.min(b);
            }
        }
    }

    let roots: Vec<usize> = (0..order.len()).map(|i| root(&mut parent, i)).collect();
    roots
        .iter()
        .map(|r| (0..order.len()).filter(|&j| roots[j] == *r).collect())
        .collect()
}

#[cfg(test)]
#[path = "graph_test.rs"]
mod tests;
