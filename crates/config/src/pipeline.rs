//! Pipeline model
//!
//! One `[pipelines.<name>]` table per pipeline. Plugin tables carry a
//! `type` key; every other key is passed to the plugin factory untouched.

use std::collections::HashMap;

use serde::Deserialize;

/// Plugin type naming a connection between two pipelines
///
/// As a sink it forwards into the pipeline named by `pipeline`; as a
/// source it marks a pipeline fed only by upstream pipelines.
pub const PIPELINE_PLUGIN: &str = "pipeline";

/// Route name a sink subscribes to for events that matched no route
pub const DEFAULT_ROUTE: &str = "_default";

/// Options passed through to a plugin factory
pub type PluginOptions = HashMap<String, toml::Value>;

/// A source or processor declaration
#[derive(Debug, Clone, Deserialize)]
pub struct PluginConfig {
    #[serde(rename = "type")]
    pub plugin_type: String,

    #[serde(flatten)]
    pub options: PluginOptions,
}

impl PluginConfig {
    pub fn new(plugin_type: impl Into<String>) -> Self {
        Self {
            plugin_type: plugin_type.into(),
            options: PluginOptions::new(),
        }
    }

    /// Whether this source reads from upstream pipelines
    #[inline]
    pub fn is_pipeline(&self) -> bool {
        self.plugin_type == PIPELINE_PLUGIN
    }
}

/// A named route predicate
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RouteConfig {
    pub name: String,
    pub condition: String,
}

/// A sink declaration
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    #[serde(rename = "type")]
    pub sink_type: String,

    /// Instance name; derived from the type when absent
    pub name: Option<String>,

    /// Target pipeline of a `pipeline` sink
    pub pipeline: Option<String>,

    /// Subscribed route names; empty receives every event
    #[serde(default)]
    pub routes: Vec<String>,

    #[serde(flatten)]
    pub options: PluginOptions,
}

impl SinkConfig {
    #[inline]
    pub fn is_pipeline(&self) -> bool {
        self.sink_type == PIPELINE_PLUGIN
    }

    /// Name used in logs and metrics for the sink at `index`
    pub fn display_name(&self, index: usize) -> String {
        match (&self.name, &self.pipeline) {
            (Some(name), _) => name.clone(),
            (None, Some(target)) if self.is_pipeline() => format!("pipeline:{target}"),
            _ => format!("{}-{index}", self.sink_type),
        }
    }
}

/// One `[pipelines.<name>]` table
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub source: PluginConfig,

    /// Overrides `global.workers`
    pub workers: Option<usize>,

    /// Overrides `global.buffer_capacity`
    pub buffer_capacity: Option<usize>,

    /// Register an acknowledgement set per source submission
    #[serde(default)]
    pub acknowledgements: bool,

    /// Exit a worker after a processor failure instead of moving on
    #[serde(default)]
    pub stop_on_processor_error: bool,

    #[serde(default)]
    pub processors: Vec<PluginConfig>,

    #[serde(default)]
    pub routes: Vec<RouteConfig>,

    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

impl PipelineConfig {
    /// Pipelines this one forwards into, in sink order
    pub fn downstream(&self) -> impl Iterator<Item = &str> {
        self.sinks
            .iter()
            .filter(|s| s.is_pipeline())
            .filter_map(|s| s.pipeline.as_deref())
    }
}
