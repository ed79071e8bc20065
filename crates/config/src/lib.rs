//! Conduit Configuration
//!
//! TOML-based configuration loading with sensible defaults. Only the
//! pipelines themselves are required; every runtime setting has a default.
//!
//! # Parsing
//!
//! ```
//! use conduit_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str(r#"
//! [pipelines.entry]
//! source = { type = "stdin" }
//! sinks = [{ type = "stdout" }]
//! "#).unwrap();
//! assert_eq!(config.pipelines.len(), 1);
//! ```
//!
//! # Example
//!
//! ```toml
//! [global]
//! workers = 4
//! acknowledgement_expiry = "30s"
//!
//! [pipelines.entry]
//! source = { type = "stdin" }
//! acknowledgements = true
//! processors = [{ type = "add_field", key = "env", value = "prod" }]
//! routes = [{ name = "errors", condition = "/level == \"error\"" }]
//! sinks = [
//!   { type = "pipeline", pipeline = "errors", routes = ["errors"] },
//!   { type = "stdout" },
//! ]
//!
//! [pipelines.errors]
//! source = { type = "pipeline" }
//! sinks = [{ type = "stdout" }]
//! ```

mod error;
mod global;
mod logging;
mod pipeline;
mod validation;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use error::{ConfigError, Result};
pub use global::GlobalConfig;
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use pipeline::{
    DEFAULT_ROUTE, PIPELINE_PLUGIN, PipelineConfig, PluginConfig, PluginOptions, RouteConfig,
    SinkConfig,
};

use serde::Deserialize;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Runtime defaults (workers, timeouts, buffer sizes)
    pub global: GlobalConfig,

    /// Logging configuration
    pub log: LogConfig,

    /// Pipelines by name
    pub pipelines: BTreeMap<String, PipelineConfig>,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid TOML, or
    /// describes an inconsistent topology.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline topology
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Effective worker count of a pipeline
    pub fn workers_for(&self, pipeline: &PipelineConfig) -> usize {
        pipeline.workers.unwrap_or(self.global.workers)
    }

    /// Effective buffer capacity of a pipeline
    pub fn buffer_capacity_for(&self, pipeline: &PipelineConfig) -> usize {
        pipeline.buffer_capacity.unwrap_or(self.global.buffer_capacity)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use super::*;

    const TWO_PIPELINES: &str = r#"
[global]
workers = 3
acknowledgement_expiry = "2s"

[log]
level = "debug"

[pipelines.entry]
source = { type = "in_memory", testing_key = "entry" }
workers = 1
acknowledgements = true
processors = [{ type = "add_field", key = "env", value = "prod" }]
routes = [{ name = "errors", condition = "/is_error" }]
sinks = [
  { type = "pipeline", pipeline = "errors", routes = ["errors"] },
  { type = "stdout" },
]

[pipelines.errors]
source = { type = "pipeline" }
buffer_capacity = 16
sinks = [{ type = "null" }]
"#;

    #[test]
    fn test_full_config_parse() {
        let config = Config::from_str(TWO_PIPELINES).unwrap();
        assert_eq!(config.log.level, LogLevel::Debug);
        assert_eq!(config.global.acknowledgement_expiry, Duration::from_secs(2));
        assert_eq!(config.pipelines.len(), 2);

        let entry = &config.pipelines["entry"];
        assert!(entry.acknowledgements);
        assert_eq!(config.workers_for(entry), 1);
        assert_eq!(config.buffer_capacity_for(entry), 512);
        assert_eq!(entry.processors[0].plugin_type, "add_field");
        assert_eq!(entry.downstream().collect::<Vec<_>>(), vec!["errors"]);

        let errors = &config.pipelines["errors"];
        assert!(errors.source.is_pipeline());
        assert_eq!(config.workers_for(errors), 3);
        assert_eq!(config.buffer_capacity_for(errors), 16);
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::from_str("invalid { toml");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TWO_PIPELINES.as_bytes()).unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.pipelines.len(), 2);
    }

    #[test]
    fn test_from_missing_file() {
        let err = Config::from_file("/nonexistent/conduit.toml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError { .. }));
    }
}
