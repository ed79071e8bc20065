//! Configuration error types

use std::io;
use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur when loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// A sink forwards into a pipeline that is not declared
    #[error("pipeline '{referenced_by}' references unknown pipeline '{pipeline}'")]
    UnknownPipeline {
        pipeline: String,
        referenced_by: String,
    },

    /// A pipeline reads from upstream pipelines but none forwards to it
    #[error("pipeline '{pipeline}' has a pipeline source but no upstream pipeline forwards to it")]
    OrphanPipelineSource { pipeline: String },

    /// A pipeline is forwarded to but reads from a plugin source
    #[error("pipeline '{pipeline}' is forwarded to by '{upstream}' but its source is '{source_type}'")]
    NotPipelineSourced {
        pipeline: String,
        upstream: String,
        source_type: String,
    },

    /// Two routes in one pipeline share a name
    #[error("pipeline '{pipeline}' declares route '{route}' more than once")]
    DuplicateRoute { pipeline: String, route: String },

    /// A sink subscribes to a route its pipeline does not declare
    #[error("sink '{sink}' in pipeline '{pipeline}' subscribes to undeclared route '{route}'")]
    UnknownRoute {
        pipeline: String,
        sink: String,
        route: String,
    },

    /// Pipelines forward to each other in a loop
    #[error("pipeline cycle detected: {path}")]
    Cycle { path: String },

    /// Validation error - required field missing
    #[error("{component} '{name}' is missing required field '{field}'")]
    MissingField {
        component: &'static str,
        name: String,
        field: &'static str,
    },

    /// Validation error - invalid value
    #[error("{component} '{name}' has invalid {field}: {message}")]
    InvalidValue {
        component: &'static str,
        name: String,
        field: &'static str,
        message: String,
    },

    /// Nothing to run
    #[error("no pipelines are configured - at least one pipeline is required")]
    NoPipelines,
}

impl ConfigError {
    pub fn unknown_pipeline(pipeline: impl Into<String>, referenced_by: impl Into<String>) -> Self {
        Self::UnknownPipeline {
            pipeline: pipeline.into(),
            referenced_by: referenced_by.into(),
        }
    }

    pub fn duplicate_route(pipeline: impl Into<String>, route: impl Into<String>) -> Self {
        Self::DuplicateRoute {
            pipeline: pipeline.into(),
            route: route.into(),
        }
    }

    pub fn unknown_route(
        pipeline: impl Into<String>,
        sink: impl Into<String>,
        route: impl Into<String>,
    ) -> Self {
        Self::UnknownRoute {
            pipeline: pipeline.into(),
            sink: sink.into(),
            route: route.into(),
        }
    }

    /// Create a MissingField error
    pub fn missing_field(
        component: &'static str,
        name: impl Into<String>,
        field: &'static str,
    ) -> Self {
        Self::MissingField {
            component,
            name: name.into(),
            field,
        }
    }

    /// Create an InvalidValue error
    pub fn invalid_value(
        component: &'static str,
        name: impl Into<String>,
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            component,
            name: name.into(),
            field,
            message: message.into(),
        }
    }
}
