//! Pipeline error types

use std::time::Duration;

use conduit_buffer::Exhaustion;
use conduit_config::ConfigError;
use conduit_routing::RoutingError;
use conduit_sinks::SinkError;
use conduit_sources::SourceError;
use conduit_transform::ProcessorError;
use thiserror::Error;

use crate::state::PipelineState;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Operation not allowed in the pipeline's current state
    #[error("pipeline '{pipeline}' cannot {operation} while {state}")]
    InvalidState {
        pipeline: String,
        operation: &'static str,
        state: PipelineState,
    },

    /// Processor chain built for a different number of workers
    #[error("pipeline '{pipeline}' runs {expected} workers but the chain was built for {actual}")]
    WorkerCountMismatch {
        pipeline: String,
        expected: usize,
        actual: usize,
    },

    /// No pipeline with this name in the graph
    #[error("unknown pipeline '{0}'")]
    UnknownPipeline(String),

    /// Pipelines forward to each other in a loop
    #[error("pipeline cycle detected among: {0}")]
    Cycle(String),

    /// A sink did not become ready before startup was abandoned
    #[error("sink '{sink}' of pipeline '{pipeline}' not ready after {waited:?}")]
    SinkNotReady {
        pipeline: String,
        sink: String,
        waited: Duration,
    },

    /// Invalid pipeline assembly
    #[error("pipeline '{pipeline}': {message}")]
    Build { pipeline: String, message: String },

    /// A pipeline of the graph failed to start
    #[error("pipeline '{pipeline}' failed to start: {source}")]
    StartupFailed {
        pipeline: String,
        #[source]
        source: Box<PipelineError>,
    },

    /// A writer gave up on a buffer that stayed full
    #[error("fatal: {0}")]
    BufferExhausted(Exhaustion),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Source(#[from] SourceError),
}

impl PipelineError {
    pub fn invalid_state(
        pipeline: impl Into<String>,
        operation: &'static str,
        state: PipelineState,
    ) -> Self {
        Self::InvalidState {
            pipeline: pipeline.into(),
            operation,
            state,
        }
    }

    pub fn build(pipeline: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Build {
            pipeline: pipeline.into(),
            message: message.into(),
        }
    }

    pub fn startup_failed(pipeline: impl Into<String>, source: PipelineError) -> Self {
        Self::StartupFailed {
            pipeline: pipeline.into(),
            source: Box::new(source),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::invalid_state("entry", "swap processors", PipelineState::Stopped);
        assert_eq!(
            err.to_string(),
            "pipeline 'entry' cannot swap processors while stopped"
        );

        let err = PipelineError::WorkerCountMismatch {
            pipeline: "entry".into(),
            expected: 4,
            actual: 2,
        };
        assert!(err.to_string().contains("4 workers"));

        let err = PipelineError::startup_failed("entry", PipelineError::build("entry", "no source"));
        assert!(err.to_string().contains("failed to start"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_from_lower_errors() {
        let err: PipelineError = ProcessorError::failed("boom").into();
        assert!(matches!(err, PipelineError::Processor(_)));
        assert!(err.to_string().contains("boom"));

        let err: PipelineError = SinkError::config("bad").into();
        assert!(matches!(err, PipelineError::Sink(_)));
    }
}
