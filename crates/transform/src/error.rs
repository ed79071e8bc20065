//! Processor error types

use thiserror::Error;

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

/// Errors raised by processors and chains
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// Processing logic failed
    #[error("processing failed: {0}")]
    Failed(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A processor in a chain failed
    #[error("processor '{processor}' failed: {source}")]
    Chain {
        processor: &'static str,
        #[source]
        source: Box<ProcessorError>,
    },

    /// A per-worker slot does not hold one instance per worker
    #[error("processor '{processor}' has {actual} instances for {expected} workers")]
    WorkerCountMismatch {
        processor: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A worker index outside the chain's worker range
    #[error("no instance of '{processor}' for worker {worker}")]
    NoInstance {
        processor: &'static str,
        worker: usize,
    },
}

impl ProcessorError {
    /// Create a processing failure
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap an error with the name of the failing processor
    pub fn chain(processor: &'static str, source: ProcessorError) -> Self {
        Self::Chain {
            processor,
            source: Box::new(source),
        }
    }

    /// Name of the processor that failed, if known
    pub fn processor(&self) -> Option<&'static str> {
        match self {
            Self::Chain { processor, .. }
            | Self::WorkerCountMismatch { processor, .. }
            | Self::NoInstance { processor, .. } => Some(*processor),
            Self::Failed(_) | Self::Config(_) => None,
        }
    }
}
