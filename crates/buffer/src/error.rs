//! Buffer error types

use std::time::Duration;

use conduit_protocol::Batch;
use thiserror::Error;

/// Result type for buffer writes
pub type Result<T> = std::result::Result<T, BufferError>;

/// A rejected write; the batch is handed back to the caller
#[derive(Debug, Error)]
pub enum BufferError {
    /// No space became available within the write timeout
    #[error("buffer '{name}' full: no space within {timeout:?}")]
    WriteTimeout {
        name: String,
        timeout: Duration,
        batch: Batch,
    },

    /// The buffer was shut down
    #[error("buffer '{name}' is closed")]
    Closed { name: String, batch: Batch },
}

impl BufferError {
    /// Recover the rejected batch
    pub fn into_batch(self) -> Batch {
        match self {
            Self::WriteTimeout { batch, .. } | Self::Closed { batch, .. } => batch,
        }
    }

    /// The rejected batch
    pub fn batch(&self) -> &Batch {
        match self {
            Self::WriteTimeout { batch, .. } | Self::Closed { batch, .. } => batch,
        }
    }

    /// Whether the write may succeed if retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WriteTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_protocol::Event;

    #[test]
    fn test_into_batch_returns_records() {
        let batch = Batch::from_events([Event::new("log"), Event::new("log")]);
        let err = BufferError::WriteTimeout {
            name: "main".into(),
            timeout: Duration::from_millis(5),
            batch,
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("main"));
        assert_eq!(err.batch().len(), 2);
        assert_eq!(err.into_batch().len(), 2);
    }

    #[test]
    fn test_closed_not_retryable() {
        let err = BufferError::Closed {
            name: "main".into(),
            batch: Batch::new(),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("closed"));
    }
}
