//! Protocol error types

use thiserror::Error;

/// Errors raised while building or editing events
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Input was not valid JSON
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Event data must be a JSON object at the top level
    #[error("event data must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// Key path is empty or malformed
    #[error("invalid key path '{0}'")]
    InvalidKey(String),

    /// A path segment exists but is not an object
    #[error("cannot descend into non-object value at '{0}'")]
    NotTraversable(String),
}

impl ProtocolError {
    /// Create an invalid key error
    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::InvalidKey(key.into())
    }
}
