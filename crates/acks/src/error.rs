//! Acknowledgement error types

use thiserror::Error;

use crate::AckSetId;

/// Result type for acknowledgement operations
pub type Result<T> = std::result::Result<T, AckError>;

/// Errors raised by acknowledgement-set operations
#[derive(Debug, Error)]
pub enum AckError {
    /// Records cannot be added after the set has been sealed
    #[error("acknowledgement set {0} is already complete")]
    AlreadyComplete(AckSetId),

    /// The set expired before the operation
    #[error("acknowledgement set {0} has expired")]
    Expired(AckSetId),

    /// The manager is inactive (acknowledgements disabled)
    #[error("acknowledgements are disabled")]
    Inactive,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AckError::AlreadyComplete(AckSetId::new(7));
        assert!(err.to_string().contains("ack:7"));
        assert!(err.to_string().contains("already complete"));

        let err = AckError::Expired(AckSetId::new(3));
        assert!(err.to_string().contains("expired"));

        assert!(AckError::Inactive.to_string().contains("disabled"));
    }
}
