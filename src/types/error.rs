//! Error types for the relay
//!
//! Business outcomes (duplicates, ownership conflicts) are usually returned as
//! outcome enums by the ledgers; the variants here exist so callers that need a
//! single error channel can still express them.

/// Main error type for relay operations
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Duplicate submission: {0}")]
    DuplicateSubmission(String),

    #[error("Ownership conflict: {0}")]
    OwnershipConflict(String),

    #[error("Contract not found: {0}")]
    ContractNotFound(String),

    #[error("Unknown destination: {0}")]
    UnknownDestination(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RelayError {
    /// HTTP status an API layer should expose for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::DuplicateSubmission(_) => 409,
            Self::OwnershipConflict(_) => 409,
            Self::ContractNotFound(_) => 400,
            Self::UnknownDestination(_) => 400,
            Self::Malformed(_) => 400,
            Self::Storage(_) => 500,
            Self::Transport(_) => 500,
            Self::Config(_) => 500,
        }
    }

    /// Whether redelivering the message may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Transport(_))
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(format!("JSON error: {}", err))
    }
}

impl From<mongodb::error::Error> for RelayError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<async_nats::Error> for RelayError {
    fn from(err: async_nats::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(RelayError::DuplicateSubmission("h".into()).status_code(), 409);
        assert_eq!(RelayError::OwnershipConflict("h".into()).status_code(), 409);
        assert_eq!(RelayError::ContractNotFound("h".into()).status_code(), 400);
        assert_eq!(RelayError::UnknownDestination("x".into()).status_code(), 400);
        assert_eq!(RelayError::Storage("timeout".into()).status_code(), 500);
        assert_eq!(RelayError::Transport("closed".into()).status_code(), 500);
    }

    #[test]
    fn test_only_faults_are_retryable() {
        assert!(RelayError::Storage("throttled".into()).is_retryable());
        assert!(RelayError::Transport("no ack".into()).is_retryable());
        assert!(!RelayError::Malformed("missing cedente".into()).is_retryable());
        assert!(!RelayError::OwnershipConflict("bankA".into()).is_retryable());
    }

    #[test]
    fn test_json_error_is_malformed() {
        let err: RelayError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, RelayError::Malformed(_)));
    }
}
