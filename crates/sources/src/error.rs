use std::time::Duration;

use wattwise_protocol::DecodeError;

/// Failure of a single poll against a backend.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Missing or invalid settings; the user must re-run configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network unreachable, connection dropped or credentials rejected.
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The backend answered with something we cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SourceError {
    /// Transient errors are retried on the next tick in continuous mode.
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Connection(_) | SourceError::Timeout(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Configuration(_) => "configuration",
            SourceError::Connection(_) => "connection",
            SourceError::Timeout(_) => "timeout",
            SourceError::Protocol(_) => "protocol",
        }
    }
}

impl From<DecodeError> for SourceError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Unavailable(_) => SourceError::Connection(err.to_string()),
            DecodeError::Unsupported(_) => SourceError::Configuration(err.to_string()),
            _ => SourceError::Protocol(err.to_string()),
        }
    }
}
