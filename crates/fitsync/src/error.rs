//! Error taxonomy for the sync core
//!
//! A closed set of failure kinds, matched exhaustively at the boundaries:
//! transport and API failures are retried locally up to policy limits and
//! then surfaced; timeouts always bubble to the checkpoint layer, which
//! treats them as "pause, not abort".

use std::time::Duration;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// DNS, connection, or socket-timeout failure below the HTTP layer.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The server answered with a non-success status.
    #[error("API request failed with status {status}: {body}")]
    Api { status: u16, body: String },

    /// HTTP 401 - the API key was rejected. Never retried.
    #[error("API key rejected (HTTP 401)")]
    InvalidCredential,

    /// The circuit breaker is open; no network call was attempted.
    #[error("circuit breaker open, retry in {retry_after:?}")]
    CircuitOpen { retry_after: Duration },

    /// Cooperative cancellation fired. `processed` counts the items
    /// already handed to the sink, so nothing is silently lost.
    #[error("execution budget exhausted after {processed} items")]
    Timeout { processed: u64 },

    /// Another import holds the lock or the active flag for this document.
    #[error("another import is already active")]
    AlreadyActive,

    /// A data-quality threshold was breached; fatal for the current step
    /// only, previously committed steps remain valid.
    #[error("{message}")]
    Validation { message: String },

    /// Storage or parsing failure outside the HTTP path.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Whether retrying the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Api { status, .. } => crate::api::is_retryable_status(*status),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_is_retryable() {
        assert!(SyncError::transport("connection reset").is_retryable());
    }

    #[test]
    fn test_api_retryability_follows_status() {
        let retryable = SyncError::Api {
            status: 503,
            body: String::new(),
        };
        let fatal = SyncError::Api {
            status: 400,
            body: String::new(),
        };
        assert!(retryable.is_retryable());
        assert!(!fatal.is_retryable());
    }

    #[test]
    fn test_credential_and_timeout_never_retryable() {
        assert!(!SyncError::InvalidCredential.is_retryable());
        assert!(!SyncError::Timeout { processed: 3 }.is_retryable());
        assert!(!SyncError::AlreadyActive.is_retryable());
    }
}
