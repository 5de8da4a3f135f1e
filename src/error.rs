//! Error types for the ops-link client library.
//!
//! Every failure surfaces as an [`OpsLinkError`] so callers classify once:
//! session problems (`NoSession`, `SessionExpired`) fail before any network
//! attempt, transport problems are retryable by the caller, and server
//! rejections carry the server-supplied message verbatim.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for ops-link operations.
pub type Result<T> = std::result::Result<T, OpsLinkError>;

/// Errors produced by the ops-link client.
#[derive(Error, Debug)]
pub enum OpsLinkError {
    /// Client was misconfigured (missing proxy URL, bad timeout, ...).
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// No session token could be obtained; nothing was sent.
    #[error("No active session: {0}")]
    NoSession(String),

    /// The session is terminally invalid after a failed refresh.
    /// All subsequent calls fail fast without a network attempt.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Transport-level failure (connect, TLS, read). Never auto-retried
    /// by this layer; the caller decides.
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The per-call deadline elapsed before a response arrived.
    #[error("Request deadline of {0:?} exceeded")]
    TimeoutError(Duration),

    /// Non-401, non-success response from the proxy endpoint.
    #[error("Server error ({status_code}): {message}")]
    ServerError {
        status_code: u16,
        message: String,
    },

    /// Result-shape violation, e.g. `fetch_one` matched zero rows.
    #[error("Query error: {0}")]
    QueryError(String),

    /// A builder was assembled in an invalid way (unfiltered update/delete,
    /// conflicting pagination, malformed disjunction). Raised before any
    /// network or backend work.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// JSON (de)serialization failure.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Native failure from a privileged local backend handle.
    #[error("Backend error: {0}")]
    BackendError(String),
}

impl OpsLinkError {
    /// `true` for transport failures the caller may reasonably retry.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::NetworkError(_) | Self::TimeoutError(_))
    }

    /// `true` when the failure was raised before anything left the process.
    pub fn is_pre_network(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationError(_) | Self::NoSession(_) | Self::ValidationError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        let timeout = OpsLinkError::TimeoutError(Duration::from_secs(5));
        assert!(timeout.is_transport());

        let server = OpsLinkError::ServerError {
            status_code: 500,
            message: "boom".to_string(),
        };
        assert!(!server.is_transport());
    }

    #[test]
    fn test_pre_network_classification() {
        assert!(OpsLinkError::ValidationError("x".into()).is_pre_network());
        assert!(OpsLinkError::NoSession("x".into()).is_pre_network());
        assert!(!OpsLinkError::SessionExpired("x".into()).is_pre_network());
    }
}
