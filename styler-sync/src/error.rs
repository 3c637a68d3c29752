//! Error types for the sync client.
//!
//! Variants carry user-facing messages rather than wrapped source
//! errors so a single settled result can be cloned out to every caller
//! coalesced onto the same network request.

use thiserror::Error;

/// Result type for sync client operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by [`crate::SyncClient`].
///
/// Retryable conditions (transport failures, timeouts, 5xx, 429) are
/// handled internally and only appear here once retries are exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Invalid constructor configuration. Fatal, raised synchronously.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// `save_settings` was called with something other than a JSON
    /// object. Rejected before any I/O.
    #[error("invalid settings: document must be a JSON object")]
    InvalidSettings,

    /// An apply operation was called with an empty identifier.
    /// Rejected before any I/O.
    #[error("invalid identifier: {0} must be a non-empty string")]
    InvalidIdentifier(String),

    /// Transport failure after retries were exhausted.
    #[error("{0}")]
    Network(String),

    /// No response arrived within the configured budget, after retries
    /// were exhausted.
    #[error("{0}")]
    Timeout(String),

    /// A terminal server response (non-auth 4xx, or 5xx/429 once
    /// retries ran out).
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Message derived from the response body.
        message: String,
    },

    /// The auth nonce expired and could not be refreshed.
    #[error("authentication failed: {0}")]
    AuthExpired(String),

    /// The server answered 2xx but the body did not have the expected
    /// shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_are_cloneable() {
        let err = SyncError::Server {
            status: 500,
            message: "boom".into(),
        };
        assert_eq!(err.clone(), err);
    }

    #[test]
    fn test_display_includes_status() {
        let err = SyncError::Server {
            status: 404,
            message: "not found".into(),
        };
        assert!(err.to_string().contains("404"));
        assert!(err.to_string().contains("not found"));
    }
}
