//! Error types for the NLWeb query core

use thiserror::Error;

/// Error type for NLWeb operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Request validation failed (missing query, unknown mode, oversized query, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Request was rejected by the rate limiter
    #[error("Rate limited: retry in {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the current window resets
        retry_after_secs: u64,
    },

    /// No backend produced results; every enabled backend failed
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// No backends are enabled for querying
    #[error("No backends are enabled")]
    NoBackends,

    /// The chat client failed; Summarize/Generate degrade to List
    #[error("Chat client unavailable: {0}")]
    ChatClientUnavailable(String),

    /// The backend does not support the requested operation
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// The request was cancelled by the client or exceeded its deadline
    #[error("Cancelled")]
    Cancelled,

    /// Configuration rejected at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unhandled internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors that leave the request salvageable by a fallback path.
    ///
    /// Handler failures fall back to the `search` handler; chat failures
    /// degrade Summarize/Generate to List. Validation, rate-limit and
    /// cancellation errors are terminal.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::BackendUnavailable(_)
                | Error::ChatClientUnavailable(_)
                | Error::NotImplemented(_)
                | Error::Internal(_)
        )
    }
}

/// Result type alias for NLWeb operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_display() {
        let err = Error::InvalidArgument("query is required".to_string());
        assert_eq!(err.to_string(), "Invalid argument: query is required");
    }

    #[test]
    fn test_rate_limited_display() {
        let err = Error::RateLimited {
            retry_after_secs: 42,
        };
        assert_eq!(err.to_string(), "Rate limited: retry in 42s");
    }

    #[test]
    fn test_backend_unavailable_display() {
        let err = Error::BackendUnavailable("all 3 backends failed".to_string());
        assert_eq!(err.to_string(), "Backend unavailable: all 3 backends failed");
    }

    #[test]
    fn test_no_backends_display() {
        assert_eq!(Error::NoBackends.to_string(), "No backends are enabled");
    }

    #[test]
    fn test_cancelled_display() {
        assert_eq!(Error::Cancelled.to_string(), "Cancelled");
    }

    #[test]
    fn test_serialization_error_from() {
        let json_err: serde_json::Error = serde_json::from_str::<String>("invalid").unwrap_err();
        let err = Error::from(json_err);
        assert!(matches!(err, Error::Serialization(_)));
        assert!(err.to_string().contains("Serialization error"));
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::BackendUnavailable("x".into()).is_recoverable());
        assert!(Error::ChatClientUnavailable("x".into()).is_recoverable());
        assert!(Error::NotImplemented("search".into()).is_recoverable());
        assert!(Error::Internal("x".into()).is_recoverable());

        assert!(!Error::InvalidArgument("x".into()).is_recoverable());
        assert!(!Error::Cancelled.is_recoverable());
        assert!(!Error::RateLimited {
            retry_after_secs: 1
        }
        .is_recoverable());
        assert!(!Error::NoBackends.is_recoverable());
    }

    #[test]
    fn test_error_debug() {
        let err = Error::Config("zero window".to_string());
        let debug = format!("{:?}", err);
        assert!(debug.contains("Config"));
        assert!(debug.contains("zero window"));
    }
}
