//! Error types for weather lookups.

use serde_json::{Value, json};
use thiserror::Error;

/// Result type for weather operations.
pub type Result<T> = std::result::Result<T, WeatherError>;

/// Why a weather lookup failed.
///
/// These are tool-level failures. They travel back to the caller as data in a
/// tool result, never as protocol errors.
#[derive(Debug, Error)]
pub enum WeatherError {
    /// The provider answered with a non-success status for this query.
    #[error("Unable to find city: {query}")]
    NotFound {
        /// The query as the caller supplied it.
        query: String,
    },

    /// Anything else: network fault, timeout, malformed payload, bad input.
    #[error("{message}")]
    Other {
        /// The query as the caller supplied it.
        query: String,
        /// What went wrong.
        message: String,
    },

    /// The call arguments carry no usable query.
    #[error("{0}")]
    InvalidArguments(String),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl WeatherError {
    /// Create a not-found error.
    pub fn not_found(query: impl Into<String>) -> Self {
        Self::NotFound {
            query: query.into(),
        }
    }

    /// Create a catch-all error.
    pub fn other(query: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Other {
            query: query.into(),
            message: message.into(),
        }
    }

    /// Create an error for arguments without a string query.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments(message.into())
    }

    /// The query the failure belongs to, if any.
    pub fn query(&self) -> Option<&str> {
        match self {
            Self::NotFound { query } | Self::Other { query, .. } => Some(query.as_str()),
            Self::InvalidArguments(_) | Self::Client(_) => None,
        }
    }

    /// Status tag carried in the payload.
    pub fn status(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "failed",
            Self::Other { .. } | Self::InvalidArguments(_) | Self::Client(_) => "error",
        }
    }

    /// Structured form returned to the caller.
    ///
    /// `city` is null when the failure has no query.
    pub fn to_payload(&self) -> Value {
        json!({
            "error": self.to_string(),
            "status": self.status(),
            "city": self.query(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_payload() {
        let payload = WeatherError::not_found("Nonexistent City").to_payload();
        assert_eq!(payload["error"], "Unable to find city: Nonexistent City");
        assert_eq!(payload["status"], "failed");
        assert_eq!(payload["city"], "Nonexistent City");
    }

    #[test]
    fn test_other_payload() {
        let payload = WeatherError::other("Boston", "request timed out").to_payload();
        assert_eq!(payload["error"], "request timed out");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["city"], "Boston");
    }

    #[test]
    fn test_invalid_arguments_payload_has_no_city() {
        let payload = WeatherError::invalid_arguments("missing required argument 'city_query'")
            .to_payload();
        assert_eq!(payload["status"], "error");
        assert!(payload["city"].is_null());
    }
}
