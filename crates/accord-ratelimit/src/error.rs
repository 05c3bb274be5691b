//! Error types for rate-limited REST calls.

use std::time::Duration;

use accord_cache::CacheError;

/// Errors produced by the REST layer.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Transport failure from a non-reqwest transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The request was rate limited, locally or by Discord.
    #[error("rate limited (global: {global}, local: {local}), retry after {retry_after:?}")]
    RateLimited {
        /// How long to wait before retrying the same request.
        retry_after: Duration,
        /// Whether the global (per-token) limit was hit.
        global: bool,
        /// Whether the 429 was synthesized without a network call.
        local: bool,
    },

    /// Discord answered with a non-429 error status.
    #[error("Discord API error {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        message: String,
    },

    /// Cache backend setup failed.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

impl RateLimitError {
    /// The retry delay, if this is a rate-limit error.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Result type for REST operations.
pub type RateLimitResult<T> = Result<T, RateLimitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_display_and_retry_after() {
        let err = RateLimitError::RateLimited {
            retry_after: Duration::from_millis(1500),
            global: true,
            local: true,
        };
        let text = err.to_string();
        assert!(text.contains("global: true"));
        assert!(text.contains("local: true"));
        assert_eq!(err.retry_after(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn api_error_has_no_retry_after() {
        let err = RateLimitError::Api {
            status: 403,
            message: "Missing Access".into(),
        };
        assert!(err.to_string().contains("403"));
        assert!(err.retry_after().is_none());
    }
}
