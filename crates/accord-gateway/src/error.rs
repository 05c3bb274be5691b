//! Error types for the gateway shard.

use crate::close_code::GatewayCloseCode;
use crate::protocol::DecodeError;

/// Errors produced by a gateway shard.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// `WebSocket` transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    /// Transport failure from a non-tungstenite transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// HTTP error fetching the gateway URL.
    #[error("HTTP error fetching gateway URL: {0}")]
    Http(#[from] reqwest::Error),

    /// Gateway discovery through the rate-limited REST client failed.
    #[error("REST error fetching gateway URL: {0}")]
    Rest(#[from] accord_ratelimit::RateLimitError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An inbound payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Connection closed with a code.
    #[error("Connection closed with code {0}")]
    Closed(u16),

    /// Authentication failed (close code 4004, or 401 from `/gateway/bot`).
    #[error("Authentication failed (close code 4004)")]
    AuthenticationFailed,

    /// Invalid or disallowed intents (close code 4013 or 4014).
    #[error("Invalid intents configuration (close code {0})")]
    InvalidIntents(u16),

    /// Invalid shard pair (close code 4010).
    #[error("Invalid shard (close code 4010)")]
    InvalidShard,

    /// The bot must shard (close code 4011).
    #[error("Sharding required (close code 4011)")]
    ShardingRequired,

    /// Unsupported API version (close code 4012).
    #[error("Invalid API version (close code 4012)")]
    InvalidApiVersion,

    /// Unrecoverable close code without a dedicated variant.
    #[error("Unrecoverable close code: {0}")]
    UnrecoverableClose(u16),

    /// Connecting kept failing.
    #[error("Failed to connect after {attempts} attempts: {last_error}")]
    ConnectFailed {
        /// Consecutive failed attempts.
        attempts: u32,
        /// The last failure.
        last_error: String,
    },

    /// Too many consecutive protocol errors.
    #[error("Too many protocol errors ({0} in a row)")]
    TooManyProtocolErrors(u32),

    /// Shutdown was requested.
    #[error("Shutdown requested")]
    Shutdown,

    /// The gateway did not send Hello in time.
    #[error("Timed out waiting for Hello from Gateway")]
    HelloTimeout,

    /// Protocol violation from the gateway.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// The terminal error for a fatal close code.
    #[must_use]
    pub fn from_close_code(code: u16) -> Self {
        match GatewayCloseCode::from_code(code) {
            Some(GatewayCloseCode::AuthenticationFailed) => Self::AuthenticationFailed,
            Some(GatewayCloseCode::InvalidShard) => Self::InvalidShard,
            Some(GatewayCloseCode::ShardingRequired) => Self::ShardingRequired,
            Some(GatewayCloseCode::InvalidApiVersion) => Self::InvalidApiVersion,
            Some(GatewayCloseCode::InvalidIntents | GatewayCloseCode::DisallowedIntents) => {
                Self::InvalidIntents(code)
            },
            _ => Self::UnrecoverableClose(code),
        }
    }

    /// Whether this error terminates the shard without retrying.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed
                | Self::InvalidIntents(_)
                | Self::InvalidShard
                | Self::ShardingRequired
                | Self::InvalidApiVersion
                | Self::UnrecoverableClose(_)
                | Self::ConnectFailed { .. }
                | Self::TooManyProtocolErrors(_)
        )
    }

    /// Whether this error is a protocol violation rather than a
    /// transport failure.
    #[must_use]
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Protocol(_))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
