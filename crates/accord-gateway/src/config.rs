//! Shard configuration.

use std::time::Duration;

use crate::intents::Intents;
use crate::protocol::{ConnectionProperties, PresenceUpdate};

/// Default REST base used to discover the gateway URL.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Configuration for one gateway shard.
#[derive(Debug, Clone)]
pub struct ShardConfig {
    /// Bot token (without the `Bot ` prefix).
    pub token: String,
    /// Gateway intents bitmask.
    pub intents: Intents,
    /// This shard's index.
    pub shard_id: u32,
    /// Total shards.
    pub shard_count: u32,
    /// Gateway URL. Discovered through `GET /gateway/bot` when `None`.
    pub gateway_url: Option<String>,
    /// REST base for gateway discovery.
    pub api_base: String,
    /// Client properties sent in Identify.
    pub properties: ConnectionProperties,
    /// Member count above which offline members are omitted.
    pub large_threshold: Option<u8>,
    /// Presence sent in Identify.
    pub presence: Option<PresenceUpdate>,
    /// How long to wait for Hello after connecting.
    pub hello_timeout: Duration,
    /// Grace period before a missing heartbeat ACK counts as a zombie.
    pub heartbeat_tolerance: Duration,
    /// Consecutive connect failures before giving up.
    pub max_connect_attempts: u32,
    /// Consecutive resume attempts before starting a new session.
    pub max_resume_attempts: u32,
    /// Consecutive protocol errors before giving up.
    pub max_protocol_errors: u32,
    /// Base reconnect backoff.
    pub backoff_base: Duration,
    /// Maximum reconnect backoff.
    pub backoff_max: Duration,
    /// Lower bound of the wait after an invalid session.
    pub invalid_session_delay_min: Duration,
    /// Upper bound of the wait after an invalid session.
    pub invalid_session_delay_max: Duration,
    /// Capacity of the dispatch channel.
    pub event_buffer: usize,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            intents: Intents::DEFAULT,
            shard_id: 0,
            shard_count: 1,
            gateway_url: None,
            api_base: DEFAULT_API_BASE.to_owned(),
            properties: ConnectionProperties::default(),
            large_threshold: None,
            presence: None,
            hello_timeout: Duration::from_secs(30),
            heartbeat_tolerance: Duration::from_secs(5),
            max_connect_attempts: 10,
            max_resume_attempts: 3,
            max_protocol_errors: 5,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            invalid_session_delay_min: Duration::from_secs(1),
            invalid_session_delay_max: Duration::from_secs(5),
            event_buffer: 256,
        }
    }
}

impl ShardConfig {
    /// Defaults with the given token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }

    /// The `[shard_id, shard_count]` pair sent in Identify.
    #[must_use]
    pub fn shard(&self) -> [u32; 2] {
        [self.shard_id, self.shard_count]
    }
}
