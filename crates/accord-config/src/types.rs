//! Configuration types.
//!
//! These mirror the runtime configuration of the gateway and rate-limit
//! crates without depending on them; conversion happens in the binary.
//! Every struct implements [`Default`], so a bare `[section]` header in
//! TOML yields a working configuration.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bot credentials and REST base.
    pub discord: DiscordSection,
    /// Gateway shard settings.
    pub gateway: GatewaySection,
    /// REST rate limiting.
    pub ratelimit: RateLimitSection,
    /// Logging level, format and per-crate directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// DiscordSection
// ---------------------------------------------------------------------------

/// Default REST API base.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Bot credentials.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct DiscordSection {
    /// Bot token. Prefer `ACCORD_TOKEN` or `${VAR}` over a literal.
    pub token: String,
    /// REST API base URL.
    pub api_base: String,
}

impl Default for DiscordSection {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: DEFAULT_API_BASE.to_owned(),
        }
    }
}

impl std::fmt::Debug for DiscordSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordSection")
            .field("has_token", &!self.token.is_empty())
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl Serialize for DiscordSection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DiscordSection", 1)?;
        state.serialize_field("api_base", &self.api_base)?;
        state.end()
    }
}

// ---------------------------------------------------------------------------
// GatewaySection
// ---------------------------------------------------------------------------

/// Gateway shard settings. Durations are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// Intents bitmask.
    pub intents: u32,
    /// This shard's index.
    pub shard_id: u32,
    /// Total shard count.
    pub shard_count: u32,
    /// Gateway URL override. Discovered from the API when unset.
    pub url: Option<String>,
    /// Time allowed for Hello after connecting.
    pub hello_timeout_ms: u64,
    /// Grace period before a missing heartbeat ACK counts as a zombie.
    pub heartbeat_tolerance_ms: u64,
    /// Consecutive connect failures before giving up.
    pub max_connect_attempts: u32,
    /// Consecutive resume attempts before starting a new session.
    pub max_resume_attempts: u32,
    /// Consecutive protocol errors before giving up.
    pub max_protocol_errors: u32,
    /// Base reconnect backoff.
    pub backoff_base_ms: u64,
    /// Maximum reconnect backoff.
    pub backoff_max_ms: u64,
    /// Member count above which offline members are omitted (50–250).
    pub large_threshold: Option<u8>,
    /// Capacity of the dispatch channel.
    pub event_buffer: usize,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            intents: 4609,
            shard_id: 0,
            shard_count: 1,
            url: None,
            hello_timeout_ms: 30_000,
            heartbeat_tolerance_ms: 5_000,
            max_connect_attempts: 10,
            max_resume_attempts: 3,
            max_protocol_errors: 5,
            backoff_base_ms: 1_000,
            backoff_max_ms: 60_000,
            large_threshold: None,
            event_buffer: 256,
        }
    }
}

// ---------------------------------------------------------------------------
// RateLimitSection
// ---------------------------------------------------------------------------

/// Where bucket state lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Process-local.
    #[default]
    Memory,
    /// Shared through Redis.
    Redis,
}

/// REST rate limiting.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    /// Requests allowed per global window.
    pub global_limit: u32,
    /// Global window length.
    pub global_window_ms: u64,
    /// Bucket store backend.
    pub cache: CacheBackend,
    /// Redis connection URL, required for the `redis` backend.
    pub redis_url: Option<String>,
    /// Namespace for bucket keys.
    pub key_prefix: String,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            global_limit: 50,
            global_window_ms: 1_000,
            cache: CacheBackend::Memory,
            redis_url: None,
            key_prefix: "accord".to_owned(),
        }
    }
}

// Redis URLs may carry a password.
impl std::fmt::Debug for RateLimitSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitSection")
            .field("global_limit", &self.global_limit)
            .field("global_window_ms", &self.global_window_ms)
            .field("cache", &self.cache)
            .field("has_redis_url", &self.redis_url.is_some())
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl Serialize for RateLimitSection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RateLimitSection", 4)?;
        state.serialize_field("global_limit", &self.global_limit)?;
        state.serialize_field("global_window_ms", &self.global_window_ms)?;
        state.serialize_field("cache", &self.cache)?;
        state.serialize_field("key_prefix", &self.key_prefix)?;
        state.end()
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"` or `"full"`.
    pub format: String,
    /// Per-crate directives, e.g. `["accord_gateway=debug", "hyper=warn"]`.
    pub directives: Vec<String>,
    /// Where logs go: `"stderr"`, `"stdout"` or `"file"`.
    pub target: String,
    /// Directory for daily rolling log files when `target = "file"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
            target: "stderr".to_owned(),
            directory: None,
        }
    }
}
