//! Post-load configuration validation.
//!
//! Checks that values are within acceptable ranges and that cross-field
//! invariants hold.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{CacheBackend, Config};

/// Validate a loaded configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_discord(config)?;
    validate_gateway(config)?;
    validate_ratelimit(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_discord(config: &Config) -> ConfigResult<()> {
    let d = &config.discord;

    if d.token.trim().is_empty() {
        return Err(invalid(
            "discord.token",
            "a bot token is required (set it in the file, ACCORD_TOKEN or DISCORD_TOKEN)",
        ));
    }

    if !d.api_base.starts_with("https://") && !d.api_base.starts_with("http://") {
        return Err(invalid(
            "discord.api_base",
            format!("'{}' is not an http(s) URL", d.api_base),
        ));
    }

    Ok(())
}

/// Bounds Discord accepts for `large_threshold`.
const LARGE_THRESHOLD_RANGE: std::ops::RangeInclusive<u8> = 50..=250;

fn validate_gateway(config: &Config) -> ConfigResult<()> {
    let g = &config.gateway;

    if g.shard_count == 0 {
        return Err(invalid("gateway.shard_count", "shard_count must be at least 1"));
    }

    if g.shard_id >= g.shard_count {
        return Err(invalid(
            "gateway.shard_id",
            format!(
                "shard_id ({}) must be less than shard_count ({})",
                g.shard_id, g.shard_count
            ),
        ));
    }

    if let Some(url) = &g.url
        && !url.starts_with("wss://")
        && !url.starts_with("ws://")
    {
        return Err(invalid(
            "gateway.url",
            format!("'{url}' is not a WebSocket URL"),
        ));
    }

    if g.hello_timeout_ms == 0 {
        return Err(invalid("gateway.hello_timeout_ms", "hello_timeout_ms must be positive"));
    }

    if g.heartbeat_tolerance_ms == 0 {
        return Err(invalid(
            "gateway.heartbeat_tolerance_ms",
            "heartbeat_tolerance_ms must be positive",
        ));
    }

    if g.max_connect_attempts == 0 {
        return Err(invalid(
            "gateway.max_connect_attempts",
            "max_connect_attempts must be at least 1",
        ));
    }

    if g.backoff_base_ms > g.backoff_max_ms {
        return Err(invalid(
            "gateway.backoff_base_ms",
            format!(
                "backoff_base_ms ({}) must not exceed backoff_max_ms ({})",
                g.backoff_base_ms, g.backoff_max_ms
            ),
        ));
    }

    if let Some(threshold) = g.large_threshold
        && !LARGE_THRESHOLD_RANGE.contains(&threshold)
    {
        return Err(invalid(
            "gateway.large_threshold",
            format!("large_threshold ({threshold}) must be between 50 and 250"),
        ));
    }

    if g.event_buffer == 0 {
        return Err(invalid("gateway.event_buffer", "event_buffer must be at least 1"));
    }

    Ok(())
}

fn validate_ratelimit(config: &Config) -> ConfigResult<()> {
    let r = &config.ratelimit;

    if r.global_limit == 0 {
        return Err(invalid("ratelimit.global_limit", "global_limit must be at least 1"));
    }

    if r.global_window_ms == 0 {
        return Err(invalid("ratelimit.global_window_ms", "global_window_ms must be positive"));
    }

    if r.cache == CacheBackend::Redis && r.redis_url.as_deref().is_none_or(str::is_empty) {
        return Err(invalid(
            "ratelimit.redis_url",
            "redis_url is required when cache = \"redis\"",
        ));
    }

    if r.key_prefix.is_empty() || r.key_prefix.chars().any(char::is_whitespace) {
        return Err(invalid(
            "ratelimit.key_prefix",
            "key_prefix must be non-empty and contain no whitespace",
        ));
    }

    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;

    if !matches!(
        l.level.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        return Err(invalid(
            "logging.level",
            format!(
                "unknown level '{}'; expected one of: trace, debug, info, warn, error",
                l.level
            ),
        ));
    }

    if !matches!(l.format.as_str(), "pretty" | "compact" | "json" | "full") {
        return Err(invalid(
            "logging.format",
            format!(
                "unknown format '{}'; expected one of: pretty, compact, json, full",
                l.format
            ),
        ));
    }

    match l.target.as_str() {
        "stderr" | "stdout" => {},
        "file" => {
            if l.directory.as_deref().is_none_or(|d| d.trim().is_empty()) {
                return Err(invalid(
                    "logging.directory",
                    "a log directory is required when target = \"file\"",
                ));
            }
        },
        other => {
            return Err(invalid(
                "logging.target",
                format!("unknown target '{other}'; expected one of: stderr, stdout, file"),
            ));
        },
    }

    Ok(())
}
