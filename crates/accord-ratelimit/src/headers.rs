//! Discord rate-limit header parsing.
//!
//! Header names are matched case-insensitively. Numeric values that fail
//! to parse are treated as absent rather than as errors; a response with
//! unusable headers simply does not update bucket state.

use std::collections::HashMap;
use std::time::Duration;

use crate::bucket::RateLimitBucket;

/// Bucket identifier.
pub const BUCKET: &str = "x-ratelimit-bucket";
/// Requests allowed per window.
pub const LIMIT: &str = "x-ratelimit-limit";
/// Requests left in the window.
pub const REMAINING: &str = "x-ratelimit-remaining";
/// Reset time as Unix seconds (fractional).
pub const RESET: &str = "x-ratelimit-reset";
/// Seconds until reset (fractional).
pub const RESET_AFTER: &str = "x-ratelimit-reset-after";
/// Present and `true` on 429s caused by the global limit.
pub const GLOBAL: &str = "x-ratelimit-global";
/// Scope of a 429: `user`, `global` or `shared`.
pub const SCOPE: &str = "x-ratelimit-scope";
/// Seconds to wait before retrying.
pub const RETRY_AFTER: &str = "retry-after";

/// Scope reported by Discord on a 429.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    /// Per-user (per-token) route limit.
    User,
    /// Global per-token limit.
    Global,
    /// Per-resource shared limit.
    Shared,
}

impl RateLimitScope {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "global" => Some(Self::Global),
            "shared" => Some(Self::Shared),
            _ => None,
        }
    }
}

/// Rate-limit information parsed from one response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitHeaders {
    /// Server-assigned bucket id.
    pub bucket: Option<String>,
    /// Requests allowed per window.
    pub limit: Option<u32>,
    /// Requests left in the window.
    pub remaining: Option<u32>,
    /// Reset time in Unix milliseconds.
    pub reset_at_ms: Option<i64>,
    /// Time until reset.
    pub reset_after: Option<Duration>,
    /// Whether the global limit was hit.
    pub global: bool,
    /// Scope of a 429.
    pub scope: Option<RateLimitScope>,
    /// Retry delay from a 429.
    pub retry_after: Option<Duration>,
}

impl RateLimitHeaders {
    /// Parse headers from a header map.
    #[must_use]
    pub fn parse(headers: &HashMap<String, String>) -> Self {
        let lookup: HashMap<String, &str> = headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.as_str()))
            .collect();
        let get = |name: &str| lookup.get(name).map(|v| v.trim());

        Self {
            bucket: get(BUCKET)
                .filter(|v| !v.is_empty())
                .map(str::to_owned),
            limit: get(LIMIT).and_then(|v| v.parse().ok()),
            remaining: get(REMAINING).and_then(|v| v.parse().ok()),
            reset_at_ms: get(RESET)
                .and_then(parse_seconds)
                .and_then(|d| i64::try_from(d.as_millis()).ok()),
            reset_after: get(RESET_AFTER).and_then(parse_seconds),
            global: get(GLOBAL).is_some_and(|v| v.eq_ignore_ascii_case("true")),
            scope: get(SCOPE).and_then(RateLimitScope::parse),
            retry_after: get(RETRY_AFTER).and_then(parse_seconds),
        }
    }

    /// Build bucket state from these headers.
    ///
    /// Needs `limit`, `remaining` and a reset (relative preferred over
    /// absolute, since it is immune to clock skew). Returns `None` when
    /// the response carried no usable bucket information.
    #[must_use]
    pub fn to_bucket(&self, now_ms: i64) -> Option<RateLimitBucket> {
        let limit = self.limit?;
        let remaining = self.remaining?;
        let reset_at_ms = match (self.reset_after, self.reset_at_ms) {
            (Some(after), _) => {
                now_ms.saturating_add(i64::try_from(after.as_millis()).unwrap_or(i64::MAX))
            },
            (None, Some(at)) => at,
            (None, None) => return None,
        };
        Some(RateLimitBucket::new(
            self.bucket.clone(),
            limit,
            remaining,
            reset_at_ms,
        ))
    }
}

/// Parse a non-negative, possibly fractional, number of seconds.
fn parse_seconds(value: &str) -> Option<Duration> {
    let secs: f64 = value.parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}
