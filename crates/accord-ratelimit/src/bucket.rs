//! Token-bucket state for one global or route limit.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Current wall-clock time as Unix milliseconds.
///
/// Bucket reset times are absolute so that buckets persisted in a shared
/// cache mean the same thing to every process reading them.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A rate-limit bucket.
///
/// `remaining` is unsigned, so it can never go negative; [`try_take`]
/// refuses at zero instead of wrapping.
///
/// [`try_take`]: RateLimitBucket::try_take
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitBucket {
    /// Server-assigned bucket id. `None` means the route is not shared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Maximum tokens per window.
    pub limit: u32,
    /// Tokens left in the current window.
    pub remaining: u32,
    /// When the window resets, in Unix milliseconds.
    pub reset_at_ms: i64,
}

impl RateLimitBucket {
    /// Create a bucket from explicit values.
    #[must_use]
    pub fn new(id: Option<String>, limit: u32, remaining: u32, reset_at_ms: i64) -> Self {
        Self {
            id,
            limit,
            remaining: remaining.min(limit),
            reset_at_ms,
        }
    }

    /// A full global bucket whose window starts at `now_ms`.
    #[must_use]
    pub fn global(limit: u32, window: Duration, now_ms: i64) -> Self {
        Self {
            id: None,
            limit,
            remaining: limit,
            reset_at_ms: now_ms.saturating_add(duration_millis(window)),
        }
    }

    /// Whether the reset time has been reached.
    #[must_use]
    pub fn has_reset(&self, now_ms: i64) -> bool {
        now_ms >= self.reset_at_ms
    }

    /// Time left until the reset, zero if already past.
    #[must_use]
    pub fn reset_after(&self, now_ms: i64) -> Duration {
        let millis = self.reset_at_ms.saturating_sub(now_ms).max(0);
        Duration::from_millis(u64::try_from(millis).unwrap_or(0))
    }

    /// Take one token if any remain.
    pub fn try_take(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining = self.remaining.saturating_sub(1);
        true
    }

    /// Start a fresh window of `window` length at `now_ms`.
    pub fn refill(&mut self, window: Duration, now_ms: i64) {
        self.remaining = self.limit;
        self.reset_at_ms = now_ms.saturating_add(duration_millis(window));
    }

    /// Cache lifetime: until the reset plus `grace`.
    ///
    /// Buckets for routes that are never called again fall out of the
    /// cache shortly after they stop being meaningful.
    #[must_use]
    pub fn cache_ttl(&self, now_ms: i64, grace: Duration) -> Duration {
        self.reset_after(now_ms).saturating_add(grace)
    }
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
