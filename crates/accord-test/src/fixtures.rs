//! Frame builders and ready-made configurations.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Value, json};

use accord_gateway::ShardConfig;
use accord_ratelimit::RestResponse;
use accord_ratelimit::headers;

/// Gateway URL used by test configurations.
pub const GATEWAY_URL: &str = "wss://gateway.discord.gg";

/// Resume URL handed out by [`ready`].
pub const RESUME_URL: &str = "wss://gateway-us-east1-b.discord.gg";

/// Token used by test configurations.
pub const TEST_TOKEN: &str = "test-token";

/// Heartbeat interval long enough that no beat fires during a test.
pub const QUIET_HEARTBEAT_MS: u64 = 60_000;

// ── Gateway frames ──

/// `op=10` Hello.
#[must_use]
pub fn hello(heartbeat_interval_ms: u64) -> String {
    json!({ "op": 10, "d": { "heartbeat_interval": heartbeat_interval_ms } }).to_string()
}

/// `READY` dispatch.
#[must_use]
pub fn ready(session_id: &str, resume_url: &str, seq: u64) -> String {
    json!({
        "op": 0,
        "t": "READY",
        "s": seq,
        "d": {
            "v": 10,
            "session_id": session_id,
            "resume_gateway_url": resume_url,
            "user": { "id": "80351110224678912", "username": "accord", "bot": true },
            "guilds": [],
            "shard": [0, 1],
        },
    })
    .to_string()
}

/// `RESUMED` dispatch.
#[must_use]
pub fn resumed(seq: u64) -> String {
    dispatch("RESUMED", seq, Value::Null)
}

/// Any dispatch.
#[must_use]
pub fn dispatch(name: &str, seq: u64, data: Value) -> String {
    json!({ "op": 0, "t": name, "s": seq, "d": data }).to_string()
}

/// A `MESSAGE_CREATE` dispatch.
#[must_use]
pub fn message_create(seq: u64, content: &str) -> String {
    dispatch(
        "MESSAGE_CREATE",
        seq,
        json!({ "id": seq.to_string(), "channel_id": "1", "content": content }),
    )
}

/// `op=9` Invalid Session.
#[must_use]
pub fn invalid_session(resumable: bool) -> String {
    json!({ "op": 9, "d": resumable }).to_string()
}

/// `op=7` Reconnect.
#[must_use]
pub fn reconnect() -> String {
    json!({ "op": 7, "d": null }).to_string()
}

/// `op=11` Heartbeat ACK.
#[must_use]
pub fn heartbeat_ack() -> String {
    json!({ "op": 11 }).to_string()
}

/// `op=1` server heartbeat request.
#[must_use]
pub fn heartbeat_request() -> String {
    json!({ "op": 1, "d": null }).to_string()
}

/// A shard configuration pointed at [`GATEWAY_URL`] with no waiting
/// between connections.
#[must_use]
pub fn shard_config() -> ShardConfig {
    ShardConfig {
        gateway_url: Some(GATEWAY_URL.to_owned()),
        hello_timeout: Duration::from_secs(5),
        backoff_base: Duration::ZERO,
        backoff_max: Duration::ZERO,
        invalid_session_delay_min: Duration::ZERO,
        invalid_session_delay_max: Duration::ZERO,
        event_buffer: 64,
        ..ShardConfig::new(TEST_TOKEN)
    }
}

// ── REST responses ──

/// A `200` carrying rate-limit headers.
///
/// `bucket = None` omits `X-RateLimit-Bucket`.
#[must_use]
pub fn bucket_response(
    bucket: Option<&str>,
    limit: u32,
    remaining: u32,
    reset_after: Duration,
) -> RestResponse {
    let mut map = HashMap::new();
    if let Some(bucket) = bucket {
        map.insert(headers::BUCKET.to_owned(), bucket.to_owned());
    }
    map.insert(headers::LIMIT.to_owned(), limit.to_string());
    map.insert(headers::REMAINING.to_owned(), remaining.to_string());
    map.insert(
        headers::RESET_AFTER.to_owned(),
        format!("{:.3}", reset_after.as_secs_f64()),
    );
    RestResponse {
        status: 200,
        headers: map,
        body: b"{}".to_vec(),
    }
}

/// A server `429`, without the local marker.
#[must_use]
pub fn server_rate_limited(retry_after: Duration, global: bool) -> RestResponse {
    let mut map = HashMap::new();
    map.insert(
        headers::RETRY_AFTER.to_owned(),
        format!("{:.3}", retry_after.as_secs_f64()),
    );
    if global {
        map.insert(headers::GLOBAL.to_owned(), "true".to_owned());
        map.insert(headers::SCOPE.to_owned(), "global".to_owned());
    }
    let body = json!({
        "message": "You are being rate limited.",
        "retry_after": retry_after.as_secs_f64(),
        "global": global,
    });
    RestResponse {
        status: 429,
        headers: map,
        body: body.to_string().into_bytes(),
    }
}
