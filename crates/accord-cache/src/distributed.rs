//! Redis cache backend, shared across processes.
//!
//! Values are stored as plain Redis strings; expiry uses `PX`.
//! [`compare_and_swap`](Cache::compare_and_swap) runs as a Lua script
//! so the check and the write are a single atomic step on the server.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::debug;

use crate::cache::Cache;
use crate::error::{CacheError, CacheResult};

/// `KEYS[1]` = key, `ARGV[1]` = "1" if an expected value is given,
/// `ARGV[2]` = expected value, `ARGV[3]` = new value, `ARGV[4]` = ttl ms
/// (0 = no expiry).
const COMPARE_AND_SWAP_SCRIPT: &str = r"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '1' then
    if current ~= ARGV[2] then
        return 0
    end
elseif current then
    return 0
end
local ttl = tonumber(ARGV[4])
if ttl > 0 then
    redis.call('SET', KEYS[1], ARGV[3], 'PX', ttl)
else
    redis.call('SET', KEYS[1], ARGV[3])
end
return 1
";

/// Clamp a TTL to whole milliseconds, at least 1.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Cache backed by a Redis server.
///
/// Holds a [`ConnectionManager`], which reconnects on its own and is
/// cheap to clone per command.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    cas_script: redis::Script,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Connect to the Redis server at `url` (e.g. `redis://127.0.0.1/`).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Connection`] if the URL is invalid or the
    /// server is unreachable.
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| CacheError::Connection(format!("invalid Redis URL: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Connection(format!("failed to connect to Redis: {e}")))?;
        debug!("Connected to Redis cache");
        Ok(Self {
            conn,
            cas_script: redis::Script::new(COMPARE_AND_SWAP_SCRIPT),
        })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn evict(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(deleted > 0)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        let swapped: i64 = self
            .cas_script
            .key(key)
            .arg(if expected.is_some() { "1" } else { "0" })
            .arg(expected.unwrap_or_default())
            .arg(value)
            .arg(ttl.map_or(0, ttl_millis))
            .invoke_async(&mut conn)
            .await?;
        Ok(swapped == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_is_at_least_one_millisecond() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2000);
    }

    #[test]
    fn script_checks_before_writing() {
        let get = COMPARE_AND_SWAP_SCRIPT.find("GET").unwrap();
        let set = COMPARE_AND_SWAP_SCRIPT.find("'SET'").unwrap();
        assert!(get < set);
    }

    #[tokio::test]
    async fn connect_rejects_malformed_url() {
        let err = RedisCache::connect("not a url").await.unwrap_err();
        assert!(matches!(err, CacheError::Connection(_)));
    }
}
