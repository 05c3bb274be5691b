//! In-memory cache backend.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::cache::Cache;
use crate::error::{CacheError, CacheResult};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Vec<u8>, ttl: Option<Duration>, now: Instant) -> Self {
        Self {
            value,
            expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Map size below which writes never sweep.
const MIN_SWEEP_LEN: usize = 1024;

/// Process-local cache backed by a `HashMap`.
///
/// Expired entries are hidden from reads immediately. They are removed
/// by [`Cache::purge_expired`], and by a sweep on insert once the map
/// has doubled since the last sweep.
#[derive(Debug)]
pub struct MemoryCache {
    data: RwLock<HashMap<String, Entry>>,
    sweep_at: AtomicUsize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            sweep_at: AtomicUsize::new(MIN_SWEEP_LEN),
        }
    }
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert under the write lock, sweeping first if the map has grown
    /// past the threshold.
    fn insert(&self, data: &mut HashMap<String, Entry>, key: &str, entry: Entry, now: Instant) {
        if data.len() >= self.sweep_at.load(Ordering::Relaxed) {
            data.retain(|_, entry| entry.is_live(now));
            let next = data.len().saturating_mul(2).max(MIN_SWEEP_LEN);
            self.sweep_at.store(next, Ordering::Relaxed);
        }
        data.insert(key.to_owned(), entry);
    }

    /// Number of stored entries, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().map_or(0, |data| data.len())
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let data = self
            .data
            .read()
            .map_err(|e| CacheError::Internal(e.to_string()))?;
        Ok(data
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        let now = Instant::now();
        let mut data = self
            .data
            .write()
            .map_err(|e| CacheError::Internal(e.to_string()))?;
        self.insert(&mut data, key, Entry::new(value, ttl, now), now);
        Ok(())
    }

    async fn evict(&self, key: &str) -> CacheResult<bool> {
        let now = Instant::now();
        let mut data = self
            .data
            .write()
            .map_err(|e| CacheError::Internal(e.to_string()))?;
        Ok(data.remove(key).is_some_and(|entry| entry.is_live(now)))
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> CacheResult<bool> {
        let now = Instant::now();
        let mut data = self
            .data
            .write()
            .map_err(|e| CacheError::Internal(e.to_string()))?;
        let current = data
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.as_slice());
        if current != expected {
            return Ok(false);
        }
        self.insert(&mut data, key, Entry::new(value, ttl, now), now);
        Ok(true)
    }

    async fn purge_expired(&self) -> CacheResult<usize> {
        let now = Instant::now();
        let mut data = self
            .data
            .write()
            .map_err(|e| CacheError::Internal(e.to_string()))?;
        let before = data.len();
        data.retain(|_, entry| entry.is_live(now));
        Ok(before.saturating_sub(data.len()))
    }
}
