//! Cache trait and the namespaced, typed wrapper around it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{CacheError, CacheResult};

/// Validate that a namespace is usable as a key prefix.
fn validate_namespace(namespace: &str) -> CacheResult<()> {
    if namespace.is_empty() {
        return Err(CacheError::InvalidKey(
            "namespace must not be empty".into(),
        ));
    }
    if namespace.chars().any(char::is_whitespace) {
        return Err(CacheError::InvalidKey(
            "namespace must not contain whitespace".into(),
        ));
    }
    Ok(())
}

/// Validate that a key is safe for storage.
fn validate_key(key: &str) -> CacheResult<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key must not be empty".into()));
    }
    if key.contains('\0') {
        return Err(CacheError::InvalidKey(
            "key must not contain null bytes".into(),
        ));
    }
    Ok(())
}

/// Byte-level cache with per-entry expiry.
///
/// Implementations must make [`compare_and_swap`](Cache::compare_and_swap)
/// atomic with respect to every other operation on the same key, across
/// all clients of the backend.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Get a value. Returns `None` if the key is absent or expired.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Set a value, replacing any existing one.
    ///
    /// With `ttl = None` the entry never expires.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()>;

    /// Remove a key. Returns `true` if it existed.
    async fn evict(&self, key: &str) -> CacheResult<bool>;

    /// Write `value` only if the current value equals `expected`.
    ///
    /// `expected = None` means "only if the key is absent". Returns
    /// `true` if the write happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> CacheResult<bool>;

    /// Drop expired entries still held by the backend. Returns how many
    /// were removed.
    ///
    /// Backends that expire keys on their own keep this default.
    async fn purge_expired(&self) -> CacheResult<usize> {
        Ok(0)
    }
}

/// A cache view with a pre-bound namespace.
///
/// Keys are stored as `"{namespace}:{key}"`. Cheap to clone.
#[derive(Clone)]
pub struct ScopedCache {
    inner: Arc<dyn Cache>,
    namespace: String,
}

impl std::fmt::Debug for ScopedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedCache")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl ScopedCache {
    /// Bind `inner` to `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidKey`] if the namespace is empty or
    /// contains whitespace.
    pub fn new(inner: Arc<dyn Cache>, namespace: impl Into<String>) -> CacheResult<Self> {
        let namespace = namespace.into();
        validate_namespace(&namespace)?;
        Ok(Self { inner, namespace })
    }

    /// The bound namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn full_key(&self, key: &str) -> CacheResult<String> {
        validate_key(key)?;
        Ok(format!("{}:{key}", self.namespace))
    }

    /// Get raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the backend fails.
    pub async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let key = self.full_key(key)?;
        self.inner.get(&key).await
    }

    /// Set raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the backend fails.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        let key = self.full_key(key)?;
        self.inner.set(&key, value, ttl).await
    }

    /// Evict a key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the backend fails.
    pub async fn evict(&self, key: &str) -> CacheResult<bool> {
        let key = self.full_key(key)?;
        self.inner.evict(&key).await
    }

    /// Conditional write, see [`Cache::compare_and_swap`].
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the backend fails.
    pub async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> CacheResult<bool> {
        let key = self.full_key(key)?;
        self.inner.compare_and_swap(&key, expected, value, ttl).await
    }

    /// Purge expired entries across the whole backend, not only this
    /// namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn purge_expired(&self) -> CacheResult<usize> {
        self.inner.purge_expired().await
    }

    /// Get a JSON-encoded value.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialization`] if the stored bytes do not
    /// decode as `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Set a JSON-encoded value.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the backend fails.
    pub async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, bytes, ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCache;

    fn scoped(ns: &str) -> ScopedCache {
        ScopedCache::new(Arc::new(MemoryCache::new()), ns).unwrap()
    }

    #[test]
    fn rejects_bad_namespaces() {
        let inner: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        assert!(ScopedCache::new(Arc::clone(&inner), "").is_err());
        assert!(ScopedCache::new(Arc::clone(&inner), "rate limit").is_err());
        assert!(ScopedCache::new(inner, "ratelimit").is_ok());
    }

    #[tokio::test]
    async fn rejects_empty_key() {
        let cache = scoped("ns");
        let err = cache.get("").await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let inner: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let a = ScopedCache::new(Arc::clone(&inner), "a").unwrap();
        let b = ScopedCache::new(Arc::clone(&inner), "b").unwrap();

        a.set("k", b"one".to_vec(), None).await.unwrap();
        assert_eq!(a.get("k").await.unwrap(), Some(b"one".to_vec()));
        assert_eq!(b.get("k").await.unwrap(), None);
        assert_eq!(inner.get("a:k").await.unwrap(), Some(b"one".to_vec()));
    }

    #[tokio::test]
    async fn json_helpers() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Entry {
            remaining: u32,
        }

        let cache = scoped("json");
        cache
            .set_json("bucket", &Entry { remaining: 4 }, None)
            .await
            .unwrap();
        let entry: Option<Entry> = cache.get_json("bucket").await.unwrap();
        assert_eq!(entry, Some(Entry { remaining: 4 }));

        cache.set("garbage", b"{not json".to_vec(), None).await.unwrap();
        let err = cache.get_json::<Entry>("garbage").await.unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)));
    }

    #[tokio::test]
    async fn scoped_compare_and_swap() {
        let cache = scoped("cas");
        assert!(cache.compare_and_swap("k", None, b"1".to_vec(), None).await.unwrap());
        assert!(!cache.compare_and_swap("k", None, b"2".to_vec(), None).await.unwrap());
        assert!(
            cache
                .compare_and_swap("k", Some(b"1"), b"2".to_vec(), None)
                .await
                .unwrap()
        );
        assert_eq!(cache.get("k").await.unwrap(), Some(b"2".to_vec()));
    }
}
