//! Cache-backed bucket store.
//!
//! Bucket values live in a [`ScopedCache`] so that several processes can
//! share them through a distributed backend. The endpoint → bucket-id
//! mapping is process-local: it is only a routing hint, and a stale or
//! missing entry costs at most one extra permissive request.
//!
//! All mutations that must be atomic (token decrement, global refill) go
//! through a compare-and-swap loop on the raw cache bytes. Cache failures
//! never reach the caller: reads degrade to [`TakeOutcome::Unknown`] and
//! writes are logged and dropped. Losing every swap round is not a cache
//! failure, and refuses the request for [`CONTENTION_RETRY_AFTER`].
//!
//! Buckets expire from the cache shortly after their reset. A sweep runs
//! from [`BucketStore::try_take`] at most once per sweep interval: it
//! purges expired cache entries and forgets mappings to expired buckets.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use accord_cache::{Cache, CacheResult, ScopedCache};
use dashmap::DashMap;
use tracing::{debug, trace, warn};

use crate::bucket::{RateLimitBucket, now_millis};

/// Attempts at a conditional write before giving up on a mutation.
const MAX_SWAP_ATTEMPTS: usize = 8;

/// Default time a bucket stays cached past its reset.
pub const DEFAULT_EXPIRY_GRACE: Duration = Duration::from_secs(5);

/// Default time between sweeps of expired state.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Retry hint returned when a bucket is too contended to decrement.
pub const CONTENTION_RETRY_AFTER: Duration = Duration::from_millis(50);

/// Upper bound of the pause between lost swap rounds, in milliseconds.
const SWAP_BACKOFF_MAX_MS: u64 = 4;

/// Where a bucket is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BucketKey {
    /// Shared bucket, keyed by server-assigned id.
    Shared(String),
    /// Route-specific bucket, keyed by route key.
    Route(String),
    /// Global bucket, keyed by token identity.
    Global(String),
}

impl BucketKey {
    /// The key inside the store's cache namespace.
    #[must_use]
    pub fn cache_key(&self) -> String {
        match self {
            Self::Shared(id) => format!("bucket:{id}"),
            Self::Route(endpoint) => format!("route:{endpoint}"),
            Self::Global(identity) => format!("global:{identity}"),
        }
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// Result of trying to take a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeOutcome {
    /// A token was taken.
    Taken {
        /// Tokens left afterwards.
        remaining: u32,
    },
    /// No usable bucket state; the request is allowed through.
    Unknown,
    /// The bucket is empty until its reset.
    Exhausted {
        /// Time until the bucket resets.
        retry_after: Duration,
    },
}

impl TakeOutcome {
    /// Whether the request may proceed.
    #[must_use]
    pub fn is_permitted(&self) -> bool {
        !matches!(self, Self::Exhausted { .. })
    }
}

/// Endpoint → shared bucket id, valid until the bucket leaves the cache.
#[derive(Debug, Clone)]
struct RouteMapping {
    id: String,
    expires_at_ms: i64,
}

/// Shared store of rate-limit buckets.
#[derive(Debug)]
pub struct BucketStore {
    cache: ScopedCache,
    routes: DashMap<String, RouteMapping>,
    expiry_grace: Duration,
    sweep_interval: Duration,
    next_sweep_ms: AtomicI64,
}

impl BucketStore {
    /// Create a store over `cache`, with bucket keys under `namespace`.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace is not a valid cache namespace.
    pub fn new(cache: Arc<dyn Cache>, namespace: impl Into<String>) -> CacheResult<Self> {
        Ok(Self::from_scoped(ScopedCache::new(cache, namespace)?))
    }

    /// Create a store over an already scoped cache.
    #[must_use]
    pub fn from_scoped(cache: ScopedCache) -> Self {
        Self {
            cache,
            routes: DashMap::new(),
            expiry_grace: DEFAULT_EXPIRY_GRACE,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            next_sweep_ms: AtomicI64::new(0),
        }
    }

    /// Set how long buckets stay cached past their reset.
    #[must_use]
    pub fn with_expiry_grace(mut self, grace: Duration) -> Self {
        self.expiry_grace = grace;
        self
    }

    /// Set the minimum time between sweeps of expired state.
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Number of endpoints currently mapped to a shared bucket.
    #[must_use]
    pub fn mapped_routes(&self) -> usize {
        self.routes.len()
    }

    /// The key holding the route bucket for `endpoint`.
    #[must_use]
    pub fn resolve(&self, endpoint: &str) -> BucketKey {
        match self.routes.get(endpoint) {
            Some(mapping) => BucketKey::Shared(mapping.id.clone()),
            None => BucketKey::Route(endpoint.to_owned()),
        }
    }

    /// The shared bucket id last observed for `endpoint`.
    #[must_use]
    pub fn bucket_id_for(&self, endpoint: &str) -> Option<String> {
        self.routes.get(endpoint).map(|mapping| mapping.id.clone())
    }

    /// Read a bucket. Missing, corrupt and unreadable entries are `None`.
    pub async fn get(&self, key: &BucketKey) -> Option<RateLimitBucket> {
        match self.cache.get_json(&key.cache_key()).await {
            Ok(bucket) => bucket,
            Err(e) => {
                warn!(bucket = %key, error = %e, "Failed to read rate-limit bucket");
                None
            },
        }
    }

    /// Take a token from the route bucket for `endpoint`.
    ///
    /// Without a bucket, or once the bucket's reset has passed, the
    /// outcome is [`TakeOutcome::Unknown`] and nothing is written: route
    /// buckets are only refilled by response headers.
    pub async fn try_take(&self, endpoint: &str) -> TakeOutcome {
        self.sweep_if_due(now_millis()).await;
        let key = self.resolve(endpoint);
        self.update(&key, |current, now| match current {
            Some(mut bucket) if !bucket.has_reset(now) => {
                if bucket.try_take() {
                    let remaining = bucket.remaining;
                    (Some(bucket), TakeOutcome::Taken { remaining })
                } else {
                    let retry_after = bucket.reset_after(now);
                    (None, TakeOutcome::Exhausted { retry_after })
                }
            },
            _ => (None, TakeOutcome::Unknown),
        })
        .await
    }

    /// Take a token from the global bucket for `identity`.
    ///
    /// The bucket is created on first use and refilled whenever its
    /// window has passed.
    pub async fn try_take_global(
        &self,
        identity: &str,
        limit: u32,
        window: Duration,
    ) -> TakeOutcome {
        let key = BucketKey::Global(identity.to_owned());
        self.update(&key, |current, now| {
            let mut bucket = current.unwrap_or_else(|| RateLimitBucket::global(limit, window, now));
            if bucket.has_reset(now) {
                bucket.refill(window, now);
            }
            if bucket.try_take() {
                let remaining = bucket.remaining;
                (Some(bucket), TakeOutcome::Taken { remaining })
            } else {
                let retry_after = bucket.reset_after(now);
                (None, TakeOutcome::Exhausted { retry_after })
            }
        })
        .await
    }

    /// Empty the global bucket for `identity` until `retry_after` passes.
    ///
    /// Used when Discord reports a global 429 that local accounting did
    /// not predict (for example, another process sharing the token
    /// without sharing the cache).
    pub async fn exhaust_global(&self, identity: &str, limit: u32, retry_after: Duration) {
        let now = now_millis();
        let reset_at = now.saturating_add(duration_millis(retry_after));
        let bucket = RateLimitBucket::new(None, limit, 0, reset_at);
        let key = BucketKey::Global(identity.to_owned());
        debug!(bucket = %key, retry_after_ms = retry_after.as_millis(), "Global bucket exhausted by server");
        self.write(&key, &bucket, now).await;
    }

    /// Overwrite bucket state from response headers.
    ///
    /// With no bucket id the route is not shared: the bucket is stored
    /// under the route key and any shared mapping is forgotten. With an
    /// id the bucket is stored under it, the mapping is updated, and the
    /// entry the endpoint used before is evicted.
    pub async fn reconcile(&self, endpoint: &str, bucket: RateLimitBucket) {
        let now = now_millis();
        match bucket.id.clone() {
            None => {
                if let Some((_, old)) = self.routes.remove(endpoint) {
                    debug!(endpoint, old_bucket = %old.id, "Endpoint no longer reports a shared bucket");
                }
                self.write(&BucketKey::Route(endpoint.to_owned()), &bucket, now)
                    .await;
            },
            Some(id) => {
                let ttl = bucket.cache_ttl(now, self.expiry_grace);
                let mapping = RouteMapping {
                    id: id.clone(),
                    expires_at_ms: now.saturating_add(duration_millis(ttl)),
                };
                let previous = self
                    .routes
                    .insert(endpoint.to_owned(), mapping)
                    .map(|old| old.id);
                match previous {
                    Some(old) if old != id => {
                        debug!(endpoint, old_bucket = %old, bucket = %id, "Bucket id changed");
                        self.evict(&BucketKey::Shared(old)).await;
                    },
                    None => self.evict(&BucketKey::Route(endpoint.to_owned())).await,
                    Some(_) => {},
                }
                self.write(&BucketKey::Shared(id), &bucket, now).await;
            },
        }
    }

    /// Drop expired cache entries and route mappings.
    ///
    /// Returns how many cache entries and mappings were removed. Runs on
    /// its own schedule from [`try_take`](Self::try_take); call it
    /// directly to sweep now.
    pub async fn sweep(&self) -> (usize, usize) {
        let now = now_millis();
        let before = self.routes.len();
        self.routes.retain(|_, mapping| mapping.expires_at_ms > now);
        let routes = before.saturating_sub(self.routes.len());
        let entries = match self.cache.purge_expired().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Failed to purge expired buckets");
                0
            },
        };
        if entries > 0 || routes > 0 {
            debug!(entries, routes, "Swept expired rate-limit state");
        }
        (entries, routes)
    }

    async fn sweep_if_due(&self, now: i64) {
        let due = self.next_sweep_ms.load(Ordering::Relaxed);
        if now < due {
            return;
        }
        let next = now.saturating_add(duration_millis(self.sweep_interval));
        // One caller per interval wins the sweep.
        if self
            .next_sweep_ms
            .compare_exchange(due, next, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            self.sweep().await;
        }
    }

    /// Read-modify-write `key` atomically.
    ///
    /// `apply` gets the current bucket (if any) and the time, and returns
    /// the bucket to store (`None` = no write) and the outcome. Corrupt
    /// entries are passed as `None` but still compared against, so a
    /// concurrent repair is not overwritten.
    async fn update<F>(&self, key: &BucketKey, mut apply: F) -> TakeOutcome
    where
        F: FnMut(Option<RateLimitBucket>, i64) -> (Option<RateLimitBucket>, TakeOutcome),
    {
        let cache_key = key.cache_key();
        for attempt in 0..MAX_SWAP_ATTEMPTS {
            if attempt > 0 {
                let pause = fastrand::u64(0..=SWAP_BACKOFF_MAX_MS);
                tokio::time::sleep(Duration::from_millis(pause)).await;
            }
            let raw = match self.cache.get(&cache_key).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(bucket = %key, error = %e, "Bucket read failed, permitting request");
                    return TakeOutcome::Unknown;
                },
            };
            let current = raw
                .as_deref()
                .and_then(|bytes| serde_json::from_slice::<RateLimitBucket>(bytes).ok());

            let now = now_millis();
            let (next, outcome) = apply(current, now);
            let Some(next) = next else {
                return outcome;
            };

            let bytes = match serde_json::to_vec(&next) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(bucket = %key, error = %e, "Failed to encode bucket");
                    return outcome;
                },
            };
            let ttl = next.cache_ttl(now, self.expiry_grace);
            match self
                .cache
                .compare_and_swap(&cache_key, raw.as_deref(), bytes, Some(ttl))
                .await
            {
                Ok(true) => return outcome,
                Ok(false) => trace!(bucket = %key, "Bucket changed concurrently, retrying"),
                Err(e) => {
                    warn!(bucket = %key, error = %e, "Bucket write failed");
                    return outcome;
                },
            }
        }
        debug!(bucket = %key, "Bucket contention, refusing request");
        TakeOutcome::Exhausted {
            retry_after: CONTENTION_RETRY_AFTER,
        }
    }

    async fn write(&self, key: &BucketKey, bucket: &RateLimitBucket, now: i64) {
        let ttl = bucket.cache_ttl(now, self.expiry_grace);
        if let Err(e) = self.cache.set_json(&key.cache_key(), bucket, Some(ttl)).await {
            warn!(bucket = %key, error = %e, "Bucket write failed");
        }
    }

    async fn evict(&self, key: &BucketKey) {
        if let Err(e) = self.cache.evict(&key.cache_key()).await {
            warn!(bucket = %key, error = %e, "Bucket eviction failed");
        }
    }
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_cache::{CacheError, MemoryCache};
    use async_trait::async_trait;

    fn store() -> BucketStore {
        BucketStore::new(Arc::new(MemoryCache::new()), "ratelimit").unwrap()
    }

    fn future_reset() -> i64 {
        now_millis().saturating_add(60_000)
    }

    /// A cache whose every operation fails.
    struct BrokenCache;

    #[async_trait]
    impl Cache for BrokenCache {
        async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
            Err(CacheError::Connection("down".into()))
        }

        async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> CacheResult<()> {
            Err(CacheError::Connection("down".into()))
        }

        async fn evict(&self, _key: &str) -> CacheResult<bool> {
            Err(CacheError::Connection("down".into()))
        }

        async fn compare_and_swap(
            &self,
            _key: &str,
            _expected: Option<&[u8]>,
            _value: Vec<u8>,
            _ttl: Option<Duration>,
        ) -> CacheResult<bool> {
            Err(CacheError::Connection("down".into()))
        }
    }

    // ── Keys ──

    #[test]
    fn cache_keys_are_prefixed_by_kind() {
        assert_eq!(BucketKey::Shared("b1".into()).cache_key(), "bucket:b1");
        assert_eq!(
            BucketKey::Route("GET /gateway".into()).cache_key(),
            "route:GET /gateway"
        );
        assert_eq!(BucketKey::Global("abc".into()).cache_key(), "global:abc");
    }

    // ── Route buckets ──

    #[tokio::test]
    async fn unknown_route_is_permitted_without_writes() {
        let store = store();
        assert_eq!(store.try_take("GET /users/@me").await, TakeOutcome::Unknown);
        assert_eq!(store.try_take("GET /users/@me").await, TakeOutcome::Unknown);
        assert!(
            store
                .get(&BucketKey::Route("GET /users/@me".into()))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn route_bucket_decrements_until_exhausted() {
        let store = store();
        let endpoint = "POST /channels/1/messages";
        store
            .reconcile(endpoint, RateLimitBucket::new(None, 5, 2, future_reset()))
            .await;

        assert_eq!(
            store.try_take(endpoint).await,
            TakeOutcome::Taken { remaining: 1 }
        );
        assert_eq!(
            store.try_take(endpoint).await,
            TakeOutcome::Taken { remaining: 0 }
        );
        let outcome = store.try_take(endpoint).await;
        assert!(matches!(outcome, TakeOutcome::Exhausted { retry_after } if retry_after > Duration::ZERO));
        assert!(!outcome.is_permitted());

        // Refusal has no side effects.
        let bucket = store.get(&BucketKey::Route(endpoint.into())).await.unwrap();
        assert_eq!(bucket.remaining, 0);
    }

    #[tokio::test]
    async fn route_bucket_past_reset_is_not_refilled_locally() {
        let store = store();
        let endpoint = "GET /channels/1";
        store
            .reconcile(endpoint, RateLimitBucket::new(None, 5, 0, now_millis().saturating_sub(10)))
            .await;
        assert_eq!(store.try_take(endpoint).await, TakeOutcome::Unknown);
        let bucket = store.get(&BucketKey::Route(endpoint.into())).await.unwrap();
        assert_eq!(bucket.remaining, 0);
    }

    #[tokio::test]
    async fn concurrent_takes_never_overdraw() {
        let store = Arc::new(store());
        let endpoint = "POST /channels/9/messages";
        store
            .reconcile(endpoint, RateLimitBucket::new(None, 10, 10, future_reset()))
            .await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.try_take(endpoint).await }));
        }
        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }
        let taken = outcomes
            .iter()
            .filter(|o| matches!(o, TakeOutcome::Taken { .. }))
            .count();

        let bucket = store.get(&BucketKey::Route(endpoint.into())).await.unwrap();
        // Every successful take is reflected exactly once.
        assert_eq!(usize::try_from(bucket.remaining).unwrap(), 10_usize.saturating_sub(taken));
        assert!(outcomes.iter().all(TakeOutcome::is_permitted));
    }

    /// Wraps a [`MemoryCache`] and loses the next `losses` swaps.
    struct ContendedCache {
        inner: MemoryCache,
        losses: std::sync::atomic::AtomicUsize,
    }

    impl ContendedCache {
        fn losing(losses: usize) -> Self {
            Self {
                inner: MemoryCache::new(),
                losses: std::sync::atomic::AtomicUsize::new(losses),
            }
        }
    }

    #[async_trait]
    impl Cache for ContendedCache {
        async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
            self.inner.set(key, value, ttl).await
        }

        async fn evict(&self, key: &str) -> CacheResult<bool> {
            self.inner.evict(key).await
        }

        async fn compare_and_swap(
            &self,
            key: &str,
            expected: Option<&[u8]>,
            value: Vec<u8>,
            ttl: Option<Duration>,
        ) -> CacheResult<bool> {
            let lost = self
                .losses
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if lost {
                return Ok(false);
            }
            self.inner.compare_and_swap(key, expected, value, ttl).await
        }
    }

    #[tokio::test]
    async fn take_succeeds_after_lost_swap_rounds() {
        let cache = Arc::new(ContendedCache::losing(MAX_SWAP_ATTEMPTS.saturating_sub(1)));
        let store = BucketStore::new(cache, "ratelimit").unwrap();
        let endpoint = "POST /channels/4/messages";
        store
            .reconcile(endpoint, RateLimitBucket::new(None, 5, 5, future_reset()))
            .await;

        assert_eq!(
            store.try_take(endpoint).await,
            TakeOutcome::Taken { remaining: 4 }
        );
    }

    #[tokio::test]
    async fn contended_bucket_refuses_instead_of_permitting() {
        let cache = Arc::new(ContendedCache::losing(MAX_SWAP_ATTEMPTS));
        let store = BucketStore::new(cache, "ratelimit").unwrap();
        let endpoint = "POST /channels/4/messages";
        store
            .reconcile(endpoint, RateLimitBucket::new(None, 5, 5, future_reset()))
            .await;

        let outcome = store.try_take(endpoint).await;
        assert_eq!(
            outcome,
            TakeOutcome::Exhausted {
                retry_after: CONTENTION_RETRY_AFTER
            }
        );
        assert!(!outcome.is_permitted());
        let bucket = store.get(&BucketKey::Route(endpoint.into())).await.unwrap();
        assert_eq!(bucket.remaining, 5);

        // The contention has passed; the token is still there.
        assert_eq!(
            store.try_take(endpoint).await,
            TakeOutcome::Taken { remaining: 4 }
        );
    }

    // ── Expiry ──

    #[tokio::test]
    async fn expired_buckets_and_mappings_are_swept() {
        let memory = Arc::new(MemoryCache::new());
        let store = BucketStore::new(Arc::clone(&memory) as Arc<dyn Cache>, "ratelimit")
            .unwrap()
            .with_expiry_grace(Duration::from_millis(1));
        let reset = now_millis().saturating_add(5);
        for channel in 0..200_u32 {
            let endpoint = format!("POST /channels/{channel}/messages");
            let id = channel.is_multiple_of(2).then(|| format!("b{channel}"));
            store
                .reconcile(&endpoint, RateLimitBucket::new(id, 5, 4, reset))
                .await;
        }
        assert_eq!(memory.len(), 200);
        assert_eq!(store.mapped_routes(), 100);

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(store.try_take("GET /users/@me").await, TakeOutcome::Unknown);
        assert_eq!(memory.len(), 0);
        assert_eq!(store.mapped_routes(), 0);
        assert_eq!(
            store.resolve("POST /channels/0/messages"),
            BucketKey::Route("POST /channels/0/messages".into())
        );
    }

    #[tokio::test]
    async fn sweep_waits_for_its_interval() {
        let memory = Arc::new(MemoryCache::new());
        let store = BucketStore::new(Arc::clone(&memory) as Arc<dyn Cache>, "ratelimit")
            .unwrap()
            .with_expiry_grace(Duration::from_millis(1))
            .with_sweep_interval(Duration::from_secs(3600));

        // The first take sweeps an empty store and schedules the next.
        store.try_take("GET /users/@me").await;
        store
            .reconcile(
                "GET /channels/1",
                RateLimitBucket::new(Some("A".into()), 1, 1, now_millis().saturating_add(5)),
            )
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        store.try_take("GET /users/@me").await;
        assert_eq!(memory.len(), 1);
        assert_eq!(store.mapped_routes(), 1);

        assert_eq!(store.sweep().await, (1, 1));
        assert_eq!(memory.len(), 0);
    }

    // ── Reconcile ──

    #[tokio::test]
    async fn reconcile_with_bucket_id_maps_endpoint() {
        let store = store();
        let endpoint = "PATCH /channels/1/messages/{id}";
        store
            .reconcile(endpoint, RateLimitBucket::new(None, 5, 5, future_reset()))
            .await;
        store
            .reconcile(
                endpoint,
                RateLimitBucket::new(Some("A".into()), 5, 4, future_reset()),
            )
            .await;

        assert_eq!(store.resolve(endpoint), BucketKey::Shared("A".into()));
        assert_eq!(store.bucket_id_for(endpoint).as_deref(), Some("A"));
        // The endpoint-keyed entry it replaced is gone.
        assert!(store.get(&BucketKey::Route(endpoint.into())).await.is_none());
    }

    #[tokio::test]
    async fn reconcile_new_id_evicts_old_shared_bucket() {
        let store = store();
        let endpoint = "DELETE /channels/1/messages/{id}";
        store
            .reconcile(
                endpoint,
                RateLimitBucket::new(Some("A".into()), 5, 0, future_reset()),
            )
            .await;
        store
            .reconcile(
                endpoint,
                RateLimitBucket::new(Some("B".into()), 3, 3, future_reset()),
            )
            .await;

        assert_eq!(store.resolve(endpoint), BucketKey::Shared("B".into()));
        assert!(store.get(&BucketKey::Shared("A".into())).await.is_none());
        assert_eq!(
            store.try_take(endpoint).await,
            TakeOutcome::Taken { remaining: 2 }
        );
    }

    #[tokio::test]
    async fn reconcile_without_id_clears_mapping() {
        let store = store();
        let endpoint = "GET /guilds/1/roles";
        store
            .reconcile(
                endpoint,
                RateLimitBucket::new(Some("A".into()), 5, 0, future_reset()),
            )
            .await;
        store
            .reconcile(endpoint, RateLimitBucket::new(None, 5, 5, future_reset()))
            .await;

        assert_eq!(store.resolve(endpoint), BucketKey::Route(endpoint.into()));
        assert_eq!(
            store.try_take(endpoint).await,
            TakeOutcome::Taken { remaining: 4 }
        );
    }

    // ── Global bucket ──

    #[tokio::test]
    async fn global_bucket_is_created_lazily_and_exhausts() {
        let store = store();
        let window = Duration::from_secs(60);
        assert_eq!(
            store.try_take_global("tok", 2, window).await,
            TakeOutcome::Taken { remaining: 1 }
        );
        assert_eq!(
            store.try_take_global("tok", 2, window).await,
            TakeOutcome::Taken { remaining: 0 }
        );
        assert!(matches!(
            store.try_take_global("tok", 2, window).await,
            TakeOutcome::Exhausted { .. }
        ));
        // Identities are independent.
        assert!(store.try_take_global("other", 2, window).await.is_permitted());
    }

    #[tokio::test]
    async fn global_bucket_refills_after_window() {
        let store = store();
        let window = Duration::from_millis(30);
        assert!(store.try_take_global("tok", 1, window).await.is_permitted());
        assert!(!store.try_take_global("tok", 1, window).await.is_permitted());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            store.try_take_global("tok", 1, window).await,
            TakeOutcome::Taken { remaining: 0 }
        );
    }

    #[tokio::test]
    async fn exhaust_global_blocks_until_retry_after() {
        let store = store();
        store
            .exhaust_global("tok", 50, Duration::from_secs(30))
            .await;
        match store.try_take_global("tok", 50, Duration::from_secs(1)).await {
            TakeOutcome::Exhausted { retry_after } => {
                assert!(retry_after > Duration::from_secs(25));
            },
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    // ── Cache failures ──

    #[tokio::test]
    async fn broken_cache_is_permissive() {
        let store = BucketStore::new(Arc::new(BrokenCache), "ratelimit").unwrap();
        assert_eq!(store.try_take("GET /x").await, TakeOutcome::Unknown);
        assert_eq!(
            store
                .try_take_global("tok", 1, Duration::from_secs(1))
                .await,
            TakeOutcome::Unknown
        );
        // Writes are swallowed.
        store
            .reconcile("GET /x", RateLimitBucket::new(Some("A".into()), 1, 0, future_reset()))
            .await;
        store.exhaust_global("tok", 1, Duration::from_secs(1)).await;
        assert!(store.get(&BucketKey::Shared("A".into())).await.is_none());
    }

    #[tokio::test]
    async fn corrupt_entry_is_treated_as_missing() {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let store = BucketStore::new(Arc::clone(&cache), "ratelimit").unwrap();
        cache
            .set("ratelimit:global:tok", b"not json".to_vec(), None)
            .await
            .unwrap();
        assert_eq!(
            store
                .try_take_global("tok", 3, Duration::from_secs(60))
                .await,
            TakeOutcome::Taken { remaining: 2 }
        );
    }
}
