//! The rate-limit policy wrapped around every REST call.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::bucket::now_millis;
use crate::error::RateLimitResult;
use crate::headers::RateLimitHeaders;
use crate::store::{BucketStore, DEFAULT_EXPIRY_GRACE, TakeOutcome};
use crate::transport::{HttpTransport, RequestContext, RestRequest, RestResponse};

/// Global limit settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per window for one token.
    pub global_limit: u32,
    /// Length of the global window.
    pub global_window: Duration,
    /// How long buckets stay cached past their reset.
    pub expiry_grace: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_limit: 50,
            global_window: Duration::from_secs(1),
            expiry_grace: DEFAULT_EXPIRY_GRACE,
        }
    }
}

/// Gates requests through the global and route buckets.
///
/// Cloning shares the store, so every clone sees the same buckets.
#[derive(Clone)]
pub struct RateLimitPolicy {
    store: Arc<BucketStore>,
    transport: Arc<dyn HttpTransport>,
    config: RateLimitConfig,
}

impl std::fmt::Debug for RateLimitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitPolicy")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RateLimitPolicy {
    /// Create a policy.
    #[must_use]
    pub fn new(
        store: Arc<BucketStore>,
        transport: Arc<dyn HttpTransport>,
        config: RateLimitConfig,
    ) -> Self {
        Self {
            store,
            transport,
            config,
        }
    }

    /// The bucket store.
    #[must_use]
    pub fn store(&self) -> &Arc<BucketStore> {
        &self.store
    }

    /// The global limit settings.
    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Run `request` through the limiter.
    ///
    /// Returns a synthetic 429 (see [`RestResponse::rate_limited`])
    /// without touching the network when a bucket is exhausted; otherwise
    /// sends the request and reconciles buckets from the response.
    ///
    /// # Errors
    ///
    /// Only transport failures are returned as errors.
    pub async fn execute(
        &self,
        request: RestRequest,
        context: &RequestContext,
    ) -> RateLimitResult<RestResponse> {
        if !context.global_exempt
            && let TakeOutcome::Exhausted { retry_after } = self
                .store
                .try_take_global(
                    &context.token_identity,
                    self.config.global_limit,
                    self.config.global_window,
                )
                .await
        {
            debug!(
                endpoint = %context.endpoint,
                retry_after_ms = retry_after.as_millis(),
                "Global rate limit reached locally"
            );
            return Ok(RestResponse::rate_limited(retry_after, true));
        }

        if let TakeOutcome::Exhausted { retry_after } =
            self.store.try_take(&context.endpoint).await
        {
            debug!(
                endpoint = %context.endpoint,
                retry_after_ms = retry_after.as_millis(),
                "Route rate limit reached locally"
            );
            return Ok(RestResponse::rate_limited(retry_after, false));
        }

        let response = self.transport.send(request, context).await?;
        self.observe(context, &response).await;
        Ok(response)
    }

    /// Feed a server response back into bucket state.
    async fn observe(&self, context: &RequestContext, response: &RestResponse) {
        let headers = RateLimitHeaders::parse(&response.headers);

        if response.is_rate_limited() {
            let retry_after = headers.retry_after.unwrap_or(Duration::ZERO);
            warn!(
                endpoint = %context.endpoint,
                global = headers.global,
                scope = ?headers.scope,
                retry_after_ms = retry_after.as_millis(),
                "Discord returned 429"
            );
            if headers.global {
                self.store
                    .exhaust_global(
                        &context.token_identity,
                        self.config.global_limit,
                        retry_after,
                    )
                    .await;
                return;
            }
        }

        if let Some(bucket) = headers.to_bucket(now_millis()) {
            self.store.reconcile(&context.endpoint, bucket).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::RateLimitBucket;
    use crate::store::BucketKey;
    use accord_cache::MemoryCache;
    use async_trait::async_trait;
    use reqwest::Method;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays queued responses and counts calls.
    #[derive(Default)]
    struct Scripted {
        responses: Mutex<VecDeque<RestResponse>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn push(&self, status: u16, headers: &[(&str, &str)]) {
            self.responses.lock().unwrap().push_back(RestResponse {
                status,
                headers: headers
                    .iter()
                    .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                    .collect(),
                body: b"{}".to_vec(),
            });
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpTransport for Scripted {
        async fn send(
            &self,
            _request: RestRequest,
            _context: &RequestContext,
        ) -> RateLimitResult<RestResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(RestResponse {
                    status: 200,
                    headers: HashMap::new(),
                    body: Vec::new(),
                }))
        }
    }

    fn policy(transport: Arc<Scripted>, config: RateLimitConfig) -> RateLimitPolicy {
        let store = BucketStore::new(Arc::new(MemoryCache::new()), "rl").unwrap();
        RateLimitPolicy::new(Arc::new(store), transport, config)
    }

    fn request(path: &str) -> (RestRequest, RequestContext) {
        let request = RestRequest::new(Method::POST, path);
        let context = RequestContext::for_request(&request, "token");
        (request, context)
    }

    #[tokio::test]
    async fn route_exhaustion_short_circuits() {
        let transport = Arc::new(Scripted::default());
        transport.push(
            200,
            &[
                ("x-ratelimit-limit", "5"),
                ("x-ratelimit-remaining", "0"),
                ("x-ratelimit-reset-after", "10"),
            ],
        );
        let policy = policy(Arc::clone(&transport), RateLimitConfig::default());

        let (req, ctx) = request("/channels/1/messages");
        assert_eq!(policy.execute(req, &ctx).await.unwrap().status, 200);

        let (req, ctx) = request("/channels/1/messages");
        let response = policy.execute(req, &ctx).await.unwrap();
        assert_eq!(response.status, 429);
        assert!(response.is_local());
        assert!(!response.is_global());
        assert!(response.retry_after().unwrap() > Duration::from_secs(9));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn global_exhaustion_short_circuits() {
        let transport = Arc::new(Scripted::default());
        let config = RateLimitConfig {
            global_limit: 2,
            global_window: Duration::from_secs(60),
            ..RateLimitConfig::default()
        };
        let policy = policy(Arc::clone(&transport), config);

        for path in ["/channels/1/messages", "/channels/2/messages"] {
            let (req, ctx) = request(path);
            assert_eq!(policy.execute(req, &ctx).await.unwrap().status, 200);
        }
        let (req, ctx) = request("/channels/3/messages");
        let response = policy.execute(req, &ctx).await.unwrap();
        assert!(response.is_local());
        assert!(response.is_global());
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn exempt_routes_skip_global_bucket() {
        let transport = Arc::new(Scripted::default());
        let config = RateLimitConfig {
            global_limit: 1,
            global_window: Duration::from_secs(60),
            ..RateLimitConfig::default()
        };
        let policy = policy(Arc::clone(&transport), config);

        let (req, ctx) = request("/channels/1/messages");
        assert_eq!(policy.execute(req, &ctx).await.unwrap().status, 200);
        for _ in 0..3 {
            let (req, ctx) = request("/interactions/5/tok/callback");
            assert_eq!(policy.execute(req, &ctx).await.unwrap().status, 200);
        }
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test]
    async fn server_global_429_exhausts_global_bucket() {
        let transport = Arc::new(Scripted::default());
        transport.push(
            429,
            &[("retry-after", "30"), ("x-ratelimit-global", "true")],
        );
        let policy = policy(Arc::clone(&transport), RateLimitConfig::default());

        let (req, ctx) = request("/channels/1/messages");
        let response = policy.execute(req, &ctx).await.unwrap();
        assert!(!response.is_local());

        let (req, ctx) = request("/guilds/1/roles");
        let response = policy.execute(req, &ctx).await.unwrap();
        assert!(response.is_local());
        assert!(response.is_global());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn shared_bucket_is_learned_from_headers() {
        let transport = Arc::new(Scripted::default());
        transport.push(
            200,
            &[
                ("x-ratelimit-bucket", "shared-1"),
                ("x-ratelimit-limit", "5"),
                ("x-ratelimit-remaining", "4"),
                ("x-ratelimit-reset-after", "5"),
            ],
        );
        let policy = policy(Arc::clone(&transport), RateLimitConfig::default());
        let (req, ctx) = request("/channels/1/messages");
        policy.execute(req, &ctx).await.unwrap();

        assert_eq!(
            policy.store().resolve(&ctx.endpoint),
            BucketKey::Shared("shared-1".into())
        );
        let bucket: RateLimitBucket = policy
            .store()
            .get(&BucketKey::Shared("shared-1".into()))
            .await
            .unwrap();
        assert_eq!(bucket.remaining, 4);
    }

    #[tokio::test]
    async fn unknown_endpoint_permits_concurrent_requests() {
        let transport = Arc::new(Scripted::default());
        let policy = policy(Arc::clone(&transport), RateLimitConfig::default());

        let (a, ctx_a) = request("/channels/1/messages");
        let (b, ctx_b) = request("/channels/1/messages");
        let (ra, rb) = tokio::join!(policy.execute(a, &ctx_a), policy.execute(b, &ctx_b));
        assert_eq!(ra.unwrap().status, 200);
        assert_eq!(rb.unwrap().status, 200);
        assert_eq!(transport.calls(), 2);
    }
}
