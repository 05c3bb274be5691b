//! Accord Rate Limit: gatekeeping for Discord REST calls.
//!
//! Every outbound request passes two checks before it reaches the
//! network, and the response's headers feed back into bucket state:
//!
//! ```text
//! RestClient ──► RateLimitPolicy ──► HttpTransport ──► Discord
//!                   │    ▲
//!          try_take │    │ reconcile(headers)
//!                   ▼    │
//!                 BucketStore ──► ScopedCache ──► dyn Cache (memory | redis)
//! ```
//!
//! 1. The **global** bucket (per token) is refilled on a fixed window and
//!    decremented unless the route is exempt (interaction callbacks and
//!    token-bearing webhooks).
//! 2. The **route** bucket (keyed by the server-assigned bucket id once
//!    known, else by the route key) is decremented while it has tokens.
//!    Route buckets are only advanced by response headers.
//!
//! When either is exhausted the policy answers with a synthetic 429
//! carrying `Retry-After`, so callers handle local and server limits
//! the same way. Cache failures never fail a request.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod bucket;
pub mod client;
pub mod error;
pub mod headers;
pub mod policy;
pub mod route;
pub mod store;
pub mod transport;

pub use bucket::RateLimitBucket;
pub use client::RestClient;
pub use error::{RateLimitError, RateLimitResult};
pub use headers::{RateLimitHeaders, RateLimitScope};
pub use policy::{RateLimitConfig, RateLimitPolicy};
pub use reqwest::Method;
pub use route::{is_global_exempt, route_key};
pub use store::{BucketKey, BucketStore, TakeOutcome};
pub use transport::{
    HttpTransport, RequestContext, ReqwestTransport, RestRequest, RestResponse, token_identity,
};
