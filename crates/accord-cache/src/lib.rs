//! Accord Cache: the storage seam behind rate-limit bucket state.
//!
//! The [`Cache`] trait is a byte-level `get` / `set` (with expiry) /
//! `evict` store plus one atomic primitive, [`Cache::compare_and_swap`],
//! which callers build read-modify-write updates on. Two backends:
//!
//! - **In-memory** ([`MemoryCache`], always available): process-local,
//!   for single-process bots and tests.
//! - **Redis** (`RedisCache`, behind the `redis` feature): shared between
//!   processes so several bot instances draw from the same buckets.
//!
//! Consumers hold an `Arc<dyn Cache>` and never learn which backend is in
//! use. [`ScopedCache`] pre-binds a key namespace and adds typed JSON
//! helpers.
//!
//! # Feature Flags
//!
//! - **`redis`**: Redis backend via `redis::aio::ConnectionManager`

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod cache;
pub mod error;
pub mod memory;

#[cfg(feature = "redis")]
pub mod distributed;

pub use cache::{Cache, ScopedCache};
pub use error::{CacheError, CacheResult};
pub use memory::MemoryCache;

#[cfg(feature = "redis")]
pub use distributed::RedisCache;
