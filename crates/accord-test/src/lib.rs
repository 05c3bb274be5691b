//! Accord Test - shared test utilities.
//!
//! Mock transports and fixtures used by the integration tests:
//!
//! - [`MockGateway`] / [`MockServer`]: an in-process gateway. The shard
//!   connects through the mock; the test plays Discord on the
//!   [`ServerConnection`] it accepts.
//! - [`MockHttp`]: a scripted REST transport that records requests and
//!   peak concurrency.
//! - [`fixtures`]: gateway frames, shard configs and rate-limit
//!   responses.
//!
//! ```rust,ignore
//! let (gateway, mut server) = MockGateway::new();
//! let (mut shard, mut events) = Shard::new(shard_config(), Arc::new(gateway), cancel);
//! tokio::spawn(async move { shard.run().await });
//!
//! let mut conn = server.accept().await.unwrap();
//! conn.send_text(hello(QUIET_HEARTBEAT_MS));
//! let identify = conn.recv_command().await.unwrap();
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
