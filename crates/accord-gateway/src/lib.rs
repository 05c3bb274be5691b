//! Accord Gateway: a resilient Discord gateway client.
//!
//! A [`Shard`] keeps one gateway session alive across socket failures:
//!
//! ```text
//!             ┌──────────── Shard (event loop) ────────────┐
//! Transport ─►│ FrameStream ─► decode ─► SessionState       │─► mpsc<Event>
//!             │                   │         (session id,    │
//!             │                   ▼          sequence)      │
//!             │            HeartbeatState ◄── heartbeat task│
//!             │                   │                         │
//!             │ FrameSink ◄── writer task ◄── mpsc<Frame> ◄─┼── ShardSender
//!             └─────────────────────────────────────────────┘
//! ```
//!
//! - Hello starts the heartbeat; Identify or Resume follows.
//! - A missed ACK, a resumable close code or op 7 leads to a resume on
//!   the URL from `READY`.
//! - Invalid sessions, re-identify close codes and exhausted resume
//!   attempts lead to a fresh Identify.
//! - Fatal close codes (bad token, intents, sharding, API version) stop
//!   the shard with a typed error.
//!
//! The [`protocol`] and [`voice`] modules hold the wire codec for the
//! main gateway and the voice gateway.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod backoff;
pub mod close_code;
pub mod config;
pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod intents;
pub mod protocol;
pub mod session;
pub mod shard;
pub mod voice;

pub use close_code::{CloseAction, GatewayCloseCode, VoiceCloseCode};
pub use config::ShardConfig;
pub use connection::{Connection, Frame, FrameSink, FrameStream, Transport, TungsteniteTransport};
pub use error::{GatewayError, GatewayResult};
pub use heartbeat::HeartbeatState;
pub use intents::Intents;
pub use protocol::{DecodeError, DispatchEvent, GatewayCommand, GatewayEvent, GatewayPayload};
pub use session::{Sequence, SessionState};
pub use shard::{Event, Shard, ShardSender, ShardState};
pub use voice::{VoiceCommand, VoiceEvent};
