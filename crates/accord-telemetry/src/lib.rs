//! Accord Telemetry - logging setup for the Accord binaries.
//!
//! Libraries only emit `tracing` events; the binary installs a subscriber
//! once at startup:
//!
//! ```rust,no_run
//! use accord_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), accord_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("accord_gateway=debug");
//! setup_logging(&config)?;
//! tracing::info!("ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{FileLogConfig, FileRotation, LogConfig, LogFormat, LogTarget, setup_logging};
