//! Configuration for the Accord runtime.
//!
//! A single [`Config`] is read from `accord.toml`:
//!
//! ```toml
//! [discord]
//! token = "${DISCORD_TOKEN}"
//!
//! [gateway]
//! intents = 4609
//! shard_id = 0
//! shard_count = 1
//!
//! [ratelimit]
//! cache = "memory"
//!
//! [logging]
//! level = "info"
//! format = "compact"
//! ```
//!
//! This crate does not depend on other accord crates. The binary converts
//! these types into gateway, rate-limit and telemetry settings.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Environment variable expansion and token fallback.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{CONFIG_FILE_NAME, ResolvedConfig};
pub use types::*;

impl Config {
    /// Load configuration from `path`, or discover `accord.toml`.
    ///
    /// See [`loader::load`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a file is malformed or the result
    /// fails validation.
    pub fn load(path: Option<&std::path::Path>) -> ConfigResult<ResolvedConfig> {
        loader::load(path)
    }

    /// Parse and validate TOML content.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the content is malformed or invalid.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        loader::from_toml_str(content)
    }
}
