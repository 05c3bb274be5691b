//! Configuration errors.

use thiserror::Error;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file is not valid TOML or does not match the schema.
    #[error("failed to parse {path}: {source}")]
    ParseError {
        /// Path of the offending file.
        path: String,
        /// Underlying parse error.
        source: toml::de::Error,
    },

    /// A file could not be read.
    #[error("failed to read {path}: {source}")]
    ReadError {
        /// Path of the offending file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A value is out of range or inconsistent with another.
    #[error("invalid value for {field}: {message}")]
    ValidationError {
        /// Dotted field path, e.g. `gateway.shard_id`.
        field: String,
        /// What is wrong.
        message: String,
    },
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
