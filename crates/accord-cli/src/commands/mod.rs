//! Subcommand implementations.

pub(crate) mod config;
pub(crate) mod connect;
pub(crate) mod request;
