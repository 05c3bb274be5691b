//! Accord CLI
//!
//! Runs a single gateway shard or a single rate-limited REST call
//! against Discord, using the same configuration file as a bot would.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
pub mod config_bridge;

use commands::{config, connect, request};

/// Accord - Discord gateway and REST client
#[derive(Parser)]
#[command(name = "accord")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "ACCORD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one gateway shard until Ctrl+C, logging every dispatch
    Connect {
        /// Shard index (overrides `gateway.shard_id`)
        #[arg(long)]
        shard: Option<u32>,

        /// Total shards (overrides `gateway.shard_count`)
        #[arg(long)]
        shards: Option<u32>,
    },

    /// Send one REST request through the rate limiter
    Request {
        /// HTTP method (GET, POST, PATCH, PUT, DELETE)
        method: String,

        /// Path relative to the API base, e.g. `/users/@me`
        path: String,

        /// JSON request body
        #[arg(short, long)]
        body: Option<String>,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the resolved configuration (secrets omitted)
    Show {
        /// Output format (toml or json)
        #[arg(short, long, default_value = "toml")]
        format: String,
    },
    /// Show config file paths being checked
    Paths,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // `config paths` must work even without a valid config.
    if let Commands::Config {
        command: ConfigCommands::Paths,
    } = &cli.command
    {
        return config::show_paths(cli.config.as_deref());
    }

    let resolved = accord_config::Config::load(cli.config.as_deref())?;

    let mut log_config = config_bridge::to_log_config(&resolved.config);
    if cli.verbose {
        "debug".clone_into(&mut log_config.level);
    }
    if let Err(e) = accord_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match cli.command {
        Commands::Connect { shard, shards } => {
            connect::run_connect(&resolved, shard, shards).await?;
        },
        Commands::Request { method, path, body } => {
            request::run_request(&resolved.config, &method, &path, body.as_deref()).await?;
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show { format } => config::show_config(&resolved, &format)?,
            ConfigCommands::Paths => config::show_paths(cli.config.as_deref())?,
        },
    }

    Ok(())
}
