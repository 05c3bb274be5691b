//! Gateway connect command.

use std::sync::Arc;

use accord_config::ResolvedConfig;
use accord_gateway::{Shard, TungsteniteTransport};
use anyhow::{Result, bail};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config_bridge;

/// Run one shard until Ctrl+C or a fatal gateway error.
pub(crate) async fn run_connect(
    resolved: &ResolvedConfig,
    shard_id: Option<u32>,
    shard_count: Option<u32>,
) -> Result<()> {
    let mut config = config_bridge::to_shard_config(&resolved.config);
    if let Some(id) = shard_id {
        config.shard_id = id;
    }
    if let Some(count) = shard_count {
        config.shard_count = count;
    }
    if config.shard_count == 0 || config.shard_id >= config.shard_count {
        bail!(
            "shard {} is out of range for {} shard(s)",
            config.shard_id,
            config.shard_count
        );
    }

    println!("{}", "Connecting to the Discord Gateway...".cyan().bold());
    if let Some(path) = &resolved.path {
        println!("  Config: {}", path.display().to_string().yellow());
    }
    if let Some(var) = resolved.token_source {
        println!("  Token from: {}", var.yellow());
    }
    println!(
        "  Shard: {}/{}",
        config.shard_id.to_string().yellow(),
        config.shard_count.to_string().yellow()
    );
    println!("  Intents: {}", config.intents.bits().to_string().yellow());
    println!("\n{}", "Press Ctrl+C to stop".cyan());

    let rest = config_bridge::to_rest_client(&resolved.config).await?;
    let cancel = CancellationToken::new();
    let (shard, mut events) = Shard::new(config, Arc::new(TungsteniteTransport), cancel.clone());
    let mut shard = shard.with_rest_client(rest);

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, closing the connection");
        }
        signal_cancel.cancel();
    });

    let runner = tokio::spawn(async move { shard.run().await });

    // The channel closes once the shard has stopped and been dropped.
    let mut received: u64 = 0;
    while let Some(event) = events.recv().await {
        received = received.saturating_add(1);
        info!(event = %event.name, seq = event.sequence, "Dispatch");
    }

    let result = runner.await?;
    cancel.cancel();
    result?;

    println!(
        "{} ({} dispatches received)",
        "Gateway connection closed.".yellow(),
        received
    );
    Ok(())
}
