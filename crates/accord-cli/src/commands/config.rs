//! Config commands.

use std::path::Path;

use accord_config::ResolvedConfig;
use accord_config::loader::discovery_paths;
use anyhow::{Result, bail};
use colored::Colorize;

/// Print the resolved configuration. The token and Redis URL are never
/// serialized.
pub(crate) fn show_config(resolved: &ResolvedConfig, format: &str) -> Result<()> {
    match &resolved.path {
        Some(path) => eprintln!("# loaded from {}", path.display()),
        None => eprintln!("# no config file found, defaults in use"),
    }
    if let Some(var) = resolved.token_source {
        eprintln!("# token taken from {var}");
    }

    let rendered = match format {
        "toml" => toml::to_string_pretty(&resolved.config)?,
        "json" => serde_json::to_string_pretty(&resolved.config)?,
        other => bail!("unknown format '{other}'; expected toml or json"),
    };
    println!("{rendered}");
    Ok(())
}

/// Print the files checked during discovery, marking those that exist.
pub(crate) fn show_paths(explicit: Option<&Path>) -> Result<()> {
    if let Some(path) = explicit {
        println!("{} {}", "explicit:".cyan(), path.display());
        return Ok(());
    }

    let cwd = std::env::current_dir()?;
    for (index, path) in discovery_paths(&cwd).iter().enumerate() {
        let marker = if path.exists() {
            "found".green()
        } else {
            "missing".red()
        };
        println!("{}. {} [{marker}]", index.saturating_add(1), path.display());
    }
    Ok(())
}
