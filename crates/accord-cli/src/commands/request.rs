//! One-off REST request command.

use accord_config::Config;
use accord_ratelimit::Method;
use anyhow::{Context, Result};
use colored::Colorize;

use crate::config_bridge;

/// Send one request through the rate limiter and print the JSON reply.
pub(crate) async fn run_request(
    cfg: &Config,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> Result<()> {
    let method = parse_method(method)?;
    let path = normalize_path(path);
    let body = body
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("--body is not valid JSON")?;

    let client = config_bridge::to_rest_client(cfg).await?;

    eprintln!("{} {}", method.as_str().cyan().bold(), path.yellow());
    let response: serde_json::Value = client.send(method, &path, body.as_ref()).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn parse_method(method: &str) -> Result<Method> {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method '{method}'"))
}

/// Paths are relative to the API base and must start with `/`.
fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    }
}
