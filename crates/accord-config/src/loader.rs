//! Config file discovery and loading.
//!
//! 1. Pick the file: the explicit path, else `./accord.toml`, else
//!    `accord.toml` in the user config directory. No file means defaults.
//! 2. Parse to a TOML tree and expand `${VAR}` references.
//! 3. Deserialize into [`Config`].
//! 4. Fill an empty token from `ACCORD_TOKEN` / `DISCORD_TOKEN`.
//! 5. Validate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_token_fallback, collect_env_vars, resolve_env_references};
use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// File name looked up during discovery.
pub const CONFIG_FILE_NAME: &str = "accord.toml";

/// Maximum allowed config file size (1 MiB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// A loaded configuration and where it came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The validated configuration.
    pub config: Config,
    /// The file it was read from, `None` when only defaults applied.
    pub path: Option<PathBuf>,
    /// Environment variable that supplied the token, if any.
    pub token_source: Option<&'static str>,
}

/// Load configuration from `path`, or discover it when `None`.
///
/// # Errors
///
/// Returns a [`ConfigError`] if an explicit file is missing, any file is
/// unreadable or malformed, or the result fails validation.
pub fn load(path: Option<&Path>) -> ConfigResult<ResolvedConfig> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    load_with(path, &discovery_paths(&cwd), &collect_env_vars())
}

/// [`load`] with explicit discovery candidates and environment.
///
/// # Errors
///
/// See [`load`].
pub fn load_with(
    path: Option<&Path>,
    candidates: &[PathBuf],
    env: &HashMap<String, String>,
) -> ConfigResult<ResolvedConfig> {
    let found = match path {
        Some(path) => {
            let value = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
                path: path.display().to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })?;
            Some((value, path.to_path_buf()))
        },
        None => discover(candidates)?,
    };

    let (mut tree, path) = match found {
        Some((value, path)) => {
            info!(path = %path.display(), "loaded config");
            (value, Some(path))
        },
        None => {
            debug!("no config file found, using defaults");
            (toml::Value::Table(toml::Table::new()), None)
        },
    };

    resolve_env_references(&mut tree, env);
    let label = path
        .as_ref()
        .map_or_else(|| "<defaults>".to_owned(), |p| p.display().to_string());
    let mut config: Config =
        tree.try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: label,
                source: e,
            })?;

    let token_source = apply_token_fallback(&mut config, env);
    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        path,
        token_source,
    })
}

/// Parse configuration from a string, without env expansion or fallback.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the content is malformed or invalid.
pub fn from_toml_str(content: &str) -> ConfigResult<Config> {
    let config: Config = toml::from_str(content).map_err(|e| ConfigError::ParseError {
        path: "<string>".to_owned(),
        source: e,
    })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Default discovery candidates, in order.
#[must_use]
pub fn discovery_paths(cwd: &Path) -> Vec<PathBuf> {
    let mut paths = vec![cwd.join(CONFIG_FILE_NAME)];
    if let Some(dirs) = directories::ProjectDirs::from("", "", "accord") {
        paths.push(dirs.config_dir().join(CONFIG_FILE_NAME));
    }
    paths
}

/// The first candidate that exists, parsed.
fn discover(candidates: &[PathBuf]) -> ConfigResult<Option<(toml::Value, PathBuf)>> {
    for candidate in candidates {
        if let Some(value) = try_load_file(candidate)? {
            return Ok(Some((value, candidate.clone())));
        }
    }
    Ok(None)
}

/// Try to load a file, returning `None` if it doesn't exist.
///
/// Reads once and checks the size afterwards, with no separate stat.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    let len = u64::try_from(content.len()).unwrap_or(u64::MAX);
    if len > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {len} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit"
            ),
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}
