//! Environment handling: `${VAR}` expansion and token fallback.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::types::Config;

/// Token variables consulted, in order, when `discord.token` is empty.
pub const TOKEN_ENV_VARS: [&str; 2] = ["ACCORD_TOKEN", "DISCORD_TOKEN"];

/// Snapshot the process environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

/// Expand `${VAR}` references in every string of a TOML tree.
///
/// Unset variables expand to the empty string.
pub fn resolve_env_references(value: &mut toml::Value, env: &HashMap<String, String>) {
    match value {
        toml::Value::String(s) => {
            if s.contains("${") {
                *s = expand(s, env);
            }
        },
        toml::Value::Array(items) => {
            for item in items {
                resolve_env_references(item, env);
            }
        },
        toml::Value::Table(table) => {
            for (_, child) in table.iter_mut() {
                resolve_env_references(child, env);
            }
        },
        _ => {},
    }
}

/// Expand `${VAR}` references in one string.
///
/// An unterminated `${` is kept literally.
#[must_use]
pub fn expand(input: &str, env: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start..];
        let Some(end) = after.find('}') else {
            out.push_str(after);
            return out;
        };
        let name = &after[2..end];
        match env.get(name) {
            Some(value) => out.push_str(value),
            None => warn!(var = name, "config references an unset environment variable"),
        }
        rest = &after[end.saturating_add(1)..];
    }
    out.push_str(rest);
    out
}

/// Fill `discord.token` from the environment if it is empty.
///
/// Returns the variable used, if any.
pub fn apply_token_fallback(
    config: &mut Config,
    env: &HashMap<String, String>,
) -> Option<&'static str> {
    if !config.discord.token.is_empty() {
        return None;
    }
    let (name, token) = TOKEN_ENV_VARS
        .iter()
        .find_map(|name| env.get(*name).filter(|v| !v.is_empty()).map(|v| (*name, v)))?;
    debug!(var = name, "using bot token from environment");
    config.discord.token.clone_from(token);
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn expands_references() {
        let vars = env(&[("HOST", "redis.local"), ("PORT", "6379")]);
        assert_eq!(expand("redis://${HOST}:${PORT}/0", &vars), "redis://redis.local:6379/0");
        assert_eq!(expand("no refs", &vars), "no refs");
    }

    #[test]
    fn unset_reference_expands_to_empty() {
        assert_eq!(expand("a${MISSING}b", &env(&[])), "ab");
    }

    #[test]
    fn unterminated_reference_is_literal() {
        let vars = env(&[("X", "1")]);
        assert_eq!(expand("${X} ${Y", &vars), "1 ${Y");
    }

    #[test]
    fn resolves_nested_values() {
        let vars = env(&[("TOKEN", "abc"), ("LEVEL", "debug")]);
        let mut value: toml::Value = toml::from_str(
            r#"
            [discord]
            token = "${TOKEN}"
            [logging]
            directives = ["accord_gateway=${LEVEL}"]
            "#,
        )
        .unwrap();
        resolve_env_references(&mut value, &vars);
        assert_eq!(value["discord"]["token"].as_str(), Some("abc"));
        assert_eq!(
            value["logging"]["directives"][0].as_str(),
            Some("accord_gateway=debug")
        );
    }

    #[test]
    fn token_fallback_order() {
        let mut config = Config::default();
        let vars = env(&[("DISCORD_TOKEN", "second"), ("ACCORD_TOKEN", "first")]);
        assert_eq!(apply_token_fallback(&mut config, &vars), Some("ACCORD_TOKEN"));
        assert_eq!(config.discord.token, "first");

        let mut config = Config::default();
        let vars = env(&[("ACCORD_TOKEN", ""), ("DISCORD_TOKEN", "second")]);
        assert_eq!(apply_token_fallback(&mut config, &vars), Some("DISCORD_TOKEN"));
        assert_eq!(config.discord.token, "second");
    }

    #[test]
    fn explicit_token_wins() {
        let mut config = Config::default();
        config.discord.token = "file".to_owned();
        let vars = env(&[("ACCORD_TOKEN", "env")]);
        assert_eq!(apply_token_fallback(&mut config, &vars), None);
        assert_eq!(config.discord.token, "file");
    }
}
