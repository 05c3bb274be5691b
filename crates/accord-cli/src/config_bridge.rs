//! Bridge from `accord_config::Config` to the library configuration types.

use std::sync::Arc;
use std::time::Duration;

use accord_cache::{Cache, MemoryCache, RedisCache};
use accord_config::{CacheBackend, Config};
use accord_gateway::{Intents, ShardConfig};
use accord_ratelimit::{BucketStore, RateLimitConfig, RateLimitPolicy, ReqwestTransport, RestClient};
use accord_telemetry::{FileRotation, LogConfig, LogFormat, LogTarget};
use anyhow::{Context, Result};

/// File name prefix for rolling log files.
const LOG_FILE_PREFIX: &str = "accord";

/// Namespace for rate-limit buckets under the configured key prefix.
const RATELIMIT_NAMESPACE: &str = "ratelimit";

/// Convert config to a [`ShardConfig`].
#[must_use]
pub fn to_shard_config(cfg: &Config) -> ShardConfig {
    let g = &cfg.gateway;
    ShardConfig {
        token: cfg.discord.token.clone(),
        intents: Intents::from_bits(g.intents),
        shard_id: g.shard_id,
        shard_count: g.shard_count,
        gateway_url: g.url.clone(),
        api_base: cfg.discord.api_base.clone(),
        large_threshold: g.large_threshold,
        hello_timeout: Duration::from_millis(g.hello_timeout_ms),
        heartbeat_tolerance: Duration::from_millis(g.heartbeat_tolerance_ms),
        max_connect_attempts: g.max_connect_attempts,
        max_resume_attempts: g.max_resume_attempts,
        max_protocol_errors: g.max_protocol_errors,
        backoff_base: Duration::from_millis(g.backoff_base_ms),
        backoff_max: Duration::from_millis(g.backoff_max_ms),
        event_buffer: g.event_buffer,
        ..ShardConfig::default()
    }
}

/// Convert config to a [`RateLimitConfig`].
#[must_use]
pub fn to_rate_limit_config(cfg: &Config) -> RateLimitConfig {
    RateLimitConfig {
        global_limit: cfg.ratelimit.global_limit,
        global_window: Duration::from_millis(cfg.ratelimit.global_window_ms),
        ..RateLimitConfig::default()
    }
}

/// Convert config to a [`LogConfig`].
#[must_use]
pub fn to_log_config(cfg: &Config) -> LogConfig {
    let format = cfg.logging.format.parse().unwrap_or(LogFormat::Compact);

    let mut log_config = LogConfig::new(&cfg.logging.level).with_format(format);
    log_config = match (cfg.logging.target.as_str(), &cfg.logging.directory) {
        ("stdout", _) => log_config.with_target(LogTarget::Stdout),
        ("file", Some(dir)) => {
            log_config.with_file_logging(dir, LOG_FILE_PREFIX, FileRotation::Daily)
        },
        _ => log_config.with_target(LogTarget::Stderr),
    };

    for directive in &cfg.logging.directives {
        log_config = log_config.with_directive(directive);
    }

    log_config
}

/// Open the configured cache backend.
///
/// # Errors
///
/// Returns an error if Redis is selected and cannot be reached.
pub async fn open_cache(cfg: &Config) -> Result<Arc<dyn Cache>> {
    match cfg.ratelimit.cache {
        CacheBackend::Memory => Ok(Arc::new(MemoryCache::new())),
        CacheBackend::Redis => {
            let url = cfg.ratelimit.redis_url.as_deref().unwrap_or_default();
            let cache = RedisCache::connect(url)
                .await
                .context("failed to connect to the Redis rate-limit cache")?;
            Ok(Arc::new(cache))
        },
    }
}

/// Build the bucket store over `cache`.
///
/// # Errors
///
/// Returns an error if the key prefix is not a valid namespace.
pub fn to_bucket_store(cfg: &Config, cache: Arc<dyn Cache>) -> Result<BucketStore> {
    let namespace = format!("{}:{RATELIMIT_NAMESPACE}", cfg.ratelimit.key_prefix);
    let store = BucketStore::new(cache, namespace).context("invalid ratelimit.key_prefix")?;
    Ok(store)
}

/// Build a rate-limited REST client over the configured cache.
///
/// # Errors
///
/// Returns an error if the cache cannot be opened or the API base is
/// not a valid URL.
pub async fn to_rest_client(cfg: &Config) -> Result<RestClient> {
    let cache = open_cache(cfg).await?;
    let store = Arc::new(to_bucket_store(cfg, cache)?);
    let transport = Arc::new(ReqwestTransport::new(cfg.discord.api_base.as_str())?);
    let policy = RateLimitPolicy::new(store, transport, to_rate_limit_config(cfg));
    Ok(RestClient::new(cfg.discord.token.as_str(), policy))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        accord_config::Config::from_toml_str(
            r#"
            [discord]
            token = "tok"
            api_base = "http://localhost:8080/api"

            [gateway]
            intents = 33281
            shard_id = 2
            shard_count = 4
            url = "wss://gateway.example.test"
            hello_timeout_ms = 1500
            backoff_base_ms = 250
            backoff_max_ms = 4000
            large_threshold = 100

            [ratelimit]
            global_limit = 10
            global_window_ms = 2000
            key_prefix = "bot-a"

            [logging]
            level = "debug"
            format = "json"
            directives = ["accord_gateway=trace"]
            "#,
        )
        .unwrap()
    }

    #[test]
    fn shard_config_mapping() {
        let shard = to_shard_config(&config());
        assert_eq!(shard.token, "tok");
        assert_eq!(shard.intents.bits(), 33281);
        assert_eq!(shard.shard(), [2, 4]);
        assert_eq!(shard.gateway_url.as_deref(), Some("wss://gateway.example.test"));
        assert_eq!(shard.api_base, "http://localhost:8080/api");
        assert_eq!(shard.hello_timeout, Duration::from_millis(1500));
        assert_eq!(shard.backoff_base, Duration::from_millis(250));
        assert_eq!(shard.backoff_max, Duration::from_secs(4));
        assert_eq!(shard.large_threshold, Some(100));
        assert_eq!(shard.max_resume_attempts, 3);
    }

    #[test]
    fn rate_limit_config_mapping() {
        let rl = to_rate_limit_config(&config());
        assert_eq!(rl.global_limit, 10);
        assert_eq!(rl.global_window, Duration::from_secs(2));
    }

    #[test]
    fn log_config_mapping() {
        let log = to_log_config(&config());
        assert_eq!(log.level, "debug");
        assert_eq!(log.format, LogFormat::Json);
        assert_eq!(log.directives, vec!["accord_gateway=trace".to_owned()]);
    }

    #[test]
    fn log_target_mapping() {
        let mut cfg = config();
        assert_eq!(to_log_config(&cfg).target, LogTarget::Stderr);

        cfg.logging.target = "stdout".to_owned();
        assert_eq!(to_log_config(&cfg).target, LogTarget::Stdout);

        cfg.logging.target = "file".to_owned();
        cfg.logging.directory = Some("/var/log/accord".to_owned());
        let log = to_log_config(&cfg);
        assert_eq!(log.target, LogTarget::File("/var/log/accord".into()));
        assert_eq!(log.file.prefix, "accord");
        assert!(!log.ansi);
    }

    #[tokio::test]
    async fn memory_cache_and_store() {
        let cfg = config();
        let cache = open_cache(&cfg).await.unwrap();
        to_bucket_store(&cfg, cache).unwrap();
        to_rest_client(&cfg).await.unwrap();
    }
}
