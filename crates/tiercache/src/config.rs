use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::breaker::BreakerSettings;
use crate::codec::Codec;
use crate::error::{CacheError, CacheResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL applied by `CacheManager::set` when the caller gives none
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    /// Value encoding shared by both tiers
    #[serde(default)]
    pub codec: Codec,
    /// Allowed namespaces; empty accepts any valid namespace
    #[serde(default)]
    pub namespaces: Vec<String>,
    /// Local (L1) cache configuration
    #[serde(default)]
    pub local: LocalCacheConfig,
    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,
    /// Circuit breaker configuration
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_ttl_secs() -> u64 {
    3600 // 1 hour
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            codec: Codec::default(),
            namespaces: Vec::new(),
            local: LocalCacheConfig::default(),
            redis: RedisConfig::default(),
            breaker: BreakerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.default_ttl_secs == 0 {
            return Err("default_ttl_secs must be > 0".into());
        }
        for ns in &self.namespaces {
            crate::key::validate_namespace(ns).map_err(|e| format!("namespaces: {e}"))?;
        }
        if !self.local.enabled && !self.redis.enabled {
            return Err("at least one of local.enabled or redis.enabled must be true".into());
        }
        // Local validations
        if self.local.enabled {
            if self.local.max_entries == 0 {
                return Err("local.max_entries must be > 0".into());
            }
            if self.local.max_bytes == 0 {
                return Err("local.max_bytes must be > 0".into());
            }
        }
        // Redis validations
        if self.redis.enabled {
            if self.redis.url.trim().is_empty() {
                return Err("redis.url must not be empty when redis is enabled".into());
            }
            if self.redis.pool_size == 0 {
                return Err("redis.pool_size must be > 0".into());
            }
            if self.redis.timeout_ms == 0 || self.redis.pool_timeout_ms == 0 {
                return Err("redis timeouts must be > 0".into());
            }
            if let Some(prefix) = &self.redis.key_prefix {
                crate::key::validate_namespace(prefix)
                    .map_err(|e| format!("redis.key_prefix: {e}"))?;
            }
        }
        // Breaker validations
        if self.breaker.initial_cooldown_ms == 0 {
            return Err("breaker.initial_cooldown_ms must be > 0".into());
        }
        if self.breaker.max_cooldown_ms < self.breaker.initial_cooldown_ms {
            return Err("breaker.max_cooldown_ms must be >= breaker.initial_cooldown_ms".into());
        }
        if self.breaker.backoff_multiplier.is_nan() || self.breaker.backoff_multiplier < 1.0 {
            return Err("breaker.backoff_multiplier must be >= 1.0".into());
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Copy with credentials masked, for display.
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        if cfg.redis.password.is_some() {
            cfg.redis.password = Some("***".to_string());
        }
        if let Ok(mut url) = url::Url::parse(&cfg.redis.url) {
            if url.password().is_some() && url.set_password(Some("***")).is_ok() {
                cfg.redis.url = url.to_string();
            }
        }
        cfg
    }
}

/// Local (in-process) cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalCacheConfig {
    #[serde(default = "default_local_enabled")]
    pub enabled: bool,

    /// Maximum number of entries
    #[serde(default = "default_local_max_entries")]
    pub max_entries: usize,

    /// Maximum total size of keys and values in bytes
    #[serde(default = "default_local_max_bytes")]
    pub max_bytes: usize,
}

fn default_local_enabled() -> bool {
    true
}

fn default_local_max_entries() -> usize {
    10000
}

fn default_local_max_bytes() -> usize {
    64 * 1024 * 1024
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_local_enabled(),
            max_entries: default_local_max_entries(),
            max_bytes: default_local_max_bytes(),
        }
    }
}

/// Redis configuration for the shared tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable Redis (gracefully degrades without it)
    /// Default: false (local-only for single-instance deployments)
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Username injected into the URL; prefer TIERCACHE__REDIS__USERNAME
    #[serde(default)]
    pub username: Option<String>,

    /// Password injected into the URL; prefer TIERCACHE__REDIS__PASSWORD
    #[serde(default)]
    pub password: Option<String>,

    /// Prefix prepended to every key written to Redis
    #[serde(default)]
    pub key_prefix: Option<String>,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Per-operation timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,

    /// Pool wait/create/recycle timeout in milliseconds
    #[serde(default = "default_redis_pool_timeout_ms")]
    pub pool_timeout_ms: u64,
}

fn default_redis_enabled() -> bool {
    false
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    500
}

fn default_redis_pool_timeout_ms() -> u64 {
    5000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            username: None,
            password: None,
            key_prefix: None,
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
            pool_timeout_ms: default_redis_pool_timeout_ms(),
        }
    }
}

impl RedisConfig {
    /// Connection URL with configured credentials applied.
    pub fn connection_url(&self) -> CacheResult<String> {
        if self.username.is_none() && self.password.is_none() {
            return Ok(self.url.clone());
        }

        let mut url = url::Url::parse(&self.url)
            .map_err(|e| CacheError::config(format!("invalid redis.url: {e}")))?;
        if let Some(username) = &self.username {
            url.set_username(username)
                .map_err(|_| CacheError::config("redis.url cannot carry a username"))?;
        }
        if let Some(password) = &self.password {
            url.set_password(Some(password))
                .map_err(|_| CacheError::config("redis.url cannot carry a password"))?;
        }
        Ok(url.to_string())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn pool_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_timeout_ms)
    }
}

/// Circuit breaker cool-down bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_initial_cooldown_ms")]
    pub initial_cooldown_ms: u64,
    #[serde(default = "default_max_cooldown_ms")]
    pub max_cooldown_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_initial_cooldown_ms() -> u64 {
    1000
}

fn default_max_cooldown_ms() -> u64 {
    60_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            initial_cooldown_ms: default_initial_cooldown_ms(),
            max_cooldown_ms: default_max_cooldown_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl BreakerConfig {
    pub fn settings(&self) -> BreakerSettings {
        BreakerSettings {
            initial_cooldown: Duration::from_millis(self.initial_cooldown_ms),
            max_cooldown: Duration::from_millis(self.max_cooldown_ms),
            multiplier: self.backoff_multiplier,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::CacheConfig;
    use crate::error::{CacheError, CacheResult};
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub fn load_config(path: Option<&str>) -> CacheResult<CacheConfig> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if !pathbuf.exists() {
                    return Err(CacheError::config(format!("config file not found: {p}")));
                }
                builder = builder.add_source(File::from(pathbuf));
            }
            None => {
                // Try default root-level file
                let default_path = PathBuf::from("tiercache.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., TIERCACHE__REDIS__ENABLED=true
        builder = builder.add_source(
            Environment::with_prefix("TIERCACHE")
                .try_parsing(true)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("namespaces"),
        );
        let cfg = builder
            .build()
            .map_err(|e| CacheError::config(format!("config build error: {e}")))?;
        let merged: CacheConfig = cfg
            .try_deserialize()
            .map_err(|e| CacheError::config(format!("config deserialize error: {e}")))?;
        merged.validate().map_err(CacheError::Config)?;
        Ok(merged)
    }
}
