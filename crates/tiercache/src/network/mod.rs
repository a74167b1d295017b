//! Shared (network) cache tier.
//!
//! [`NetworkCache`] adds key prefixing and per-operation timeouts on top of a
//! wire-level [`NetworkBackend`]. It never retries: every timeout or I/O
//! failure surfaces as [`CacheError::BackendUnavailable`] and the retry policy
//! belongs to the circuit breaker in [`crate::CacheManager`].

mod redis_backend;

pub use redis_backend::RedisBackend;

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::RedisConfig;
use crate::error::{CacheError, CacheResult};
use crate::tier::{CacheTier, validate_ttl};

/// Wire-level operations of a networked key/value store.
///
/// Implementations map every I/O failure to [`CacheError::BackendUnavailable`].
#[async_trait]
pub trait NetworkBackend: Send + Sync {
    /// Read a key. Missing or expired keys yield `None`.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Write a key using the store's native expiration when `ttl` is set.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()>;

    /// Delete a key. Missing keys are not an error.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Delete every key matching a glob pattern. Returns the number deleted.
    ///
    /// Backends without pattern support keep the default.
    async fn delete_pattern(&self, _pattern: &str) -> CacheResult<u64> {
        Err(CacheError::Unsupported("delete_pattern"))
    }

    /// Lightweight liveness check.
    async fn ping(&self) -> CacheResult<()>;

    /// Release pooled connections.
    fn close(&self) {}
}

/// Timeout-guarded adapter over a [`NetworkBackend`].
#[derive(Clone)]
pub struct NetworkCache {
    backend: Arc<dyn NetworkBackend>,
    key_prefix: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for NetworkCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkCache")
            .field("key_prefix", &self.key_prefix)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl NetworkCache {
    /// Wrap a backend, bounding every operation by `timeout`.
    pub fn new(backend: Arc<dyn NetworkBackend>, timeout: Duration) -> Self {
        Self {
            backend,
            key_prefix: None,
            timeout,
        }
    }

    /// Prefix every key with `{prefix}:`.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Build a Redis-backed tier from configuration.
    ///
    /// Only creates the pool; no connection is opened until first use.
    pub fn from_config(config: &RedisConfig) -> CacheResult<Self> {
        let backend = RedisBackend::from_config(config)?;
        let cache = Self::new(Arc::new(backend), config.timeout());
        Ok(match &config.key_prefix {
            Some(prefix) => cache.with_key_prefix(prefix.clone()),
            None => cache,
        })
    }

    /// Build the full key with prefix.
    fn key<'a>(&self, key: &'a str) -> Cow<'a, str> {
        match &self.key_prefix {
            Some(prefix) => Cow::Owned(format!("{prefix}:{key}")),
            None => Cow::Borrowed(key),
        }
    }

    /// Run a backend call under the operation timeout.
    async fn guarded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = CacheResult<T>>,
    ) -> CacheResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::backend_unavailable(format!(
                "{operation} timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    pub async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let full_key = self.key(key);
        self.guarded("GET", self.backend.get(&full_key)).await
    }

    /// Write `value` with the given TTL. A zero TTL is rejected before any I/O.
    pub async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        validate_ttl(ttl)?;
        let full_key = self.key(key);
        self.guarded("SET", self.backend.set(&full_key, value, ttl))
            .await
    }

    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        let full_key = self.key(key);
        self.guarded("DEL", self.backend.delete(&full_key)).await
    }

    /// Delete every key matching `pattern` (prefix applied).
    pub async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let full_pattern = self.key(pattern);
        self.guarded("DELETE_PATTERN", self.backend.delete_pattern(&full_pattern))
            .await
    }

    /// Check connectivity. Failures are logged, never returned.
    pub async fn ping(&self) -> bool {
        match self.guarded("PING", self.backend.ping()).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "network cache ping failed");
                false
            }
        }
    }

    /// Close the backend's connections.
    pub fn close(&self) {
        self.backend.close();
    }
}

#[async_trait]
impl CacheTier for NetworkCache {
    fn name(&self) -> &'static str {
        "network"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Arc<Vec<u8>>>> {
        Ok(NetworkCache::get(self, key).await?.map(Arc::new))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        NetworkCache::set(self, key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        NetworkCache::delete(self, key).await
    }
}
