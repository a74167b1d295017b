//! Cache manager composing the local and network tiers.
//!
//! ## Lookup Order
//!
//! ```text
//! get → network (if the breaker admits) ──hit/miss──▶ done
//!            │ unavailable / timeout
//!            ▼
//!        local (LRU) ──▶ hit / miss
//! ```
//!
//! ## Write Strategy
//!
//! Writes always land in the local tier and are written through to the network
//! tier on a best-effort basis. Network failures are absorbed by the circuit
//! breaker and never reach the caller; only caller-input errors do.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::Instant;

use crate::breaker::{BreakerPermit, BreakerSettings, BreakerState, CircuitBreaker};
use crate::codec::Codec;
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::key::{CacheKey, validate_namespace};
use crate::memory::{InMemoryCache, LocalCacheStats};
use crate::metrics;
use crate::network::NetworkCache;
use crate::tier::{CacheTier, validate_ttl};

/// Snapshot of the manager's tiers.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// `None` when the local tier is disabled.
    pub local: Option<LocalCacheStats>,
    pub network_enabled: bool,
    pub breaker: BreakerState,
    pub codec: Codec,
    pub default_ttl: Duration,
}

impl CacheStats {
    /// Human-readable mode label.
    pub fn mode(&self) -> &'static str {
        match (self.local.is_some(), self.network_enabled) {
            (true, true) => "local+network",
            (true, false) => "local",
            (false, true) => "network",
            (false, false) => "disabled",
        }
    }
}

/// Reachability of each tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheHealth {
    pub local: bool,
    /// `None` when no network tier is configured; `Some(false)` while it is
    /// unreachable or the breaker is cooling down.
    pub network: Option<bool>,
    pub breaker: BreakerState,
}

impl CacheHealth {
    /// Network tier configured but not serving.
    pub fn is_degraded(&self) -> bool {
        self.network == Some(false)
    }
}

/// Two-tier cache with namespacing, fallback and invalidation.
///
/// Construct once at startup and share it as `Arc<CacheManager>`.
#[derive(Debug)]
pub struct CacheManager {
    local: Option<InMemoryCache>,
    network: Option<NetworkCache>,
    breaker: CircuitBreaker,
    codec: Codec,
    default_ttl: Duration,
    namespaces: Option<HashSet<String>>,
}

impl CacheManager {
    pub fn builder() -> CacheManagerBuilder {
        CacheManagerBuilder::default()
    }

    /// Build a manager from configuration.
    ///
    /// If the Redis pool cannot be created and the local tier is enabled, the
    /// manager starts in local-only mode. An unreachable Redis at startup is
    /// only logged; the circuit breaker takes over from there.
    pub async fn from_config(config: &CacheConfig) -> CacheResult<Self> {
        config.validate().map_err(CacheError::Config)?;

        let mut builder = Self::builder()
            .default_ttl(config.default_ttl())
            .codec(config.codec)
            .breaker(config.breaker.settings())
            .namespaces(config.namespaces.iter().cloned());

        if config.local.enabled {
            builder = builder.local(InMemoryCache::new(
                config.local.max_entries,
                config.local.max_bytes,
            ));
        }

        if !config.redis.enabled {
            tracing::info!("Redis disabled, using local cache only");
            return builder.build();
        }

        let display_url = config.redacted().redis.url;
        tracing::info!(url = %display_url, "Connecting to Redis");

        match NetworkCache::from_config(&config.redis) {
            Ok(network) => {
                if network.ping().await {
                    tracing::info!("✓ Connected to Redis successfully");
                } else {
                    tracing::warn!(
                        url = %display_url,
                        "Redis is not reachable yet; serving from local cache until it recovers"
                    );
                }
                builder = builder.network(network);
            }
            Err(e) if config.local.enabled => {
                tracing::warn!(
                    error = %e,
                    "Failed to create Redis pool. Falling back to local cache."
                );
            }
            Err(e) => return Err(e),
        }

        builder.build()
    }

    /// Get a value.
    ///
    /// Returns `Ok(None)` on a miss, when every tier is unavailable, and when
    /// the stored bytes cannot be decoded. Errors only for an invalid namespace.
    pub async fn get<T: DeserializeOwned>(&self, namespace: &str, id: &str) -> CacheResult<Option<T>> {
        let key = self.key(namespace, id)?.to_string();

        if let Some(network) = &self.network {
            if let Some(permit) = self.breaker.try_acquire() {
                let result = self
                    .settle(permit, "get", self.read_tier(network, namespace, &key))
                    .await;
                match result {
                    Ok(Some(bytes)) => {
                        let value = self.decode(network.name(), namespace, &key, &bytes);
                        if value.is_none() {
                            self.discard_network(network, namespace, &key).await;
                        }
                        return Ok(value);
                    }
                    Ok(None) => return Ok(None),
                    Err(_) => {
                        tracing::debug!(key = %key, "falling back to local cache");
                    }
                }
            }
        }

        if let Some(local) = &self.local {
            if let Ok(Some(bytes)) = self.read_tier(local, namespace, &key).await {
                let value = self.decode(local.name(), namespace, &key, &bytes);
                if value.is_none() {
                    local.delete(&key);
                }
                return Ok(value);
            }
        }

        Ok(None)
    }

    /// Set a value with the default TTL.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        namespace: &str,
        id: &str,
        value: &T,
    ) -> CacheResult<()> {
        self.store(namespace, id, value, Some(self.default_ttl)).await
    }

    /// Set a value with an explicit TTL. A zero TTL is rejected.
    pub async fn set_with_ttl<T: Serialize + ?Sized>(
        &self,
        namespace: &str,
        id: &str,
        value: &T,
        ttl: Duration,
    ) -> CacheResult<()> {
        self.store(namespace, id, value, Some(ttl)).await
    }

    /// Set a value that never expires (it can still be evicted or deleted).
    pub async fn set_persistent<T: Serialize + ?Sized>(
        &self,
        namespace: &str,
        id: &str,
        value: &T,
    ) -> CacheResult<()> {
        self.store(namespace, id, value, None).await
    }

    async fn store<T: Serialize + ?Sized>(
        &self,
        namespace: &str,
        id: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let key = self.key(namespace, id)?.to_string();
        validate_ttl(ttl)?;

        let bytes = self.codec.encode(value).inspect_err(|e| {
            metrics::record_cache_error("codec", namespace, e.kind());
        })?;

        // The local tier is the durability floor: its errors reach the caller
        if let Some(local) = &self.local {
            self.timed(
                local.name(),
                "set",
                namespace,
                CacheTier::set(local, &key, &bytes, ttl),
            )
            .await?;
        }

        if let Some(network) = &self.network {
            if let Some(permit) = self.breaker.try_acquire() {
                let write = self.timed(
                    network.name(),
                    "set",
                    namespace,
                    CacheTier::set(network, &key, &bytes, ttl),
                );
                if self.settle(permit, "set", write).await.is_ok() {
                    tracing::debug!(key = %key, "cache set (local+network)");
                }
            }
        }

        Ok(())
    }

    /// Delete a value from both tiers.
    pub async fn delete(&self, namespace: &str, id: &str) -> CacheResult<()> {
        let key = self.key(namespace, id)?.to_string();

        if let Some(local) = &self.local {
            let _ = self
                .timed(local.name(), "delete", namespace, CacheTier::delete(local, &key))
                .await;
        }

        if let Some(network) = &self.network {
            if let Some(permit) = self.breaker.try_acquire() {
                let delete = self.timed(
                    network.name(),
                    "delete",
                    namespace,
                    CacheTier::delete(network, &key),
                );
                let _ = self.settle(permit, "delete", delete).await;
            }
        }

        tracing::debug!(key = %key, "cache invalidated");
        Ok(())
    }

    /// Remove every entry of `namespace` from both tiers.
    ///
    /// Backends without pattern deletion are skipped with a warning.
    pub async fn invalidate_namespace(&self, namespace: &str) -> CacheResult<()> {
        self.check_namespace(namespace)?;

        if let Some(local) = &self.local {
            let removed = local.remove_prefix(&CacheKey::namespace_prefix(namespace));
            tracing::debug!(namespace, removed, "local namespace invalidated");
        }

        if let Some(network) = &self.network {
            if let Some(permit) = self.breaker.try_acquire() {
                let pattern = CacheKey::namespace_pattern(namespace);
                let delete = self.timed(
                    network.name(),
                    "invalidate",
                    namespace,
                    network.delete_pattern(&pattern),
                );
                match self.settle(permit, "invalidate", delete).await {
                    Ok(deleted) => {
                        tracing::debug!(namespace, deleted, "network namespace invalidated");
                    }
                    Err(CacheError::Unsupported(operation)) => {
                        tracing::warn!(
                            namespace,
                            operation,
                            "network backend cannot delete by pattern; namespace left to expire"
                        );
                    }
                    Err(_) => {}
                }
            }
        }

        Ok(())
    }

    /// Cache-aside helper: return the cached value or compute, store and return it.
    ///
    /// `ttl = None` uses the default TTL. Failing to store the computed value is
    /// logged and does not fail the call.
    pub async fn get_or_insert_with<T, E, F, Fut>(
        &self,
        namespace: &str,
        id: &str,
        ttl: Option<Duration>,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CacheError>,
    {
        if let Some(value) = self.get::<T>(namespace, id).await? {
            return Ok(value);
        }

        let value = fetch().await?;

        let ttl = ttl.unwrap_or(self.default_ttl);
        if let Err(e) = self.set_with_ttl(namespace, id, &value, ttl).await {
            tracing::warn!(namespace, id, error = %e, "failed to cache computed value");
        }

        Ok(value)
    }

    /// Ping the network tier through the circuit breaker.
    ///
    /// Returns `false` without I/O while the breaker is cooling down.
    pub async fn probe(&self) -> bool {
        let Some(network) = &self.network else {
            return false;
        };
        let Some(permit) = self.breaker.try_acquire() else {
            return false;
        };

        if network.ping().await {
            permit.succeed();
            true
        } else {
            permit.fail();
            false
        }
    }

    /// Probe the network tier and report both tiers.
    pub async fn health(&self) -> CacheHealth {
        let network = match &self.network {
            Some(_) => Some(self.probe().await),
            None => None,
        };
        CacheHealth {
            local: self.local.is_some(),
            network,
            breaker: self.breaker.state(),
        }
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            local: self.local.as_ref().map(InMemoryCache::stats),
            network_enabled: self.network.is_some(),
            breaker: self.breaker.state(),
            codec: self.codec,
            default_ttl: self.default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get the local tier (for testing/internal use).
    pub fn local_cache(&self) -> Option<&InMemoryCache> {
        self.local.as_ref()
    }

    /// Close network connections. The local tier keeps serving.
    pub fn shutdown(&self) {
        if let Some(network) = &self.network {
            network.close();
            tracing::info!("network cache tier closed");
        }
    }

    fn check_namespace(&self, namespace: &str) -> CacheResult<()> {
        validate_namespace(namespace)?;
        if let Some(allowed) = &self.namespaces {
            if !allowed.contains(namespace) {
                return Err(CacheError::InvalidNamespace(format!(
                    "namespace '{namespace}' is not configured"
                )));
            }
        }
        Ok(())
    }

    fn key(&self, namespace: &str, id: &str) -> CacheResult<CacheKey> {
        self.check_namespace(namespace)?;
        CacheKey::new(namespace, id)
    }

    /// Time a tier operation and count its failures.
    async fn timed<R>(
        &self,
        tier: &'static str,
        operation: &'static str,
        namespace: &str,
        fut: impl Future<Output = CacheResult<R>>,
    ) -> CacheResult<R> {
        let started = Instant::now();
        let result = fut.await;
        metrics::record_operation_duration(tier, operation, namespace, started.elapsed());
        if let Err(e) = &result {
            metrics::record_cache_error(tier, namespace, e.kind());
        }
        result
    }

    async fn read_tier<C: CacheTier + ?Sized>(
        &self,
        tier: &C,
        namespace: &str,
        key: &str,
    ) -> CacheResult<Option<Arc<Vec<u8>>>> {
        let result = self.timed(tier.name(), "get", namespace, tier.get(key)).await;
        match &result {
            Ok(Some(_)) => {
                tracing::debug!(key = %key, tier = tier.name(), "cache hit");
                metrics::record_cache_hit(tier.name(), namespace);
            }
            Ok(None) => {
                tracing::debug!(key = %key, tier = tier.name(), "cache miss");
                metrics::record_cache_miss(tier.name(), namespace);
            }
            Err(_) => {}
        }
        result
    }

    /// Report a network call's outcome to the breaker.
    ///
    /// If the caller drops the returned future, the permit is dropped unsettled
    /// and the breaker treats it as a failure.
    async fn settle<R>(
        &self,
        permit: BreakerPermit<'_>,
        operation: &'static str,
        fut: impl Future<Output = CacheResult<R>>,
    ) -> CacheResult<R> {
        let result = fut.await;
        match &result {
            Err(e) if e.is_backend_unavailable() => {
                tracing::warn!(operation, error = %e, "network cache tier call failed");
                permit.fail();
            }
            _ => permit.succeed(),
        }
        result
    }

    /// Decode cached bytes. Corrupt entries are logged and read as a miss.
    fn decode<T: DeserializeOwned>(
        &self,
        tier: &'static str,
        namespace: &str,
        key: &str,
        bytes: &[u8],
    ) -> Option<T> {
        match self.codec.decode(bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    tier,
                    error = %e,
                    "Failed to deserialize cached value"
                );
                metrics::record_cache_error(tier, namespace, e.kind());
                None
            }
        }
    }

    /// Best-effort removal of a corrupt network entry, only when the breaker admits it.
    async fn discard_network(&self, network: &NetworkCache, namespace: &str, key: &str) {
        let Some(permit) = self.breaker.try_acquire() else {
            return;
        };
        let delete = self.timed(
            network.name(),
            "delete",
            namespace,
            CacheTier::delete(network, key),
        );
        let _ = self.settle(permit, "delete", delete).await;
    }
}

/// Builder for [`CacheManager`].
#[derive(Default)]
pub struct CacheManagerBuilder {
    local: Option<InMemoryCache>,
    network: Option<NetworkCache>,
    breaker: BreakerSettings,
    codec: Codec,
    default_ttl: Option<Duration>,
    namespaces: Vec<String>,
}

impl CacheManagerBuilder {
    pub fn local(mut self, cache: InMemoryCache) -> Self {
        self.local = Some(cache);
        self
    }

    pub fn network(mut self, cache: NetworkCache) -> Self {
        self.network = Some(cache);
        self
    }

    pub fn breaker(mut self, settings: BreakerSettings) -> Self {
        self.breaker = settings;
        self
    }

    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Defaults to one hour.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Restrict the manager to these namespaces. No call means any valid namespace.
    pub fn namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespaces.extend(namespaces.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> CacheResult<CacheManager> {
        if self.local.is_none() && self.network.is_none() {
            return Err(CacheError::config("a cache manager needs at least one tier"));
        }

        let default_ttl = self.default_ttl.unwrap_or(Duration::from_secs(3600));
        validate_ttl(Some(default_ttl))?;

        for namespace in &self.namespaces {
            validate_namespace(namespace)?;
        }
        let namespaces =
            (!self.namespaces.is_empty()).then(|| self.namespaces.into_iter().collect());

        Ok(CacheManager {
            local: self.local,
            network: self.network,
            breaker: CircuitBreaker::new(self.breaker),
            codec: self.codec,
            default_ttl,
            namespaces,
        })
    }
}
