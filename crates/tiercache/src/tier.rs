//! Capability shared by both cache tiers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheResult;

/// A single cache tier storing already-encoded bytes.
///
/// Implemented by [`crate::InMemoryCache`] (local) and [`crate::NetworkCache`]
/// (shared). Keys are fully-qualified (`namespace:id`).
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Tier label used in logs and metrics (`"local"`, `"network"`).
    fn name(&self) -> &'static str;

    /// Get the bytes stored under `key`.
    ///
    /// Returns `None` if the key is missing or expired.
    async fn get(&self, key: &str) -> CacheResult<Option<Arc<Vec<u8>>>>;

    /// Store bytes under `key`, overwriting any previous value.
    ///
    /// `ttl = None` stores the entry without expiration.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()>;

    /// Remove `key`. Missing keys are not an error.
    async fn delete(&self, key: &str) -> CacheResult<()>;
}

/// Reject TTLs that would produce already-expired entries.
pub(crate) fn validate_ttl(ttl: Option<Duration>) -> CacheResult<()> {
    match ttl {
        Some(ttl) if ttl.is_zero() => Err(crate::error::CacheError::InvalidTtl(
            "TTL must be greater than zero".into(),
        )),
        _ => Ok(()),
    }
}
