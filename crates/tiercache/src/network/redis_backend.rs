//! Redis backend over a `deadpool-redis` connection pool.
//!
//! Each operation checks a connection out of the pool for its own duration.
//! The pooled connection is a guard: it goes back to the pool when dropped,
//! which also covers futures abandoned on timeout.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Pool, PoolConfig, Runtime};
use redis::AsyncCommands;

use super::NetworkBackend;
use crate::config::RedisConfig;
use crate::error::{CacheError, CacheResult};

/// Keys deleted per `DEL` during pattern invalidation.
const DELETE_BATCH: usize = 500;

/// Redis implementation of [`NetworkBackend`].
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
}

impl RedisBackend {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create the connection pool described by `config`.
    pub fn from_config(config: &RedisConfig) -> CacheResult<Self> {
        let url = config.connection_url()?;

        let mut redis_config = deadpool_redis::Config::from_url(url);
        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = Some(config.pool_timeout());
        pool_config.timeouts.create = Some(config.pool_timeout());
        pool_config.timeouts.recycle = Some(config.pool_timeout());
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::config(format!("failed to create Redis pool: {e}")))?;

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl NetworkBackend for RedisBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.pool.get().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = self.pool.get().await?;
        match ttl {
            Some(ttl) => {
                // PSETEX rejects 0; sub-millisecond TTLs round up
                let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
                conn.pset_ex::<_, _, ()>(key, value, millis).await?;
            }
            None => {
                conn.set::<_, _, ()>(key, value).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.pool.get().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let mut conn = self.pool.get().await?;

        // SCAN instead of KEYS so a large keyspace does not block the server
        let keys: Vec<String> = {
            let mut iter: redis::AsyncIter<'_, String> = conn.scan_match(pattern).await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        let mut deleted = 0u64;
        for batch in keys.chunks(DELETE_BATCH) {
            let removed: u64 = conn.del(batch).await?;
            deleted += removed;
        }

        tracing::debug!(pattern = %pattern, deleted, "Redis pattern delete");
        Ok(deleted)
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn close(&self) {
        self.pool.close();
    }
}
