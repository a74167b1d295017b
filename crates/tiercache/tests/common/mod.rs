//! Scripted network backend for exercising the manager without Redis.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tiercache::{
    BreakerSettings, CacheError, CacheManager, CacheResult, InMemoryCache, NetworkBackend,
    NetworkCache,
};

/// In-memory stand-in for Redis that can be switched off or made to hang.
#[derive(Default)]
pub struct ScriptedBackend {
    data: Mutex<HashMap<String, Vec<u8>>>,
    down: AtomicBool,
    hang: AtomicBool,
    hang_deletes: AtomicBool,
    patterns: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        let backend = Self::default();
        backend.patterns.store(true, Ordering::SeqCst);
        Arc::new(backend)
    }

    /// A backend whose `delete_pattern` keeps the trait default.
    pub fn without_patterns() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    /// Make only `delete` hang; reads and writes keep working.
    pub fn set_hang_deletes(&self, hang: bool) {
        self.hang_deletes.store(hang, Ordering::SeqCst);
    }

    /// Number of calls that reached the backend.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.lock().contains_key(key)
    }

    pub fn raw_insert(&self, key: &str, value: &[u8]) {
        self.data.lock().insert(key.to_string(), value.to_vec());
    }

    async fn enter(&self) -> CacheResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.down.load(Ordering::SeqCst) {
            return Err(CacheError::backend_unavailable("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkBackend for ScriptedBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.enter().await?;
        Ok(self.data.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8], _ttl: Option<Duration>) -> CacheResult<()> {
        self.enter().await?;
        self.data.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.enter().await?;
        if self.hang_deletes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.data.lock().remove(key);
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        if !self.patterns.load(Ordering::SeqCst) {
            return Err(CacheError::Unsupported("delete_pattern"));
        }
        self.enter().await?;
        let prefix = pattern.trim_end_matches('*');
        let mut data = self.data.lock();
        let before = data.len();
        data.retain(|key, _| !key.starts_with(prefix));
        Ok((before - data.len()) as u64)
    }

    async fn ping(&self) -> CacheResult<()> {
        self.enter().await
    }
}

pub fn breaker_settings() -> BreakerSettings {
    BreakerSettings {
        initial_cooldown: Duration::from_secs(1),
        max_cooldown: Duration::from_secs(8),
        multiplier: 2.0,
    }
}

/// Manager with both tiers over `backend`.
pub fn two_tier(backend: Arc<ScriptedBackend>) -> CacheManager {
    CacheManager::builder()
        .local(InMemoryCache::new(1_000, 1024 * 1024))
        .network(NetworkCache::new(backend, Duration::from_millis(200)))
        .breaker(breaker_settings())
        .build()
        .expect("valid manager")
}
