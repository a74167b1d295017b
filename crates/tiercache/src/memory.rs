//! Process-local cache tier: strict LRU with per-entry TTL and size budgets.
//!
//! All structural state (recency order, entry map, byte counter) lives behind
//! a single mutex. Value bytes are copied before the lock is taken and no
//! logging or metrics recording happens while it is held.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::{CacheError, CacheResult};
use crate::tier::{CacheTier, validate_ttl};

/// A cached entry with optional expiration.
///
/// The data is wrapped in `Arc` so hits hand out the bytes without copying.
#[derive(Debug)]
struct CachedEntry {
    data: Arc<Vec<u8>>,
    created_at: Instant,
    expires_at: Option<Instant>,
    /// Key length + value length.
    size: usize,
}

impl CachedEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

struct Inner {
    entries: LruCache<String, CachedEntry>,
    bytes: usize,
}

impl Inner {
    fn remove(&mut self, key: &str) -> Option<CachedEntry> {
        let entry = self.entries.pop(key)?;
        self.bytes -= entry.size;
        Some(entry)
    }
}

/// Statistics for the local tier.
#[derive(Debug, Clone, Default)]
pub struct LocalCacheStats {
    /// Number of entries currently stored (including not-yet-detected expired ones).
    pub entries: usize,
    /// Bytes accounted against the byte budget.
    pub bytes: usize,
    pub max_entries: usize,
    pub max_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to stay within budget.
    pub evictions: u64,
    /// Entries removed because a read found them expired.
    pub expirations: u64,
}

impl LocalCacheStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// In-memory LRU cache bounded by entry count and total bytes.
pub struct InMemoryCache {
    inner: Mutex<Inner>,
    max_entries: usize,
    max_bytes: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl InMemoryCache {
    /// Create a new cache holding at most `max_entries` entries and `max_bytes` bytes.
    ///
    /// Both budgets are clamped to at least 1.
    ///
    /// ```
    /// use tiercache::InMemoryCache;
    ///
    /// let cache = InMemoryCache::new(10_000, 64 * 1024 * 1024);
    /// assert!(cache.is_empty());
    /// ```
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                bytes: 0,
            }),
            max_entries: max_entries.max(1),
            max_bytes: max_bytes.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Get the bytes stored under `key`, marking it most recently used.
    ///
    /// Expired entries are removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        let now = Instant::now();

        let (lookup, expired) = {
            let mut inner = self.inner.lock();
            let lookup = inner
                .entries
                .get(key)
                .map(|entry| (!entry.is_expired(now)).then(|| Arc::clone(&entry.data)));
            let expired = match lookup {
                Some(None) => inner.remove(key),
                _ => None,
            };
            (lookup, expired)
        };

        match lookup {
            Some(Some(data)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(data)
            }
            Some(None) => {
                self.expirations.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                if let Some(entry) = expired {
                    tracing::debug!(
                        key = %key,
                        age_ms = now.duration_since(entry.created_at).as_millis() as u64,
                        "local cache entry expired"
                    );
                }
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or overwrite `key`.
    ///
    /// Evicts least-recently-used entries until both budgets hold again.
    /// Fails with [`CacheError::InvalidTtl`] for a zero TTL and with
    /// [`CacheError::EntryTooLarge`] if the entry alone exceeds the byte budget;
    /// in both cases the cache is left unchanged.
    pub fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        validate_ttl(ttl)?;

        let size = key.len() + value.len();
        if size > self.max_bytes {
            return Err(CacheError::EntryTooLarge {
                size,
                budget: self.max_bytes,
            });
        }

        let now = Instant::now();
        let owned_key = key.to_string();
        let entry = CachedEntry {
            data: Arc::new(value.to_vec()),
            created_at: now,
            expires_at: ttl.map(|ttl| now + ttl),
            size,
        };

        let mut evicted = Vec::new();
        let (len, bytes) = {
            let mut inner = self.inner.lock();
            if let Some(previous) = inner.entries.put(owned_key, entry) {
                inner.bytes -= previous.size;
            }
            inner.bytes += size;

            while inner.entries.len() > self.max_entries || inner.bytes > self.max_bytes {
                match inner.entries.pop_lru() {
                    Some((evicted_key, evicted_entry)) => {
                        inner.bytes -= evicted_entry.size;
                        evicted.push(evicted_key);
                    }
                    None => break,
                }
            }
            (inner.entries.len(), inner.bytes)
        };

        if !evicted.is_empty() {
            self.evictions
                .fetch_add(evicted.len() as u64, Ordering::Relaxed);
            crate::metrics::record_evictions(evicted.len() as u64);
            tracing::debug!(count = evicted.len(), keys = ?evicted, "evicted local cache entries");
        }
        crate::metrics::set_cache_size(len, bytes);

        Ok(())
    }

    /// Remove `key` if present.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.inner.lock().remove(key).is_some();
        if removed {
            tracing::debug!(key = %key, "local cache entry deleted");
        }
        removed
    }

    /// Remove every key starting with `prefix`. Returns the number removed.
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let removed = {
            let mut inner = self.inner.lock();
            let keys: Vec<String> = inner
                .entries
                .iter()
                .filter(|(key, _)| key.starts_with(prefix))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                inner.remove(key);
            }
            keys.len()
        };

        tracing::debug!(prefix = %prefix, removed, "local cache prefix removed");
        removed
    }

    /// Remove all entries.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.bytes = 0;
    }

    /// Remaining time to live for `key`.
    ///
    /// `None` if the key is missing, expired, or stored without expiration.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let inner = self.inner.lock();
        let expires_at = inner.entries.peek(key)?.expires_at?;
        expires_at.checked_duration_since(now).filter(|d| !d.is_zero())
    }

    /// Whether `key` is present (expired entries may still be counted until read).
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains(key)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes accounted against the byte budget.
    pub fn total_bytes(&self) -> usize {
        self.inner.lock().bytes
    }

    pub fn stats(&self) -> LocalCacheStats {
        let (entries, bytes) = {
            let inner = self.inner.lock();
            (inner.entries.len(), inner.bytes)
        };
        LocalCacheStats {
            entries,
            bytes,
            max_entries: self.max_entries,
            max_bytes: self.max_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("max_entries", &self.max_entries)
            .field("max_bytes", &self.max_bytes)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CacheTier for InMemoryCache {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Arc<Vec<u8>>>> {
        Ok(InMemoryCache::get(self, key))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        InMemoryCache::set(self, key, value, ttl)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        InMemoryCache::delete(self, key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: usize = 1024 * 1024;

    #[tokio::test(start_paused = true)]
    async fn test_get_set_roundtrip() {
        let cache = InMemoryCache::new(10, MB);
        cache
            .set("menu:item:42", b"value", Some(Duration::from_secs(60)))
            .unwrap();

        assert_eq!(cache.get("menu:item:42").unwrap().as_slice(), b"value");
        assert!(cache.get("menu:missing").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.bytes, "menu:item:42".len() + 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let cache = InMemoryCache::new(10, MB);
        cache.set("k", b"v", Some(Duration::from_secs(60))).unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("k").is_some());
        assert_eq!(cache.ttl("k"), Some(Duration::from_secs(1)));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("k").is_none());

        // Expired entry is removed lazily on read
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.total_bytes(), 0);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ttl_never_expires() {
        let cache = InMemoryCache::new(10, MB);
        cache.set("k", b"v", None).unwrap();

        tokio::time::advance(Duration::from_secs(365 * 24 * 3600)).await;
        assert!(cache.get("k").is_some());
        assert_eq!(cache.ttl("k"), None);
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let cache = InMemoryCache::new(10, MB);
        let err = cache.set("k", b"v", Some(Duration::ZERO)).unwrap_err();
        assert!(matches!(err, CacheError::InvalidTtl(_)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_overwrite_refreshes_value_and_size() {
        let cache = InMemoryCache::new(10, MB);
        cache.set("k", b"short", None).unwrap();
        cache.set("k", b"a much longer value", None).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k").unwrap().as_slice(), b"a much longer value");
        assert_eq!(cache.total_bytes(), 1 + "a much longer value".len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_resets_expiration() {
        let cache = InMemoryCache::new(10, MB);
        cache.set("k", b"v1", Some(Duration::from_secs(10))).unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set("k", b"v2", Some(Duration::from_secs(10))).unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;

        assert_eq!(cache.get("k").unwrap().as_slice(), b"v2");
    }

    #[test]
    fn test_lru_eviction_by_entry_count() {
        let cache = InMemoryCache::new(3, MB);
        cache.set("a", b"1", None).unwrap();
        cache.set("b", b"2", None).unwrap();
        cache.set("c", b"3", None).unwrap();
        cache.set("d", b"4", None).unwrap();

        assert_eq!(cache.len(), 3);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
        assert!(cache.get("d").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_get_refreshes_recency() {
        let cache = InMemoryCache::new(3, MB);
        cache.set("a", b"1", None).unwrap();
        cache.set("b", b"2", None).unwrap();
        cache.set("c", b"3", None).unwrap();

        // "a" becomes most recently used, so "b" is the eviction victim
        assert!(cache.get("a").is_some());
        cache.set("d", b"4", None).unwrap();

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert!(cache.contains("d"));
    }

    #[test]
    fn test_lru_eviction_by_byte_budget() {
        // Each entry is 1 (key) + 10 (value) = 11 bytes
        let cache = InMemoryCache::new(100, 33);
        cache.set("a", &[0u8; 10], None).unwrap();
        cache.set("b", &[0u8; 10], None).unwrap();
        cache.set("c", &[0u8; 10], None).unwrap();
        assert_eq!(cache.total_bytes(), 33);

        cache.set("d", &[0u8; 20], None).unwrap();

        // 21 new bytes need two victims
        assert!(!cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert!(cache.contains("d"));
        assert_eq!(cache.total_bytes(), 32);
        assert!(cache.total_bytes() <= 33);
    }

    #[test]
    fn test_entry_larger_than_budget_rejected() {
        let cache = InMemoryCache::new(100, 16);
        cache.set("k", b"small", None).unwrap();

        let err = cache.set("k", &[0u8; 64], None).unwrap_err();
        assert!(matches!(
            err,
            CacheError::EntryTooLarge { size: 65, budget: 16 }
        ));
        // Previous value untouched
        assert_eq!(cache.get("k").unwrap().as_slice(), b"small");
    }

    #[test]
    fn test_delete_and_clear() {
        let cache = InMemoryCache::new(10, MB);
        cache.set("a", b"1", None).unwrap();
        cache.set("b", b"2", None).unwrap();

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert!(cache.get("a").is_none());

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn test_remove_prefix() {
        let cache = InMemoryCache::new(10, MB);
        cache.set("ns1:a", b"1", None).unwrap();
        cache.set("ns1:b", b"2", None).unwrap();
        cache.set("ns10:a", b"3", None).unwrap();
        cache.set("ns2:a", b"4", None).unwrap();

        assert_eq!(cache.remove_prefix("ns1:"), 2);
        assert!(!cache.contains("ns1:a"));
        assert!(cache.contains("ns10:a"));
        assert!(cache.contains("ns2:a"));
        assert_eq!(cache.total_bytes(), "ns10:a".len() + 1 + "ns2:a".len() + 1);
    }

    #[tokio::test]
    async fn test_concurrent_writers_stay_within_budget() {
        let cache = Arc::new(InMemoryCache::new(50, MB));
        let mut handles = Vec::new();

        for task in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                for i in 0..200 {
                    let key = format!("t{task}:{i}");
                    cache.set(&key, b"payload", None).unwrap();
                    let _ = cache.get(&key);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len(), 50);
        assert_eq!(cache.stats().evictions, 8 * 200 - 50);
    }

    #[tokio::test]
    async fn test_tier_trait() {
        let cache = InMemoryCache::new(10, MB);
        let tier: &dyn CacheTier = &cache;

        assert_eq!(tier.name(), "local");
        tier.set("k", b"v", None).await.unwrap();
        assert_eq!(tier.get("k").await.unwrap().unwrap().as_slice(), b"v");
        tier.delete("k").await.unwrap();
        assert!(tier.get("k").await.unwrap().is_none());
    }
}
