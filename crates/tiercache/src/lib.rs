//! Two-tier cache for multi-instance services.
//!
//! ## Architecture
//!
//! - **Local tier (LRU)**: In-process, bounded by entry count and bytes
//! - **Network tier (Redis)**: Shared across instances, guarded by a circuit breaker
//!
//! ## Cache Hierarchy
//!
//! ```text
//! get → network (Redis) ──unavailable──▶ local (LRU) ──▶ miss
//!            ~1ms                            <1µs
//! ```
//!
//! ## Graceful Degradation
//!
//! If Redis is unavailable or disabled, the manager serves from the local tier.
//! While the breaker is cooling down, no network I/O is attempted at all; the
//! first call after the cool-down probes the backend.
//!
//! ```no_run
//! use std::time::Duration;
//! use tiercache::{CacheConfig, CacheManager};
//!
//! # async fn run() -> tiercache::CacheResult<()> {
//! let cache = CacheManager::from_config(&CacheConfig::default()).await?;
//! cache
//!     .set_with_ttl("menu", "item:42", &serde_json::json!({"price": 9.5}), Duration::from_secs(60))
//!     .await?;
//! let item: Option<serde_json::Value> = cache.get("menu", "item:42").await?;
//! # Ok(())
//! # }
//! ```

pub mod breaker;
pub mod codec;
pub mod config;
pub mod error;
pub mod key;
pub mod manager;
pub mod memory;
pub mod metrics;
pub mod network;
pub mod observability;
pub mod tier;

pub use breaker::{BreakerPermit, BreakerSettings, BreakerState, CircuitBreaker};
pub use codec::Codec;
pub use config::{BreakerConfig, CacheConfig, LocalCacheConfig, LoggingConfig, RedisConfig};
pub use error::{CacheError, CacheResult};
pub use key::CacheKey;
pub use manager::{CacheHealth, CacheManager, CacheManagerBuilder, CacheStats};
pub use memory::{InMemoryCache, LocalCacheStats};
pub use network::{NetworkBackend, NetworkCache, RedisBackend};
pub use observability::{apply_logging_level, init_tracing, init_tracing_with_level};
pub use tier::CacheTier;
