//! Integration tests against a real Redis.
//!
//! Tests use testcontainers to spin up a Redis instance and need Docker:
//! `cargo test -p tiercache --test redis_cache -- --ignored`

use std::time::Duration;

use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tiercache::{CacheConfig, CacheManager, RedisConfig};
use tokio::sync::OnceCell;

// Shared Redis container for all tests
static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

async fn get_redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");

            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            let url = format!("redis://127.0.0.1:{}", host_port);

            (container, url)
        })
        .await;

    url.clone()
}

async fn config(prefix: &str) -> CacheConfig {
    CacheConfig {
        redis: RedisConfig {
            enabled: true,
            url: get_redis_url().await,
            key_prefix: Some(prefix.to_string()),
            timeout_ms: 2000,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_redis_connection() {
    let cache = CacheManager::from_config(&config("conn").await).await.unwrap();

    assert!(cache.probe().await);
    assert_eq!(cache.stats().mode(), "local+network");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_values_shared_between_instances() {
    let cfg = config("shared").await;
    let writer = CacheManager::from_config(&cfg).await.unwrap();
    let reader = CacheManager::from_config(&cfg).await.unwrap();

    writer
        .set_with_ttl("menu", "item:42", &serde_json::json!({"price": 9.5}), Duration::from_secs(60))
        .await
        .unwrap();

    let value: Option<serde_json::Value> = reader.get("menu", "item:42").await.unwrap();
    assert_eq!(value, Some(serde_json::json!({"price": 9.5})));

    writer.delete("menu", "item:42").await.unwrap();
    assert_eq!(reader.get::<serde_json::Value>("menu", "item:42").await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_native_expiration() {
    let cache = CacheManager::from_config(&config("ttl").await).await.unwrap();

    cache
        .set_with_ttl("menu", "short", &1, Duration::from_millis(200))
        .await
        .unwrap();
    assert_eq!(cache.get::<i32>("menu", "short").await.unwrap(), Some(1));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(cache.get::<i32>("menu", "short").await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_namespace_invalidation_across_instances() {
    let cfg = config("invalidate").await;
    let first = CacheManager::from_config(&cfg).await.unwrap();
    let second = CacheManager::from_config(&cfg).await.unwrap();

    for i in 0..1200 {
        first.set("menu", &format!("item:{i}"), &i).await.unwrap();
    }
    first.set("sales", "q1", &"kept").await.unwrap();

    second.invalidate_namespace("menu").await.unwrap();

    assert_eq!(first.get::<i32>("menu", "item:7").await.unwrap(), None);
    assert_eq!(first.get::<i32>("menu", "item:1199").await.unwrap(), None);
    assert_eq!(
        first.get::<String>("sales", "q1").await.unwrap().as_deref(),
        Some("kept")
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_key_prefix_isolates_deployments() {
    let blue = CacheManager::from_config(&config("blue").await).await.unwrap();
    let green = CacheManager::from_config(&config("green").await).await.unwrap();

    blue.set("menu", "a", &"blue").await.unwrap();
    green.set("menu", "a", &"green").await.unwrap();
    green.invalidate_namespace("menu").await.unwrap();

    assert_eq!(blue.get::<String>("menu", "a").await.unwrap().as_deref(), Some("blue"));
}
