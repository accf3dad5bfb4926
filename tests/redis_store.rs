//! Integration tests for the Redis counter store.
//!
//! These tests require a Redis instance running at `redis://127.0.0.1/`.
//! Tests are ignored by default - run with `cargo test --features redis-store --test redis_store -- --ignored`

#![cfg(feature = "redis-store")]

use faultline::resilience::{RateLimiter, RateLimiterConfig, RedisCounterStore, SharedCounterStore};
use std::sync::Arc;
use std::time::Duration;

const REDIS_URL: &str = "redis://127.0.0.1/";

/// Check if Redis is available before running tests
async fn redis_available() -> bool {
    RedisCounterStore::connect(REDIS_URL).await.is_ok()
}

/// Key prefix unique to one test run
fn test_prefix(test_name: &str) -> String {
    format!("faultline:test:{}:{}:", test_name, uuid::Uuid::new_v4())
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_incr_window_counts_up() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available at {}", REDIS_URL);
        return;
    }
    let store = RedisCounterStore::connect(REDIS_URL).await.unwrap();
    let key = format!("{}counter", test_prefix("incr"));

    for expected in 1..=3u64 {
        let n = store.incr_window(&key, Duration::from_secs(10)).await.unwrap();
        assert_eq!(n, expected);
    }
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_counter_expires_after_ttl() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }
    let store = RedisCounterStore::connect(REDIS_URL).await.unwrap();
    let key = format!("{}expiring", test_prefix("ttl"));

    assert_eq!(store.incr_window(&key, Duration::from_millis(100)).await.unwrap(), 1);
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(store.incr_window(&key, Duration::from_millis(100)).await.unwrap(), 1);
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_two_limiters_share_budget() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }
    let store: Arc<dyn SharedCounterStore> =
        Arc::new(RedisCounterStore::connect(REDIS_URL).await.unwrap());
    let cfg = RateLimiterConfig::new()
        .with_limit(4)
        .with_window(Duration::from_secs(3600))
        .with_key_prefix(test_prefix("shared"));
    let a = RateLimiter::distributed(cfg.clone(), Arc::clone(&store));
    let b = RateLimiter::distributed(cfg, store);

    let mut allowed = 0;
    for _ in 0..4 {
        allowed += a.allow("global").await as u32;
        allowed += b.allow("global").await as u32;
    }
    assert_eq!(allowed, 4);
    assert!(!a.is_degraded());
}

#[tokio::test]
async fn test_connect_to_bad_url_fails() {
    assert!(RedisCounterStore::connect("not-a-url").await.is_err());
}
