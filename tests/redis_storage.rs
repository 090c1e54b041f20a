//! Integration tests for Redis dedupe storage.
//!
//! These tests require a Redis instance running at `redis://127.0.0.1/`.
//! Tests are ignored by default - run with `cargo test --features redis-storage --test redis_storage -- --ignored`

#![cfg(feature = "redis-storage")]

use bot_insight::{
    classify, BotInsight, DedupeKey, DedupeStore, RedisDedupeConfig, RedisDedupeStore,
    RequestParts, ResponseOutcome, SqliteStore,
};
use std::sync::Arc;
use std::time::Duration;

/// Check if Redis is available before running tests
async fn redis_available() -> bool {
    RedisDedupeStore::connect("redis://127.0.0.1/").await.is_ok()
}

/// Create a test store with unique prefix
async fn create_test_store(test_name: &str) -> RedisDedupeStore {
    let config = RedisDedupeConfig {
        key_prefix: format!("test:{}:", test_name),
    };

    let store = RedisDedupeStore::connect_with_config("redis://127.0.0.1/", config)
        .await
        .expect("Failed to connect to Redis");
    store.clear().await.expect("Failed to clear test keys");
    store
}

fn sample_key(ip: &str) -> DedupeKey {
    let classification = classify(404, "/.env", "curl/8.0").unwrap();
    DedupeKey::new(classification.category(), classification.subtype(), ip, "/.env", "curl/8.0")
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires Redis
async fn test_redis_set_and_exists() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available at redis://127.0.0.1/");
        return;
    }

    let store = create_test_store("set_and_exists").await;
    let key = sample_key("198.51.100.1");

    assert!(!store.exists(&key).unwrap());
    store.set_with_ttl(&key, Duration::from_secs(60)).unwrap();
    assert!(store.exists(&key).unwrap());
    assert!(!store.exists(&sample_key("198.51.100.2")).unwrap());

    assert_eq!(store.clear().await.unwrap(), 1);
    assert!(!store.exists(&key).unwrap());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires Redis
async fn test_redis_key_expires() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }

    let store = create_test_store("expiry").await;
    let key = sample_key("198.51.100.3");

    store.set_with_ttl(&key, Duration::from_secs(1)).unwrap();
    assert!(store.exists(&key).unwrap());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!store.exists(&key).unwrap());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires Redis
async fn test_redis_prefixes_are_isolated() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }

    let eu = create_test_store("prefix_eu").await;
    let us = create_test_store("prefix_us").await;
    let key = sample_key("198.51.100.4");

    eu.set_with_ttl(&key, Duration::from_secs(60)).unwrap();
    assert!(eu.exists(&key).unwrap());
    assert!(!us.exists(&key).unwrap());

    eu.clear().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires Redis
async fn test_two_instances_share_suppression() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }

    let store = Arc::new(create_test_store("shared").await);
    let node = |store: Arc<RedisDedupeStore>| {
        BotInsight::builder()
            .with_sqlite(SqliteStore::open_in_memory().unwrap())
            .with_dedupe_store(store)
            .build()
            .unwrap()
    };
    let first = node(store.clone());
    let second = node(store.clone());

    let request = RequestParts::new("/xmlrpc.php")
        .with_peer_addr("198.51.100.5")
        .with_user_agent("python-requests/2.31");

    let pending = first.capture(&request).unwrap();
    assert!(first.finalize(pending, ResponseOutcome::default()).is_recorded());

    let pending = second.capture(&request).unwrap();
    assert!(!second.finalize(pending, ResponseOutcome::default()).is_recorded());
    assert_eq!(second.metrics().events_suppressed(), 1);

    store.clear().await.unwrap();
}
