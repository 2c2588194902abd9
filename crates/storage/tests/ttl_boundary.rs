//! TTL boundary condition tests for `MemoryStore`.
//!
//! Covers zero TTLs, very large TTLs, expiry of counters created by `incr`,
//! TTL clearing via `set`, and `expire` on keys at or past their deadline.

#![allow(clippy::expect_used, clippy::panic)]

use std::time::Duration;

use bytes::Bytes;
use medai_guard_storage::{KeyValueStore, MemoryStore};

// ============================================================================
// Zero TTL
// ============================================================================

/// A zero TTL stores nothing; a revocation marker for an already-expired
/// token must not linger.
#[tokio::test]
async fn test_zero_ttl_set_stores_nothing() {
    let store = MemoryStore::new();

    store.set("zero-ttl", Bytes::from("ephemeral"), Some(Duration::ZERO)).await.expect("set");

    let result = store.get("zero-ttl").await.expect("get should not error");
    assert_eq!(result, None, "a key with zero TTL must not be readable");
}

/// `incr` with a zero `ttl_if_new` creates a persistent counter rather than
/// one that vanishes immediately.
#[tokio::test]
async fn test_incr_with_zero_ttl_is_persistent() {
    let store = MemoryStore::new();
    assert_eq!(store.incr("c", Some(Duration::ZERO)).await.expect("incr"), 1);
    assert_eq!(store.ttl("c"), None);
    assert_eq!(store.incr("c", Some(Duration::ZERO)).await.expect("incr"), 2);
}

/// `expire` with zero removes the key and reports that it existed.
#[tokio::test]
async fn test_expire_zero_removes_key() {
    let store = MemoryStore::new();
    store.set("k", Bytes::from("v"), None).await.expect("set");
    assert!(store.expire("k", Duration::ZERO).await.expect("expire"));
    assert_eq!(store.get("k").await.expect("get"), None);
}

// ============================================================================
// Maximum / Large TTL
// ============================================================================

/// A key with a huge TTL must neither overflow nor expire.
#[tokio::test]
async fn test_large_ttl_no_overflow() {
    let store = MemoryStore::new();

    store.set("forever", Bytes::from("value"), Some(Duration::MAX)).await.expect("set");
    assert_eq!(store.get("forever").await.expect("get"), Some(Bytes::from("value")));

    let hundred_years = Duration::from_secs(100 * 365 * 24 * 3600);
    store.set("long-lived", Bytes::from("value"), Some(hundred_years)).await.expect("set");
    let ttl = store.ttl("long-lived").expect("long-lived key should have a ttl");
    assert!(ttl > Duration::from_secs(99 * 365 * 24 * 3600));
}

// ============================================================================
// Expiry boundaries
// ============================================================================

/// A counter created with a TTL expires and the next `incr` starts a fresh
/// window at 1.
#[tokio::test]
async fn test_counter_window_expires() {
    let store = MemoryStore::new();
    let window = Duration::from_millis(30);

    for expected in 1..=3 {
        assert_eq!(store.incr("window", Some(window)).await.expect("incr"), expected);
    }

    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(store.incr("window", Some(window)).await.expect("incr"), 1);
}

/// `expire` on a key whose deadline has already passed reports `false`.
#[tokio::test]
async fn test_expire_on_expired_key_returns_false() {
    let store = MemoryStore::new();
    store.set("k", Bytes::from("v"), Some(Duration::from_millis(10))).await.expect("set");
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!store.expire("k", Duration::from_secs(10)).await.expect("expire"));
}

/// `set` without a TTL replaces a TTL'd key with a persistent one.
#[tokio::test]
async fn test_set_clears_previous_ttl() {
    let store = MemoryStore::new();
    store.set("k", Bytes::from("v1"), Some(Duration::from_millis(10))).await.expect("set");
    store.set("k", Bytes::from("v2"), None).await.expect("set");
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(store.get("k").await.expect("get"), Some(Bytes::from("v2")));
}

/// The background sweep physically removes expired keys.
#[tokio::test]
async fn test_background_sweep_removes_expired_keys() {
    let store = MemoryStore::new();
    store.set("short", Bytes::from("v"), Some(Duration::from_millis(10))).await.expect("set");
    store.set("keep", Bytes::from("v"), None).await.expect("set");

    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(store.len(), 1);
    assert_eq!(store.get("keep").await.expect("get"), Some(Bytes::from("v")));
}
