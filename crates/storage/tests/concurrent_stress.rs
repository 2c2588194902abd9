//! Concurrent access stress tests for `MemoryStore` and `FixedWindowLimiter`.
//!
//! These tests drive the in-process store from many tasks at once to detect
//! lost updates in `incr` and over-admission in the rate limiter. They run on
//! the multi-threaded runtime so tasks genuinely interleave.

#![allow(clippy::expect_used, clippy::panic)]

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use medai_guard_storage::{
    FixedWindowLimiter, KeyValueStore, ManualClock, MemoryStore, RateLimitConfig, StorageError,
};
use tokio::task::JoinSet;

/// Number of concurrent tasks for most tests.
const CONCURRENCY: usize = 16;

/// Number of operations each task performs.
const OPS_PER_TASK: usize = 100;

// ---------------------------------------------------------------------------
// Test: Parallel incr on one key (no lost updates)
// ---------------------------------------------------------------------------

/// Spawns `CONCURRENCY` tasks that each increment the same counter
/// `OPS_PER_TASK` times. Every returned value must be unique and the final
/// count must equal the total number of increments.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_incr_has_no_lost_updates() {
    let store = MemoryStore::new();

    let mut set = JoinSet::new();
    for _ in 0..CONCURRENCY {
        let store = store.clone();
        set.spawn(async move {
            let mut seen = Vec::with_capacity(OPS_PER_TASK);
            for _ in 0..OPS_PER_TASK {
                seen.push(
                    store.incr("counter", Some(Duration::from_secs(60))).await.expect("incr"),
                );
            }
            seen
        });
    }

    let mut all = Vec::with_capacity(CONCURRENCY * OPS_PER_TASK);
    while let Some(result) = set.join_next().await {
        all.extend(result.expect("task should not panic"));
    }

    all.sort_unstable();
    let expected: Vec<i64> = (1..=(CONCURRENCY * OPS_PER_TASK) as i64).collect();
    assert_eq!(all, expected, "each increment must observe a distinct value");
}

// ---------------------------------------------------------------------------
// Test: Exactly L accepts under contention
// ---------------------------------------------------------------------------

/// `CONCURRENCY * 4` tasks race one identity against a quota of 10 inside a
/// single frozen window. Exactly 10 must be accepted.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn limiter_accepts_exactly_the_quota_under_contention() {
    const LIMIT: u64 = 10;

    let clock = ManualClock::at_unix(1_700_000_001);
    let config = RateLimitConfig::new(LIMIT, Duration::from_secs(10)).expect("config");
    let limiter = Arc::new(
        FixedWindowLimiter::new(Arc::new(MemoryStore::new()), config)
            .with_clock(Arc::new(clock)),
    );

    let mut set = JoinSet::new();
    for _ in 0..CONCURRENCY * 4 {
        let limiter = Arc::clone(&limiter);
        set.spawn(async move { limiter.check("bob").await });
    }

    let mut accepted = 0u64;
    let mut rejected = 0u64;
    while let Some(result) = set.join_next().await {
        match result.expect("task should not panic") {
            Ok(_) => accepted += 1,
            Err(StorageError::RateLimitExceeded { retry_after }) => {
                assert!(retry_after <= Duration::from_secs(10));
                rejected += 1;
            },
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(accepted, LIMIT);
    assert_eq!(rejected, (CONCURRENCY * 4) as u64 - LIMIT);

    let snapshot = limiter.metrics_snapshot();
    assert_eq!(snapshot.allowed, LIMIT);
    assert_eq!(snapshot.rejected, rejected);
}

/// Separate identities contending at the same time each get their own quota.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn limiter_isolates_identities_under_contention() {
    let clock = ManualClock::at_unix(1_700_000_001);
    let config = RateLimitConfig::new(3, Duration::from_secs(10)).expect("config");
    let limiter = Arc::new(
        FixedWindowLimiter::new(Arc::new(MemoryStore::new()), config)
            .with_clock(Arc::new(clock)),
    );

    let mut set = JoinSet::new();
    for identity in 0..CONCURRENCY {
        for _ in 0..5 {
            let limiter = Arc::clone(&limiter);
            set.spawn(async move { (identity, limiter.check(&format!("user-{identity}")).await.is_ok()) });
        }
    }

    let mut accepted = vec![0u32; CONCURRENCY];
    while let Some(result) = set.join_next().await {
        let (identity, ok) = result.expect("task should not panic");
        if ok {
            accepted[identity] += 1;
        }
    }

    assert!(accepted.iter().all(|&n| n == 3), "per-identity accepts: {accepted:?}");
}

// ---------------------------------------------------------------------------
// Test: Mixed readers and writers
// ---------------------------------------------------------------------------

/// Writers and readers on disjoint keys never block each other indefinitely
/// and every reader observes either nothing or a complete value.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_readers_and_writers() {
    let store = MemoryStore::new();

    let mut set = JoinSet::new();
    for task_id in 0..CONCURRENCY {
        let store = store.clone();
        set.spawn(async move {
            for i in 0..OPS_PER_TASK {
                let key = format!("k:{}", i % 8);
                if task_id % 2 == 0 {
                    let value = Bytes::from(format!("task{task_id}-val{i}"));
                    store.set(&key, value, Some(Duration::from_secs(30))).await.expect("set");
                } else if let Some(value) = store.get(&key).await.expect("get") {
                    let s = std::str::from_utf8(&value).expect("utf-8");
                    assert!(s.starts_with("task"), "torn value: {s}");
                }
            }
        });
    }

    while let Some(result) = set.join_next().await {
        result.expect("task should not panic");
    }

    assert_eq!(store.len(), 8);
}
