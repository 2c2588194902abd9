//! Integration test verifying the tracing output of store operations: the
//! `#[instrument]` spans on `MemoryStore` and the limiter, and the single
//! warning emitted when the factory falls back to the in-process store.

#![allow(clippy::expect_used)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use medai_guard_storage::{
    FixedWindowLimiter, KeyValueStore, MemoryStore, RateLimitConfig, StoreConfig, StoreKind,
    connect_store,
};
use tracing::{Level, Subscriber};
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};

// ---------------------------------------------------------------------------
// Collecting layer: records span names and warning targets
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct Collector {
    spans: Arc<Mutex<Vec<String>>>,
    warnings: Arc<Mutex<Vec<String>>>,
}

impl<S> tracing_subscriber::Layer<S> for Collector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        _attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            self.spans.lock().expect("lock poisoned").push(span.name().to_owned());
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() == Level::WARN && meta.target().starts_with("medai_guard_storage") {
            self.warnings.lock().expect("lock poisoned").push(meta.target().to_owned());
        }
    }
}

fn install() -> (Collector, tracing::subscriber::DefaultGuard) {
    let collector = Collector::default();
    let subscriber = tracing_subscriber::registry().with(collector.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (collector, guard)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn memory_store_set_and_get_create_spans() {
    let (collector, _guard) = install();

    let store = MemoryStore::new();
    store.set("key-1", Bytes::from("value-1"), None).await.expect("set should succeed");
    let _ = store.get("key-1").await;

    let recorded = collector.spans.lock().expect("lock poisoned");
    assert!(recorded.iter().any(|s| s == "set"), "expected a 'set' span, got: {recorded:?}");
    assert!(recorded.iter().any(|s| s == "get"), "expected a 'get' span, got: {recorded:?}");
}

#[tokio::test]
async fn memory_store_incr_creates_span() {
    let (collector, _guard) = install();

    let store = MemoryStore::new();
    store.incr("n", None).await.expect("incr should succeed");

    let recorded = collector.spans.lock().expect("lock poisoned");
    assert!(recorded.iter().any(|s| s == "incr"), "expected an 'incr' span, got: {recorded:?}");
}

#[tokio::test]
async fn limiter_check_creates_span() {
    let (collector, _guard) = install();

    let config = RateLimitConfig::new(5, Duration::from_secs(10)).expect("config");
    let limiter = FixedWindowLimiter::new(Arc::new(MemoryStore::new()), config);
    limiter.check("bob").await.expect("check should succeed");

    let recorded = collector.spans.lock().expect("lock poisoned");
    assert!(recorded.iter().any(|s| s == "check"), "expected a 'check' span, got: {recorded:?}");
}

#[tokio::test]
async fn fallback_warns_exactly_once() {
    let (collector, _guard) = install();

    let config = StoreConfig::builder()
        .url("redis://127.0.0.1:1/")
        .connect_timeout(Duration::from_millis(300))
        .build()
        .expect("config");
    let store = connect_store(&config).await;
    assert_eq!(store.kind(), StoreKind::Memory);

    // Operations on the fallback stay silent.
    store.set("k", Bytes::from("v"), None).await.expect("set");
    assert_eq!(store.get("k").await.expect("get"), Some(Bytes::from("v")));
    store.incr("n", Some(Duration::from_secs(1))).await.expect("incr");

    let warnings = collector.warnings.lock().expect("lock poisoned");
    assert_eq!(warnings.len(), 1, "expected one fallback warning, got: {warnings:?}");
    assert_eq!(warnings[0], "medai_guard_storage::factory");
}
