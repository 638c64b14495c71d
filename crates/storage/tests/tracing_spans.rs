//! Integration test verifying that `#[instrument]` annotations produce
//! the expected spans on `MemoryStore` and lock provider operations.

#![allow(clippy::expect_used)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};
use typedkv_storage::{
    DatabaseIndex, LockProvider, MemoryLockProvider, MemoryStore, StoreSession,
};

const DB: DatabaseIndex = DatabaseIndex::DEFAULT;

// ---------------------------------------------------------------------------
// Collecting layer, records span names as they are created
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct SpanCollector {
    spans: Arc<Mutex<Vec<String>>>,
}

impl<S> tracing_subscriber::Layer<S> for SpanCollector
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
}

fn assert_span(spans: &Arc<Mutex<Vec<String>>>, name: &str) {
    let recorded = spans.lock().expect("lock poisoned");
    assert!(recorded.iter().any(|s| s == name), "expected a '{name}' span, got: {recorded:?}");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn memory_store_set_creates_span() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(collector));

    let store = MemoryStore::new();
    store.set(DB, "key-1", Bytes::from("value-1")).await.expect("set should succeed");

    assert_span(&spans, "set");
}

#[tokio::test]
async fn memory_store_get_creates_span() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(collector));

    let store = MemoryStore::new();
    let _ = store.get(DB, "missing").await;

    assert_span(&spans, "get");
}

#[tokio::test]
async fn memory_store_multi_get_creates_span() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(collector));

    let store = MemoryStore::new();
    let _ = store.multi_get(DB, &["a".to_owned(), "b".to_owned()]).await;

    assert_span(&spans, "multi_get");
}

#[tokio::test]
async fn memory_store_set_operations_create_spans() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(collector));

    let store = MemoryStore::new();
    let members = ["m".to_owned()];
    store.set_add(DB, "s", &members).await.expect("set_add");
    store.set_members(DB, "s").await.expect("set_members");
    store.set_remove(DB, "s", &members).await.expect("set_remove");

    assert_span(&spans, "set_add");
    assert_span(&spans, "set_members");
    assert_span(&spans, "set_remove");
}

#[tokio::test]
async fn memory_store_scan_creates_span() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(collector));

    let store = MemoryStore::new();
    let endpoint = store.endpoints().into_iter().next().expect("endpoint");
    let _ = store.keys_by_prefix(&endpoint, DB, "Widget").await;

    assert_span(&spans, "keys_by_prefix");
}

#[tokio::test]
async fn memory_store_transaction_creates_span() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(collector));

    let store = MemoryStore::new();
    let _ = store.transaction(DB).await;

    assert_span(&spans, "transaction");
}

#[tokio::test]
async fn memory_store_health_check_creates_span() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(collector));

    let store = MemoryStore::new();
    let _ = store.health_check().await;

    assert_span(&spans, "health_check");
}

#[tokio::test]
async fn lock_acquire_creates_span() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(collector));

    let locks = MemoryLockProvider::new();
    let handle = locks.try_acquire("Widget:1", Duration::from_secs(30)).await.expect("acquire");
    if let Some(handle) = handle {
        handle.release().await.expect("release");
    }

    assert_span(&spans, "try_acquire");
}
