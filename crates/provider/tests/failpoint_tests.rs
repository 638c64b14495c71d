#![cfg(feature = "failpoints")]
#![allow(clippy::expect_used, clippy::panic)]
//! Fault-injection tests for the provider.
//!
//! These tests require the `failpoints` feature:
//! ```bash
//! cargo test -p typedkv-provider --features failpoints --test failpoint_tests
//! ```

use std::sync::Arc;

use typedkv_provider::{DataProvider, LockMode, ProviderError};
use typedkv_storage::{
    DatabaseIndex, MemoryLockProvider, MemoryStore, StoreSession, testutil::Widget,
};

const DB: DatabaseIndex = DatabaseIndex::DEFAULT;

fn fixture() -> (MemoryStore, Arc<MemoryLockProvider>, DataProvider<Widget>) {
    let store = MemoryStore::new();
    let locks = Arc::new(MemoryLockProvider::new());
    let provider =
        DataProvider::for_type(Arc::new(store.clone()), locks.clone()).expect("provider");
    (store, locks, provider)
}

#[tokio::test]
async fn rejected_transaction_reports_false_and_writes_nothing() {
    let scenario = fail::FailScenario::setup();
    fail::cfg("memory-txn-commit", "return").expect("failed to configure fail point");

    let (store, _, provider) = fixture();
    let committed = provider
        .insert_or_update("Widget:1", &Widget::numbered(1), LockMode::Unlocked)
        .await
        .expect("rejection is not an error");

    assert!(!committed);
    assert_eq!(store.get(DB, "Widget:1").await.expect("get"), None);
    assert!(provider.get_keys_in_set().await.expect("members").is_empty());

    scenario.teardown();
}

#[tokio::test]
async fn rejected_guarded_write_still_releases_its_lock() {
    let scenario = fail::FailScenario::setup();
    fail::cfg("memory-txn-commit", "return").expect("failed to configure fail point");

    let (_, locks, provider) = fixture();
    let committed = provider
        .insert_or_update("Widget:1", &Widget::numbered(1), LockMode::Optimistic)
        .await
        .expect("rejection is not an error");

    assert!(!committed);
    assert!(!locks.is_locked("Widget:1"));

    scenario.teardown();
}

#[tokio::test]
async fn rejected_delete_keeps_record_and_index_entry() {
    let (store, _, provider) = fixture();
    provider
        .insert_or_update("Widget:1", &Widget::numbered(1), LockMode::Unlocked)
        .await
        .expect("insert");

    let scenario = fail::FailScenario::setup();
    fail::cfg("memory-txn-commit", "return").expect("failed to configure fail point");

    let removed = provider.delete("Widget:1", LockMode::Unlocked).await.expect("delete");

    assert!(!removed);
    assert!(store.get(DB, "Widget:1").await.expect("get").is_some());
    assert_eq!(provider.get_keys_in_set().await.expect("members"), vec!["Widget:1"]);

    scenario.teardown();
}

#[tokio::test]
async fn failing_health_check_surfaces_as_storage_error() {
    let scenario = fail::FailScenario::setup();
    fail::cfg("memory-health-check", "return").expect("failed to configure fail point");

    let (_, _, provider) = fixture();
    let result = provider.health_check().await;

    assert!(matches!(result, Err(ProviderError::Storage(_))));

    scenario.teardown();
}
