//! Transaction atomicity, isolation and edge case tests.
//!
//! The data provider writes a record and its index entry in one transaction,
//! so these tests pin down the all-or-nothing contract: empty transactions,
//! type-conflict rejection, abort isolation, and concurrent commits. These
//! tests run against `MemoryStore`.

#![allow(clippy::expect_used, clippy::panic)]

use bytes::Bytes;
use tokio::task::JoinSet;
use typedkv_storage::{DatabaseIndex, MemoryStore, StorageError, StoreSession};

const DB: DatabaseIndex = DatabaseIndex::DEFAULT;

// ============================================================================
// Empty and trivial transactions
// ============================================================================

/// An empty transaction commits and changes nothing.
#[tokio::test]
async fn test_empty_transaction_commit_noop() {
    let store = MemoryStore::new();
    store.set(DB, "existing", Bytes::from("untouched")).await.expect("setup");

    let txn = store.transaction(DB).await.expect("empty txn");
    assert!(txn.is_empty());
    assert!(txn.commit().await.expect("empty commit should succeed"));

    assert_eq!(store.get(DB, "existing").await.expect("get"), Some(Bytes::from("untouched")));
}

/// A transaction only targets the database it was opened on.
#[tokio::test]
async fn test_transaction_is_scoped_to_its_database() {
    let store = MemoryStore::new();
    let other = DatabaseIndex::new(5);

    let mut txn = store.transaction(other).await.expect("transaction");
    txn.set("Widget:1".into(), Bytes::from("{}"));
    txn.set_add("Widget".into(), "Widget:1".into());
    assert!(txn.commit().await.expect("commit"));

    assert_eq!(store.get(DB, "Widget:1").await.expect("get db 0"), None);
    assert!(store.get(other, "Widget:1").await.expect("get db 5").is_some());
}

/// Opening a transaction on a database the store does not have fails.
#[tokio::test]
async fn test_transaction_on_invalid_database_errors() {
    let store = MemoryStore::new();
    let result = store.transaction(DatabaseIndex::new(99)).await;
    assert!(matches!(
        result,
        Err(StorageError::InvalidDatabase { index: 99, databases: 16 })
    ));
}

// ============================================================================
// Rejection is all-or-nothing
// ============================================================================

/// A type conflict in the last operation rolls back every earlier one.
#[tokio::test]
async fn test_conflict_in_last_operation_rolls_back_all() {
    let store = MemoryStore::new();
    store.set(DB, "not-a-set", Bytes::from("plain")).await.expect("setup");
    store.set(DB, "Widget:0", Bytes::from("original")).await.expect("setup");

    let mut txn = store.transaction(DB).await.expect("transaction");
    for i in 0..10 {
        txn.set(format!("Widget:{i}"), Bytes::from(format!("v{i}")));
    }
    txn.delete("Widget:0".into());
    txn.set_add("not-a-set".into(), "member".into());
    assert_eq!(txn.len(), 12);
    assert!(!txn.commit().await.expect("commit should not error"));

    assert_eq!(store.get(DB, "Widget:0").await.expect("get"), Some(Bytes::from("original")));
    for i in 1..10 {
        assert_eq!(store.get(DB, &format!("Widget:{i}")).await.expect("get"), None);
    }
}

/// A set created and then overwritten by a value in one transaction is a
/// value afterwards.
#[tokio::test]
async fn test_later_operation_overrides_earlier_in_same_transaction() {
    let store = MemoryStore::new();

    let mut txn = store.transaction(DB).await.expect("transaction");
    txn.set_add("k".into(), "m".into());
    txn.set("k".into(), Bytes::from("value"));
    assert!(txn.commit().await.expect("commit"));

    assert_eq!(store.get(DB, "k").await.expect("get"), Some(Bytes::from("value")));
}

/// Adding to a key the same transaction turned into a value is rejected.
#[tokio::test]
async fn test_set_add_after_value_write_in_same_transaction_rejects() {
    let store = MemoryStore::new();

    let mut txn = store.transaction(DB).await.expect("transaction");
    txn.set("k".into(), Bytes::from("value"));
    txn.set_add("k".into(), "m".into());
    assert!(!txn.commit().await.expect("commit"));

    assert_eq!(store.get(DB, "k").await.expect("get"), None);
}

// ============================================================================
// Isolation
// ============================================================================

/// Queued writes are invisible until commit.
#[tokio::test]
async fn test_uncommitted_writes_invisible() {
    let store = MemoryStore::new();

    let mut txn = store.transaction(DB).await.expect("transaction");
    txn.set("Widget:1".into(), Bytes::from("{}"));
    txn.set_add("Widget".into(), "Widget:1".into());

    assert_eq!(store.get(DB, "Widget:1").await.expect("get"), None);
    assert!(store.set_members(DB, "Widget").await.expect("members").is_empty());

    assert!(txn.commit().await.expect("commit"));
    assert!(store.get(DB, "Widget:1").await.expect("get").is_some());
}

/// Removing the last index member inside a transaction deletes the set.
#[tokio::test]
async fn test_transaction_set_remove_deletes_empty_set() {
    let store = MemoryStore::new();
    store.set_add(DB, "Widget", &["Widget:1".to_owned()]).await.expect("setup");

    let mut txn = store.transaction(DB).await.expect("transaction");
    txn.delete("Widget:1".into());
    txn.set_remove("Widget".into(), "Widget:1".into());
    assert!(txn.commit().await.expect("commit"));

    assert_eq!(store.stored_key_count(DB), 0);
}

// ============================================================================
// Concurrency
// ============================================================================

/// Concurrent transactions adding to one index set never lose a member.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transactions_on_shared_index() {
    let store = MemoryStore::new();

    let mut set = JoinSet::new();
    for i in 0..32 {
        let store = store.clone();
        set.spawn(async move {
            let key = format!("Widget:{i:02}");
            let mut txn = store.transaction(DB).await.expect("transaction");
            txn.set(key.clone(), Bytes::from("{}"));
            txn.set_add("Widget".into(), key);
            txn.commit().await.expect("commit")
        });
    }

    while let Some(result) = set.join_next().await {
        assert!(result.expect("task should not panic"), "every commit should succeed");
    }
    assert_eq!(store.set_members(DB, "Widget").await.expect("members").len(), 32);
}
