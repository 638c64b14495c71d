//! Conformance test suite for [`StoreSession`] implementations.
//!
//! Every function here checks one aspect of the session contract the data
//! provider relies on. A new session implementation runs the same suite to
//! prove it behaves like [`MemoryStore`](crate::MemoryStore).
//!
//! # Usage
//!
//! Enable the `testutil` feature and call each conformance function with a
//! fresh session:
//!
//! ```no_run
//! use typedkv_storage::{MemoryStore, conformance};
//!
//! #[tokio::test]
//! async fn crud_get_returns_none_for_missing_key() {
//!     conformance::crud_get_returns_none_for_missing_key(&MemoryStore::new()).await;
//! }
//! ```
//!
//! # Test Categories
//!
//! | Category | Contract aspect |
//! |----------|-----------------|
//! | CRUD | get/multi_get/set/delete semantics |
//! | Sets | membership, removal, emptied sets |
//! | Scan | per-endpoint prefix enumeration |
//! | Transaction | all-or-nothing commit |
//! | Conditional | `set_if_absent` / `delete_if_equals` lock primitives |
//! | Concurrent | thread-safety under parallel access |
//! | Error semantics | error variant classification |

use std::{sync::Arc, time::Duration};

use bytes::Bytes;

use crate::{session::StoreSession, types::DatabaseIndex};

const DB: DatabaseIndex = DatabaseIndex::DEFAULT;

fn owned(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|key| (*key).to_owned()).collect()
}

// ============================================================================
// CRUD
// ============================================================================

/// `get` on a nonexistent key returns `Ok(None)`.
pub async fn crud_get_returns_none_for_missing_key<S: StoreSession>(store: &S) {
    let result = store.get(DB, "nonexistent").await;
    assert!(result.is_ok(), "get should not error on missing key: {result:?}");
    assert_eq!(result.expect("checked above"), None, "missing key should return None");
}

/// `set` then `get` round-trips the value.
pub async fn crud_set_then_get_returns_value<S: StoreSession>(store: &S) {
    store.set(DB, "crud:k1", Bytes::from("v1")).await.expect("set should succeed");
    let val = store.get(DB, "crud:k1").await.expect("get should succeed");
    assert_eq!(val, Some(Bytes::from("v1")));
}

/// `set` on an existing key overwrites the value.
pub async fn crud_set_overwrites_existing<S: StoreSession>(store: &S) {
    store.set(DB, "crud:k2", Bytes::from("original")).await.expect("set");
    store.set(DB, "crud:k2", Bytes::from("updated")).await.expect("overwrite");
    let val = store.get(DB, "crud:k2").await.expect("get");
    assert_eq!(val, Some(Bytes::from("updated")));
}

/// `multi_get` answers every key in request order, `None` for misses.
pub async fn crud_multi_get_is_positional<S: StoreSession>(store: &S) {
    store.set(DB, "mget:a", Bytes::from("a")).await.expect("set a");
    store.set(DB, "mget:c", Bytes::from("c")).await.expect("set c");

    let values =
        store.multi_get(DB, &owned(&["mget:c", "mget:b", "mget:a"])).await.expect("multi_get");
    assert_eq!(values, vec![Some(Bytes::from("c")), None, Some(Bytes::from("a"))]);
}

/// `delete` reports how many of the requested keys existed.
pub async fn crud_delete_counts_removed<S: StoreSession>(store: &S) {
    store.set(DB, "del:a", Bytes::from("v")).await.expect("set a");
    store.set(DB, "del:b", Bytes::from("v")).await.expect("set b");

    let removed =
        store.delete(DB, &owned(&["del:a", "del:b", "del:ghost"])).await.expect("delete");
    assert_eq!(removed, 2);
    assert_eq!(store.get(DB, "del:a").await.expect("get"), None);
}

/// Databases are independent keyspaces.
pub async fn crud_databases_are_isolated<S: StoreSession>(store: &S) {
    let other = DatabaseIndex::new(1);
    store.set(other, "iso:k", Bytes::from("one")).await.expect("set in db 1");

    assert_eq!(store.get(DB, "iso:k").await.expect("get db 0"), None);
    assert_eq!(store.get(other, "iso:k").await.expect("get db 1"), Some(Bytes::from("one")));
}

// ============================================================================
// Sets
// ============================================================================

/// `set_add` counts only new members and `set_members` lists them all.
pub async fn set_add_and_members<S: StoreSession>(store: &S) {
    let added = store.set_add(DB, "sets:a", &owned(&["x", "y", "x"])).await.expect("set_add");
    assert_eq!(added, 2);
    let added = store.set_add(DB, "sets:a", &owned(&["y", "z"])).await.expect("set_add again");
    assert_eq!(added, 1);

    let mut members = store.set_members(DB, "sets:a").await.expect("set_members");
    members.sort();
    assert_eq!(members, owned(&["x", "y", "z"]));
}

/// Removing the last member removes the set.
pub async fn set_remove_last_member_removes_set<S: StoreSession>(store: &S) {
    store.set_add(DB, "sets:b", &owned(&["only"])).await.expect("set_add");
    let removed = store.set_remove(DB, "sets:b", &owned(&["only", "ghost"])).await.expect("rm");
    assert_eq!(removed, 1);

    assert!(store.set_members(DB, "sets:b").await.expect("set_members").is_empty());
    let deleted = store.delete(DB, &owned(&["sets:b"])).await.expect("delete");
    assert_eq!(deleted, 0, "emptied set should no longer exist");
}

/// Members of a missing set are empty, not an error.
pub async fn set_members_of_missing_set_is_empty<S: StoreSession>(store: &S) {
    let members = store.set_members(DB, "sets:missing").await.expect("set_members");
    assert!(members.is_empty());
}

// ============================================================================
// Scan
// ============================================================================

/// Every endpoint enumerates keys by prefix and nothing outside it.
pub async fn scan_keys_by_prefix<S: StoreSession>(store: &S) {
    for key in ["scan:1", "scan:2", "scanner", "other:1"] {
        store.set(DB, key, Bytes::from("v")).await.expect("set");
    }

    let endpoints = store.endpoints();
    assert!(!endpoints.is_empty(), "a session must expose at least one endpoint");
    for endpoint in &endpoints {
        let mut keys = store.keys_by_prefix(endpoint, DB, "scan:").await.expect("scan");
        keys.sort();
        assert_eq!(keys, owned(&["scan:1", "scan:2"]), "endpoint {endpoint}");
    }
}

/// A prefix scan reports set keys as well as value keys.
pub async fn scan_includes_sets<S: StoreSession>(store: &S) {
    store.set_add(DB, "scanset:s", &owned(&["m"])).await.expect("set_add");
    let endpoint = store.endpoints().into_iter().next().expect("endpoint");

    let keys = store.keys_by_prefix(&endpoint, DB, "scanset:").await.expect("scan");
    assert_eq!(keys, owned(&["scanset:s"]));
}

// ============================================================================
// Transaction
// ============================================================================

/// A committed transaction applies every queued operation.
pub async fn tx_commit_applies_all<S: StoreSession>(store: &S) {
    let mut txn = store.transaction(DB).await.expect("transaction");
    txn.set("tx:1".into(), Bytes::from("v"));
    txn.set_add("tx:index".into(), "tx:1".into());
    assert!(txn.commit().await.expect("commit"), "commit should succeed");

    assert_eq!(store.get(DB, "tx:1").await.expect("get"), Some(Bytes::from("v")));
    assert_eq!(store.set_members(DB, "tx:index").await.expect("members"), owned(&["tx:1"]));
}

/// Dropping a transaction without commit applies nothing.
pub async fn tx_drop_without_commit_is_noop<S: StoreSession>(store: &S) {
    {
        let mut txn = store.transaction(DB).await.expect("transaction");
        txn.set("tx:dropped".into(), Bytes::from("v"));
    }
    assert_eq!(store.get(DB, "tx:dropped").await.expect("get"), None);
}

/// A transaction rejected by the store applies none of its operations.
pub async fn tx_rejected_commit_applies_nothing<S: StoreSession>(store: &S) {
    store.set(DB, "tx:not-a-set", Bytes::from("plain")).await.expect("set");

    let mut txn = store.transaction(DB).await.expect("transaction");
    txn.set("tx:orphan".into(), Bytes::from("v"));
    txn.set_add("tx:not-a-set".into(), "tx:orphan".into());
    let committed = txn.commit().await.expect("commit should not error");

    assert!(!committed, "type conflict should reject the transaction");
    assert_eq!(store.get(DB, "tx:orphan").await.expect("get"), None);
}

// ============================================================================
// Conditional
// ============================================================================

/// `set_if_absent` writes only when the key is missing.
pub async fn cond_set_if_absent<S: StoreSession>(store: &S) {
    let ttl = Duration::from_secs(30);
    assert!(store.set_if_absent(DB, "cond:a", Bytes::from("t1"), ttl).await.expect("first"));
    assert!(!store.set_if_absent(DB, "cond:a", Bytes::from("t2"), ttl).await.expect("second"));
    assert_eq!(store.get(DB, "cond:a").await.expect("get"), Some(Bytes::from("t1")));
}

/// A key written by `set_if_absent` disappears after its TTL.
pub async fn cond_set_if_absent_expires<S: StoreSession>(store: &S) {
    let ttl = Duration::from_millis(30);
    assert!(store.set_if_absent(DB, "cond:ttl", Bytes::from("t"), ttl).await.expect("set"));

    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(store.get(DB, "cond:ttl").await.expect("get"), None);
    assert!(
        store.set_if_absent(DB, "cond:ttl", Bytes::from("t2"), ttl).await.expect("reacquire"),
        "expired key should be writable again"
    );
}

/// `delete_if_equals` deletes only on an exact value match.
pub async fn cond_delete_if_equals<S: StoreSession>(store: &S) {
    store.set(DB, "cond:d", Bytes::from("mine")).await.expect("set");

    assert!(!store.delete_if_equals(DB, "cond:d", b"theirs").await.expect("mismatch"));
    assert!(store.delete_if_equals(DB, "cond:d", b"mine").await.expect("match"));
    assert_eq!(store.get(DB, "cond:d").await.expect("get"), None);
}

// ============================================================================
// Concurrent
// ============================================================================

/// Concurrent `set_add` calls on one set lose no members.
pub async fn concurrent_set_adds_lose_nothing<S: StoreSession + 'static>(store: Arc<S>) {
    let mut handles = Vec::new();
    for i in 0u32..50 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.set_add(DB, "conc:index", &[format!("m{i:02}")]).await.expect("set_add");
        }));
    }
    for handle in handles {
        handle.await.expect("task join");
    }

    let members = store.set_members(DB, "conc:index").await.expect("set_members");
    assert_eq!(members.len(), 50);
}

/// Concurrent `set_if_absent` on one key has exactly one winner.
pub async fn concurrent_set_if_absent_one_winner<S: StoreSession + 'static>(store: Arc<S>) {
    let mut handles = Vec::new();
    for i in 0u32..10 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .set_if_absent(DB, "conc:lock", Bytes::from(format!("w{i}")), Duration::from_secs(30))
                .await
                .expect("set_if_absent")
        }));
    }

    let mut winners = 0u32;
    for handle in handles {
        if handle.await.expect("task join") {
            winners += 1;
        }
    }
    assert_eq!(winners, 1, "exactly one writer should acquire the key");
}

// ============================================================================
// Error semantics
// ============================================================================

/// `health_check` succeeds on a fresh session.
pub async fn health_check_succeeds<S: StoreSession>(store: &S) {
    store.health_check().await.expect("health_check");
}

/// Reading a set as a value is a `WrongType` error.
pub async fn get_on_set_is_wrong_type<S: StoreSession>(store: &S) {
    store.set_add(DB, "err:set", &owned(&["m"])).await.expect("set_add");
    let result = store.get(DB, "err:set").await;
    crate::assert_wrong_type!(result, "get on a set");

    store.set(DB, "err:value", Bytes::from("v")).await.expect("set");
    let result = store.set_members(DB, "err:value").await;
    crate::assert_wrong_type!(result, "set_members on a value");
}

/// A database index the session does not serve is `InvalidDatabase`.
pub async fn unknown_database_is_invalid<S: StoreSession>(store: &S) {
    let unknown = DatabaseIndex::new(i64::from(u32::MAX));
    let result = store.get(unknown, "err:k").await;
    crate::assert_invalid_database!(result);
    let result = store.set_members(unknown, "err:set").await;
    crate::assert_invalid_database!(result);
}

/// Double delete is idempotent.
pub async fn idempotent_delete<S: StoreSession>(store: &S) {
    store.set(DB, "err:idem", Bytes::from("v")).await.expect("set");
    assert_eq!(store.delete(DB, &owned(&["err:idem"])).await.expect("first delete"), 1);
    assert_eq!(store.delete(DB, &owned(&["err:idem"])).await.expect("second delete"), 0);
}

// ============================================================================
// Convenience runner
// ============================================================================

/// Run the full conformance suite against one session.
///
/// Every check uses its own keys, so the suite can share a single store.
pub async fn run_all<S: StoreSession + 'static>(store: Arc<S>) {
    // CRUD
    crud_get_returns_none_for_missing_key(store.as_ref()).await;
    crud_set_then_get_returns_value(store.as_ref()).await;
    crud_set_overwrites_existing(store.as_ref()).await;
    crud_multi_get_is_positional(store.as_ref()).await;
    crud_delete_counts_removed(store.as_ref()).await;
    crud_databases_are_isolated(store.as_ref()).await;

    // Sets
    set_add_and_members(store.as_ref()).await;
    set_remove_last_member_removes_set(store.as_ref()).await;
    set_members_of_missing_set_is_empty(store.as_ref()).await;

    // Scan
    scan_keys_by_prefix(store.as_ref()).await;
    scan_includes_sets(store.as_ref()).await;

    // Transaction
    tx_commit_applies_all(store.as_ref()).await;
    tx_drop_without_commit_is_noop(store.as_ref()).await;
    tx_rejected_commit_applies_nothing(store.as_ref()).await;

    // Conditional
    cond_set_if_absent(store.as_ref()).await;
    cond_set_if_absent_expires(store.as_ref()).await;
    cond_delete_if_equals(store.as_ref()).await;

    // Concurrent
    concurrent_set_adds_lose_nothing(Arc::clone(&store)).await;
    concurrent_set_if_absent_one_winner(Arc::clone(&store)).await;

    // Error semantics
    health_check_succeeds(store.as_ref()).await;
    get_on_set_is_wrong_type(store.as_ref()).await;
    unknown_database_is_invalid(store.as_ref()).await;
    idempotent_delete(store.as_ref()).await;
}
