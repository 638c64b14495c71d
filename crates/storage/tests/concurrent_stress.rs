//! Concurrent access stress tests for `MemoryStore`.
//!
//! These tests exercise the store under multi-threaded workloads to detect
//! data races, deadlocks and lost updates. They are ignored by default:
//!
//! ```bash
//! cargo test -p typedkv-storage --test concurrent_stress -- --ignored
//! ```

#![allow(clippy::expect_used, clippy::panic)]

use std::collections::HashSet;

use bytes::Bytes;
use tokio::task::JoinSet;
use typedkv_storage::{
    DatabaseIndex, MemoryStore, StoreSession,
    testutil::{make_key, make_tagged_value},
};

/// Number of concurrent tasks for most tests.
const CONCURRENCY: usize = 16;

/// Number of operations each task performs.
const OPS_PER_TASK: usize = 100;

const DB: DatabaseIndex = DatabaseIndex::DEFAULT;

// ---------------------------------------------------------------------------
// Test: Parallel writers to the same key (last writer wins)
// ---------------------------------------------------------------------------

/// The key must end up holding a value written by one of the tasks, never a
/// torn or foreign value.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn parallel_writers_same_key() {
    let store = MemoryStore::new();

    let mut set = JoinSet::new();
    for task_id in 0..CONCURRENCY {
        let store = store.clone();
        set.spawn(async move {
            for i in 0..OPS_PER_TASK {
                store.set(DB, "shared-key", make_tagged_value(task_id, i)).await.expect("set");
            }
        });
    }
    while let Some(result) = set.join_next().await {
        result.expect("task should not panic");
    }

    let valid: HashSet<Bytes> = (0..CONCURRENCY)
        .flat_map(|task| (0..OPS_PER_TASK).map(move |i| make_tagged_value(task, i)))
        .collect();
    let value = store.get(DB, "shared-key").await.expect("get").expect("present");
    assert!(valid.contains(&value), "unexpected value {value:?}");
}

// ---------------------------------------------------------------------------
// Test: Transactional value + index writes stay in lockstep
// ---------------------------------------------------------------------------

/// Every key written through a transaction appears in the index set and vice
/// versa, no matter how the writers interleave.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn transactional_writes_keep_index_in_lockstep() {
    let store = MemoryStore::new();

    let mut set = JoinSet::new();
    for task_id in 0..CONCURRENCY {
        let store = store.clone();
        set.spawn(async move {
            for i in 0..OPS_PER_TASK {
                let key = make_key(&format!("Widget:{task_id}"), i);
                let mut txn = store.transaction(DB).await.expect("transaction");
                txn.set(key.clone(), make_tagged_value(task_id, i));
                txn.set_add("Widget".into(), key);
                assert!(txn.commit().await.expect("commit"));
            }
        });
    }
    while let Some(result) = set.join_next().await {
        result.expect("task should not panic");
    }

    let members = store.set_members(DB, "Widget").await.expect("members");
    assert_eq!(members.len(), CONCURRENCY * OPS_PER_TASK);
    let values = store.multi_get(DB, &members).await.expect("multi_get");
    assert!(values.iter().all(Option::is_some), "every indexed key must hold a value");
}

// ---------------------------------------------------------------------------
// Test: Mixed readers and writers do not deadlock
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn mixed_readers_writers_no_deadlock() {
    let store = MemoryStore::new();
    let endpoint = store.endpoints().into_iter().next().expect("endpoint");

    let mut set = JoinSet::new();
    for task_id in 0..CONCURRENCY {
        let store = store.clone();
        let endpoint = endpoint.clone();
        set.spawn(async move {
            for i in 0..OPS_PER_TASK {
                let key = make_key("mixed", i);
                if task_id % 2 == 0 {
                    store.set(DB, &key, make_tagged_value(task_id, i)).await.expect("set");
                    store.set_add(DB, "mixed-index", &[key]).await.expect("set_add");
                } else {
                    let _ = store.get(DB, &key).await.expect("get");
                    let _ = store.keys_by_prefix(&endpoint, DB, "mixed:").await.expect("scan");
                }
            }
        });
    }

    let joined = tokio::time::timeout(std::time::Duration::from_secs(30), async {
        while let Some(result) = set.join_next().await {
            result.expect("task should not panic");
        }
    })
    .await;
    assert!(joined.is_ok(), "workload should finish without deadlock");
}
