//! Store session trait definition.
//!
//! This module defines the [`StoreSession`] trait, the interface the data
//! provider consumes from a remote key-value store. A session wraps the
//! connection(s) to one or more endpoints and exposes string values, sets,
//! prefix scans and atomic transactions.
//!
//! # Design Philosophy
//!
//! - **Keys are strings, values are bytes**: no assumptions about the payload format
//! - **Database-scoped**: every keyed operation names the [`DatabaseIndex`] it targets
//! - **Per-endpoint scans**: [`keys_by_prefix`](StoreSession::keys_by_prefix) addresses one
//!   endpoint at a time; callers merge and de-duplicate
//! - **Transactional**: atomic multi-operation batches via [`Transaction`]
//!
//! Typed logic (serialization, per-type indexes, locking policy) lives in the
//! provider layer built on top of this trait, not in sessions.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    error::StorageResult,
    transaction::Transaction,
    types::{DatabaseIndex, Endpoint},
};

/// Abstract session against a key-value store.
///
/// Sessions are expected to be thread-safe (`Send + Sync`) and to support
/// concurrent in-flight calls; the provider shares one session across all of
/// its operations and does not serialize access to it.
///
/// # Key Operations
///
/// | Method | Description |
/// |--------|-------------|
/// | [`get`](StoreSession::get) | Retrieve a single value |
/// | [`multi_get`](StoreSession::multi_get) | Retrieve several values in one round trip |
/// | [`set`](StoreSession::set) | Store a value |
/// | [`delete`](StoreSession::delete) | Remove keys, reporting how many existed |
/// | [`set_add`](StoreSession::set_add) | Add members to a set |
/// | [`set_remove`](StoreSession::set_remove) | Remove members from a set |
/// | [`set_members`](StoreSession::set_members) | List a set's members |
/// | [`keys_by_prefix`](StoreSession::keys_by_prefix) | Enumerate keys on one endpoint |
/// | [`transaction`](StoreSession::transaction) | Begin an atomic transaction |
/// | [`set_if_absent`](StoreSession::set_if_absent) | Insert-if-absent with expiry (lock primitive) |
/// | [`delete_if_equals`](StoreSession::delete_if_equals) | Conditional delete (lock release) |
///
/// # Example
///
/// ```
/// use typedkv_storage::{DatabaseIndex, MemoryStore, StoreSession};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let store = MemoryStore::new();
/// let db = DatabaseIndex::DEFAULT;
///
/// store.set(db, "Widget:1", b"{}".to_vec().into()).await.unwrap();
/// let values = store.multi_get(db, &["Widget:1".to_string(), "Widget:2".to_string()]).await.unwrap();
/// assert!(values[0].is_some());
/// assert!(values[1].is_none());
/// # });
/// ```
#[async_trait]
pub trait StoreSession: Send + Sync {
    /// Retrieves the value stored at `key`.
    ///
    /// Returns `Ok(None)` when the key does not exist.
    ///
    /// # Errors
    ///
    /// [`StorageError::WrongType`](crate::StorageError::WrongType) when the key holds a set.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn get(&self, db: DatabaseIndex, key: &str) -> StorageResult<Option<Bytes>>;

    /// Retrieves several values in one batched call.
    ///
    /// The result has one slot per requested key, in request order. Missing
    /// keys and keys holding a set yield `None`, matching `MGET` semantics.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn multi_get(&self, db: DatabaseIndex, keys: &[String])
    -> StorageResult<Vec<Option<Bytes>>>;

    /// Stores `value` at `key`, overwriting any previous value and clearing
    /// any expiry.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn set(&self, db: DatabaseIndex, key: &str, value: Bytes) -> StorageResult<()>;

    /// Deletes `keys`, whatever kind of value they hold.
    ///
    /// Returns the number of keys that existed and were removed.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn delete(&self, db: DatabaseIndex, keys: &[String]) -> StorageResult<u64>;

    /// Adds `members` to the set stored at `set`, creating it if needed.
    ///
    /// Returns the number of members that were not already present.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn set_add(&self, db: DatabaseIndex, set: &str, members: &[String])
    -> StorageResult<u64>;

    /// Removes `members` from the set stored at `set`.
    ///
    /// Returns the number of members that were present. An emptied set is
    /// removed entirely.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn set_remove(
        &self,
        db: DatabaseIndex,
        set: &str,
        members: &[String],
    ) -> StorageResult<u64>;

    /// Lists the members of the set stored at `set`.
    ///
    /// A missing set is empty.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn set_members(&self, db: DatabaseIndex, set: &str) -> StorageResult<Vec<String>>;

    /// Enumerates keys starting with `prefix` on a single endpoint.
    ///
    /// Scans are per endpoint; a key replicated to several endpoints is
    /// reported by each of them.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn keys_by_prefix(
        &self,
        endpoint: &Endpoint,
        db: DatabaseIndex,
        prefix: &str,
    ) -> StorageResult<Vec<String>>;

    /// Lists the endpoints this session is connected to.
    fn endpoints(&self) -> Vec<Endpoint>;

    /// Begins a new transaction against `db`.
    ///
    /// Operations queued on the returned [`Transaction`] are applied all
    /// together or not at all when it is committed.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn transaction(&self, db: DatabaseIndex) -> StorageResult<Box<dyn Transaction>>;

    /// Stores `value` at `key` only if the key does not exist, expiring it
    /// after `ttl`.
    ///
    /// Returns `true` when the value was stored. This is the acquisition
    /// primitive used by [`StoreLockProvider`](crate::StoreLockProvider).
    #[must_use = "store operations may fail and errors must be handled"]
    async fn set_if_absent(
        &self,
        db: DatabaseIndex,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> StorageResult<bool>;

    /// Deletes `key` only if it currently holds exactly `expected`.
    ///
    /// Returns `true` when the key was deleted. Used to release a lock only by
    /// the holder of its token.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn delete_if_equals(
        &self,
        db: DatabaseIndex,
        key: &str,
        expected: &[u8],
    ) -> StorageResult<bool>;

    /// Verifies the session can serve requests.
    #[must_use = "health check results indicate store availability and must be inspected"]
    async fn health_check(&self) -> StorageResult<()>;
}
