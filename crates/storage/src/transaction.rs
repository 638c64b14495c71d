//! Transaction trait for atomic store operations.
//!
//! A [`Transaction`] queues writes against one database and applies them all
//! together on [`commit`](Transaction::commit). The data provider relies on
//! this to keep a record and its type index entry in lockstep: either both the
//! value write and the index update become visible, or neither does.
//!
//! # Example
//!
//! ```
//! use typedkv_storage::{DatabaseIndex, MemoryStore, StoreSession};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let store = MemoryStore::new();
//! let db = DatabaseIndex::DEFAULT;
//!
//! let mut txn = store.transaction(db).await.unwrap();
//! txn.set("Widget:1".into(), b"{}".to_vec().into());
//! txn.set_add("Widget".into(), "Widget:1".into());
//! assert!(txn.commit().await.unwrap());
//!
//! assert_eq!(store.set_members(db, "Widget").await.unwrap(), vec!["Widget:1".to_string()]);
//! # });
//! ```

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageResult;

/// Transaction handle for atomic multi-operation commits.
///
/// Operations are buffered in the order they are queued and applied in that
/// order at commit time. Nothing is visible to other readers before commit.
#[async_trait]
pub trait Transaction: Send {
    /// Queues a value write.
    fn set(&mut self, key: String, value: Bytes);

    /// Queues a key deletion.
    fn delete(&mut self, key: String);

    /// Queues adding `member` to the set stored at `set`.
    fn set_add(&mut self, set: String, member: String);

    /// Queues removing `member` from the set stored at `set`.
    fn set_remove(&mut self, set: String, member: String);

    /// Returns the number of queued operations.
    fn len(&self) -> usize;

    /// Returns `true` if no operations are queued.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies all queued operations atomically.
    ///
    /// Returns `Ok(true)` when the transaction committed and `Ok(false)` when
    /// the store rejected it as a whole (for example because one operation
    /// targeted a key holding the wrong kind of value). In the `false` case no
    /// operation was applied.
    ///
    /// # Errors
    ///
    /// Transport-level failures surface as [`StorageError`](crate::StorageError);
    /// in that case the outcome of the transaction is unknown to the caller.
    async fn commit(self: Box<Self>) -> StorageResult<bool>;
}
