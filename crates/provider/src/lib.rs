//! Typed records over a key-value store.
//!
//! [`DataProvider<T>`] turns a [`StoreSession`](typedkv_storage::StoreSession)
//! into a typed repository for one record type. Alongside every record it
//! maintains an index set named after the type, so listing all records is a
//! set read plus one batched fetch rather than a keyspace scan.
//!
//! # Index maintenance
//!
//! - Writes add the key to the index in the same transaction as the value.
//! - Deletes remove deleted keys from the index.
//! - Listings that find the index empty scan for keys with the type's prefix
//!   on every endpoint and add what they find back to the index.
//!
//! # Optimistic locking
//!
//! [`LockMode::Optimistic`] makes one attempt to lock a record before writing
//! or deleting it. Contention fails fast with
//! [`ProviderError::OptimisticLockConflict`]; a guarded batch delete finishes
//! every key it can lock and reports the rest together.
//!
//! ```
//! use std::sync::Arc;
//!
//! use serde::{Deserialize, Serialize};
//! use typedkv_provider::{DataProvider, LockMode, ProviderError};
//! use typedkv_storage::{LockProvider, MemoryLockProvider, MemoryStore};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Order {
//!     qty: u32,
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let locks = Arc::new(MemoryLockProvider::new());
//! let orders =
//!     DataProvider::<Order>::for_type(Arc::new(MemoryStore::new()), locks.clone()).unwrap();
//!
//! // Someone else holds the record.
//! let held = locks.try_acquire("Order:7", orders.config().lock_ttl()).await.unwrap();
//! assert!(held.is_some());
//!
//! let err = orders.insert_or_update("Order:7", &Order { qty: 1 }, LockMode::Optimistic).await;
//! assert!(matches!(err, Err(ProviderError::OptimisticLockConflict { .. })));
//! # });
//! ```
//!
//! # Feature Flags
//!
//! - **`failpoints`**: Forwards to `typedkv-storage/failpoints` so fault-injection tests can
//!   reject transactions and health checks inside the in-memory store.

#![deny(unsafe_code)]

pub mod codec;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod index;
pub mod provider;

pub use codec::{Codec, CodecError, FnCodec, JsonCodec};
pub use config::{DEFAULT_FETCH_CONCURRENCY, DEFAULT_LOCK_TTL, LockNaming, ProviderConfig};
pub use descriptor::TypeDescriptor;
pub use error::{
    DELETE_CONFLICT_MESSAGE, LockConflict, ProviderError, ProviderResult, WRITE_CONFLICT_MESSAGE,
};
pub use index::TypeIndex;
pub use provider::{DataProvider, LockMode};
