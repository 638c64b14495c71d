//! Store session and distributed lock abstractions for typedkv.
//!
//! This crate provides the [`StoreSession`] trait and related types that form
//! the foundation for the typed data provider. The provider never talks to a
//! store directly; it goes through a session for data and a
//! [`LockProvider`] for optimistic locking.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  typedkv-provider                           │
//! │     DataProvider<T>: codec, type index, lock policy         │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │      StoreSession trait      │      LockProvider trait      │
//! │ (values, sets, scans, txns)  │  (single-attempt, TTL'd)     │
//! ├──────────────────────────────┼──────────────────────────────┤
//! │         MemoryStore          │ MemoryLockProvider           │
//! │                              │ StoreLockProvider            │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use typedkv_storage::{DatabaseIndex, MemoryStore, StoreSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryStore::new();
//!     let db = DatabaseIndex::DEFAULT;
//!
//!     store.set(db, "Widget:1", "{\"id\":1}".into()).await?;
//!     let value = store.get(db, "Widget:1").await?;
//!     assert!(value.is_some());
//!
//!     // Write a value and its index entry atomically
//!     let mut txn = store.transaction(db).await?;
//!     txn.set("Widget:2".into(), "{\"id\":2}".into());
//!     txn.set_add("Widget".into(), "Widget:2".into());
//!     assert!(txn.commit().await?);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Implementing a Session
//!
//! 1. Implement the [`StoreSession`] trait
//! 2. Implement a corresponding [`Transaction`] type
//! 3. Map store-specific errors to [`StorageError`]
//! 4. Run the `conformance` suite against it
//!
//! See the [`memory`] module source for a reference implementation.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` and `conformance` modules (key/value generators, a
//!   sample record, assertion macros, the session conformance suite).
//! - **`failpoints`**: Activates `fail` points inside [`MemoryStore`] (`memory-txn-commit`,
//!   `memory-health-check`) for fault-injection tests.

#![deny(unsafe_code)]

#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod conformance;
pub mod error;
pub mod lock;
pub mod memory;
pub mod session;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod transaction;
pub mod types;

// Re-export primary types at crate root for convenience
pub use error::{BoxError, ConfigError, StorageError, StorageResult};
pub use lock::{
    DEFAULT_LOCK_KEY_PREFIX, LockHandle, LockProvider, LockRelease, MemoryLockProvider,
    StoreLockProvider,
};
pub use memory::{MemoryStore, MemoryStoreConfig};
pub use session::StoreSession;
pub use transaction::Transaction;
pub use types::{DatabaseIndex, Endpoint};
