//! In-memory store session implementation.
//!
//! This module provides [`MemoryStore`], an in-process implementation of
//! [`StoreSession`] suitable for testing, development and single-process
//! deployments.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Numbered databases**: Each [`DatabaseIndex`] is an independent keyspace
//! - **Values and sets**: A key holds either a byte value or a set of strings
//! - **Ordered keys**: Keys are stored in a [`BTreeMap`] so prefix scans are range reads
//! - **Expiry**: Keys written through [`set_if_absent`](StoreSession::set_if_absent) expire;
//!   a background task removes them
//! - **Replica endpoints**: Every configured endpoint serves the same keyspace, so a prefix
//!   scan over all endpoints reports each key once per endpoint
//!
//! # Example
//!
//! ```
//! use typedkv_storage::{DatabaseIndex, MemoryStore, StoreSession};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!     let db = DatabaseIndex::DEFAULT;
//!
//!     store.set(db, "greeting", "hello".into()).await.unwrap();
//!     let value = store.get(db, "greeting").await.unwrap();
//!
//!     assert_eq!(value.unwrap().as_ref(), b"hello");
//! }
//! ```
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits
//! - Expired keys are invisible immediately but reclaimed on the cleanup interval

use std::{
    collections::{BTreeMap, BTreeSet},
    ops::Bound,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use fail::fail_point;
use parking_lot::RwLock;
use tokio::{select, sync::watch, time::sleep};

use crate::{
    error::{ConfigError, StorageError, StorageResult},
    session::StoreSession,
    transaction::Transaction,
    types::{DatabaseIndex, Endpoint},
};

/// Default number of databases, matching a stock Redis server.
pub const DEFAULT_DATABASES: u32 = 16;

/// Default interval between expiry sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(1);

/// Name of the single endpoint a default store exposes.
pub const DEFAULT_ENDPOINT: &str = "memory:0";

/// Configuration for [`MemoryStore`].
///
/// # Validation
///
/// - `endpoints` must not be empty
/// - `databases` must be `>= 1`
/// - `cleanup_interval` must be non-zero
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    pub(crate) endpoints: Vec<Endpoint>,
    pub(crate) databases: u32,
    pub(crate) cleanup_interval: Duration,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![Endpoint::new(DEFAULT_ENDPOINT)],
            databases: DEFAULT_DATABASES,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

#[bon::bon]
impl MemoryStoreConfig {
    /// Creates a new store configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if no endpoint is given, `databases` is zero or
    /// `cleanup_interval` is zero.
    #[builder]
    pub fn new(
        #[builder(default = vec![Endpoint::new(DEFAULT_ENDPOINT)])] endpoints: Vec<Endpoint>,
        #[builder(default = DEFAULT_DATABASES)] databases: u32,
        #[builder(default = DEFAULT_CLEANUP_INTERVAL)] cleanup_interval: Duration,
    ) -> Result<Self, ConfigError> {
        if endpoints.is_empty() {
            return Err(ConfigError::Empty { field: "endpoints" });
        }
        if databases == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "databases",
                min: "1".into(),
                value: "0".into(),
            });
        }
        if cleanup_interval.is_zero() {
            return Err(ConfigError::BelowMinimum {
                field: "cleanup_interval",
                min: "1ns".into(),
                value: "0s".into(),
            });
        }
        Ok(Self { endpoints, databases, cleanup_interval })
    }

    /// Returns the configured endpoints.
    #[must_use]
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Returns the number of databases.
    #[must_use]
    pub fn databases(&self) -> u32 {
        self.databases
    }

    /// Returns the interval between expiry sweeps.
    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Stored {
    Value(Bytes),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    stored: Stored,
    expires_at: Option<Instant>,
}

impl Entry {
    fn persistent(stored: Stored) -> Self {
        Self { stored, expires_at: None }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

type Keyspace = BTreeMap<String, Entry>;

/// Looks up a key, treating expired entries as absent.
fn live<'a>(keyspace: &'a Keyspace, key: &str, now: Instant) -> Option<&'a Entry> {
    keyspace.get(key).filter(|entry| entry.is_live(now))
}

/// Holds the shutdown signal sender. When dropped, the watch channel
/// closes and the cleanup task exits.
struct ShutdownGuard {
    shutdown_tx: watch::Sender<()>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        // Best-effort signal; the receiver may already be gone.
        let _ = self.shutdown_tx.send(());
    }
}

/// In-memory store session.
///
/// # Cloning
///
/// `MemoryStore` is cheaply cloneable via [`Arc`]. All clones share the same
/// databases, so a clone behaves like a second connection to the same server.
///
/// # Shutdown
///
/// The background expiry task stops automatically when all clones are
/// dropped. [`shutdown`](Self::shutdown) stops it explicitly.
#[derive(Clone)]
pub struct MemoryStore {
    databases: Arc<RwLock<Vec<Keyspace>>>,
    endpoints: Arc<[Endpoint]>,
    shutdown_guard: Arc<ShutdownGuard>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("endpoints", &self.endpoints)
            .field("databases", &self.databases.read().len())
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Creates a store with one endpoint and [`DEFAULT_DATABASES`] databases.
    ///
    /// When called inside a tokio runtime this also spawns the background
    /// expiry task.
    pub fn new() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }

    /// Creates a store from an explicit configuration.
    pub fn with_config(config: MemoryStoreConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let databases = (0..config.databases).map(|_| Keyspace::new()).collect();
        let store = Self {
            databases: Arc::new(RwLock::new(databases)),
            endpoints: config.endpoints.into(),
            shutdown_guard: Arc::new(ShutdownGuard { shutdown_tx }),
        };

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let databases = Arc::downgrade(&store.databases);
            let interval = config.cleanup_interval;
            handle.spawn(async move {
                Self::cleanup_expired_keys(databases, interval, shutdown_rx).await;
            });
        }

        store
    }

    /// Background task removing expired keys.
    ///
    /// Holds only a weak reference so a forgotten store is still freed.
    async fn cleanup_expired_keys(
        databases: std::sync::Weak<RwLock<Vec<Keyspace>>>,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<()>,
    ) {
        loop {
            select! {
                _ = sleep(interval) => {}
                _ = shutdown_rx.changed() => {
                    return;
                }
            }

            let Some(databases) = databases.upgrade() else {
                return;
            };

            let now = Instant::now();
            let mut guard = databases.write();
            for keyspace in guard.iter_mut() {
                keyspace.retain(|_, entry| entry.is_live(now));
            }
        }
    }

    /// Explicitly signals the background expiry task to stop.
    ///
    /// Idempotent. The store stays usable; expired keys remain invisible but
    /// are no longer reclaimed.
    pub fn shutdown(&self) {
        let _ = self.shutdown_guard.shutdown_tx.send(());
    }

    /// Returns the number of databases this store exposes.
    #[must_use]
    pub fn database_count(&self) -> u32 {
        u32::try_from(self.databases.read().len()).unwrap_or(u32::MAX)
    }

    /// Counts keys physically held in `db`, including expired ones not yet
    /// reclaimed.
    #[must_use]
    pub fn stored_key_count(&self, db: DatabaseIndex) -> usize {
        self.databases.read().get(db.get() as usize).map_or(0, BTreeMap::len)
    }

    fn slot(&self, db: DatabaseIndex) -> StorageResult<usize> {
        let databases = self.database_count();
        if db.get() >= databases {
            return Err(StorageError::invalid_database(db.get(), databases));
        }
        Ok(db.get() as usize)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreSession for MemoryStore {
    #[tracing::instrument(skip(self))]
    async fn get(&self, db: DatabaseIndex, key: &str) -> StorageResult<Option<Bytes>> {
        let slot = self.slot(db)?;
        let databases = self.databases.read();
        match live(&databases[slot], key, Instant::now()).map(|entry| &entry.stored) {
            Some(Stored::Value(value)) => Ok(Some(value.clone())),
            Some(Stored::Set(_)) => Err(StorageError::wrong_type(key)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self, keys), fields(count = keys.len()))]
    async fn multi_get(
        &self,
        db: DatabaseIndex,
        keys: &[String],
    ) -> StorageResult<Vec<Option<Bytes>>> {
        let slot = self.slot(db)?;
        let databases = self.databases.read();
        let now = Instant::now();
        Ok(keys
            .iter()
            .map(|key| match live(&databases[slot], key, now).map(|entry| &entry.stored) {
                Some(Stored::Value(value)) => Some(value.clone()),
                _ => None,
            })
            .collect())
    }

    #[tracing::instrument(skip(self, value), fields(len = value.len()))]
    async fn set(&self, db: DatabaseIndex, key: &str, value: Bytes) -> StorageResult<()> {
        let slot = self.slot(db)?;
        let mut databases = self.databases.write();
        databases[slot].insert(key.to_owned(), Entry::persistent(Stored::Value(value)));
        Ok(())
    }

    #[tracing::instrument(skip(self, keys), fields(count = keys.len()))]
    async fn delete(&self, db: DatabaseIndex, keys: &[String]) -> StorageResult<u64> {
        let slot = self.slot(db)?;
        let mut databases = self.databases.write();
        let now = Instant::now();
        let mut removed = 0;
        for key in keys {
            if databases[slot].remove(key).is_some_and(|entry| entry.is_live(now)) {
                removed += 1;
            }
        }
        Ok(removed)
    }

    #[tracing::instrument(skip(self, members), fields(count = members.len()))]
    async fn set_add(
        &self,
        db: DatabaseIndex,
        set: &str,
        members: &[String],
    ) -> StorageResult<u64> {
        let slot = self.slot(db)?;
        let mut databases = self.databases.write();
        let keyspace = &mut databases[slot];
        let now = Instant::now();

        let mut current = match live(keyspace, set, now).map(|entry| &entry.stored) {
            Some(Stored::Set(existing)) => existing.clone(),
            Some(Stored::Value(_)) => return Err(StorageError::wrong_type(set)),
            None => BTreeSet::new(),
        };
        let added = members.iter().filter(|member| current.insert((*member).clone())).count();
        keyspace.insert(set.to_owned(), Entry::persistent(Stored::Set(current)));
        Ok(added as u64)
    }

    #[tracing::instrument(skip(self, members), fields(count = members.len()))]
    async fn set_remove(
        &self,
        db: DatabaseIndex,
        set: &str,
        members: &[String],
    ) -> StorageResult<u64> {
        let slot = self.slot(db)?;
        let mut databases = self.databases.write();
        let keyspace = &mut databases[slot];
        let now = Instant::now();

        let mut current = match live(keyspace, set, now).map(|entry| &entry.stored) {
            Some(Stored::Set(existing)) => existing.clone(),
            Some(Stored::Value(_)) => return Err(StorageError::wrong_type(set)),
            None => return Ok(0),
        };
        let removed = members.iter().filter(|member| current.remove(member.as_str())).count();
        if current.is_empty() {
            keyspace.remove(set);
        } else {
            keyspace.insert(set.to_owned(), Entry::persistent(Stored::Set(current)));
        }
        Ok(removed as u64)
    }

    #[tracing::instrument(skip(self))]
    async fn set_members(&self, db: DatabaseIndex, set: &str) -> StorageResult<Vec<String>> {
        let slot = self.slot(db)?;
        let databases = self.databases.read();
        match live(&databases[slot], set, Instant::now()).map(|entry| &entry.stored) {
            Some(Stored::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(Stored::Value(_)) => Err(StorageError::wrong_type(set)),
            None => Ok(Vec::new()),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn keys_by_prefix(
        &self,
        endpoint: &Endpoint,
        db: DatabaseIndex,
        prefix: &str,
    ) -> StorageResult<Vec<String>> {
        if !self.endpoints.contains(endpoint) {
            return Err(StorageError::unknown_endpoint(endpoint.as_str()));
        }
        let slot = self.slot(db)?;
        let databases = self.databases.read();
        let now = Instant::now();
        Ok(databases[slot]
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        self.endpoints.to_vec()
    }

    #[tracing::instrument(skip(self))]
    async fn transaction(&self, db: DatabaseIndex) -> StorageResult<Box<dyn Transaction>> {
        let slot = self.slot(db)?;
        Ok(Box::new(MemoryTransaction { store: self.clone(), slot, operations: Vec::new() }))
    }

    #[tracing::instrument(skip(self, value))]
    async fn set_if_absent(
        &self,
        db: DatabaseIndex,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> StorageResult<bool> {
        let slot = self.slot(db)?;
        let mut databases = self.databases.write();
        let now = Instant::now();
        if live(&databases[slot], key, now).is_some() {
            return Ok(false);
        }
        databases[slot].insert(
            key.to_owned(),
            // A TTL too large to represent never expires.
            Entry { stored: Stored::Value(value), expires_at: now.checked_add(ttl) },
        );
        Ok(true)
    }

    #[tracing::instrument(skip(self, expected))]
    async fn delete_if_equals(
        &self,
        db: DatabaseIndex,
        key: &str,
        expected: &[u8],
    ) -> StorageResult<bool> {
        let slot = self.slot(db)?;
        let mut databases = self.databases.write();
        let matches = matches!(
            live(&databases[slot], key, Instant::now()).map(|entry| &entry.stored),
            Some(Stored::Value(current)) if current.as_ref() == expected
        );
        if matches {
            databases[slot].remove(key);
        }
        Ok(matches)
    }

    #[tracing::instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<()> {
        fail_point!("memory-health-check", |_| {
            Err(StorageError::internal("injected health check failure"))
        });

        // Taking the read lock proves we are not deadlocked.
        let _unused = self.databases.read();
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum TxnOp {
    Set { key: String, value: Bytes },
    Delete { key: String },
    SetAdd { set: String, member: String },
    SetRemove { set: String, member: String },
}

/// In-memory transaction.
///
/// Operations are validated and applied against a scratch overlay under the
/// store's write lock; the overlay is written back only if every operation
/// succeeded, so a rejected transaction leaves no trace.
struct MemoryTransaction {
    store: MemoryStore,
    slot: usize,
    operations: Vec<TxnOp>,
}

type Overlay = BTreeMap<String, Option<Entry>>;

impl MemoryTransaction {
    /// Current state of `key` as seen by this transaction so far.
    fn current(overlay: &mut Overlay, keyspace: &Keyspace, now: Instant, key: &str) -> Option<Entry> {
        overlay
            .entry(key.to_owned())
            .or_insert_with(|| live(keyspace, key, now).cloned())
            .clone()
    }

    /// Applies `op` to the overlay, returning `false` on a type conflict.
    fn apply(overlay: &mut Overlay, keyspace: &Keyspace, now: Instant, op: TxnOp) -> bool {
        match op {
            TxnOp::Set { key, value } => {
                overlay.insert(key, Some(Entry::persistent(Stored::Value(value))));
            },
            TxnOp::Delete { key } => {
                overlay.insert(key, None);
            },
            TxnOp::SetAdd { set, member } => {
                let existing = Self::current(overlay, keyspace, now, &set);
                let mut members = match existing.map(|entry| entry.stored) {
                    Some(Stored::Set(members)) => members,
                    Some(Stored::Value(_)) => return false,
                    None => BTreeSet::new(),
                };
                members.insert(member);
                overlay.insert(set, Some(Entry::persistent(Stored::Set(members))));
            },
            TxnOp::SetRemove { set, member } => {
                let existing = Self::current(overlay, keyspace, now, &set);
                match existing.map(|entry| entry.stored) {
                    Some(Stored::Set(mut members)) => {
                        members.remove(&member);
                        let next = (!members.is_empty())
                            .then(|| Entry::persistent(Stored::Set(members)));
                        overlay.insert(set, next);
                    },
                    Some(Stored::Value(_)) => return false,
                    None => {},
                }
            },
        }
        true
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn set(&mut self, key: String, value: Bytes) {
        self.operations.push(TxnOp::Set { key, value });
    }

    fn delete(&mut self, key: String) {
        self.operations.push(TxnOp::Delete { key });
    }

    fn set_add(&mut self, set: String, member: String) {
        self.operations.push(TxnOp::SetAdd { set, member });
    }

    fn set_remove(&mut self, set: String, member: String) {
        self.operations.push(TxnOp::SetRemove { set, member });
    }

    fn len(&self) -> usize {
        self.operations.len()
    }

    async fn commit(self: Box<Self>) -> StorageResult<bool> {
        fail_point!("memory-txn-commit", |_| Ok(false));

        let this = *self;
        let mut databases = this.store.databases.write();
        let keyspace = &mut databases[this.slot];
        let now = Instant::now();

        let mut overlay = Overlay::new();
        for op in this.operations {
            if !Self::apply(&mut overlay, keyspace, now, op) {
                tracing::debug!("transaction rejected by type conflict");
                return Ok(false);
            }
        }

        for (key, entry) in overlay {
            match entry {
                Some(entry) => {
                    keyspace.insert(key, entry);
                },
                None => {
                    keyspace.remove(&key);
                },
            }
        }
        Ok(true)
    }
}
