//! Typed data provider.
//!
//! [`DataProvider<T>`] stores records of one type under caller-chosen keys,
//! keeps the type's index set in lockstep with its writes, and optionally
//! guards writes and deletes with a distributed lock.
//!
//! # Reads
//!
//! Listing operations read the index set first. When it is empty they fall
//! back to a wildcard scan over every store endpoint and repair the index
//! from what they find, so records written by processes that bypass the
//! provider still show up.
//!
//! # Writes
//!
//! An unlocked write is one store transaction holding the value write and the
//! index update. An optimistic write first makes a single attempt to lock the
//! record; if another owner holds the lock the call fails immediately with
//! [`ProviderError::OptimisticLockConflict`]. There is no retry and no
//! queueing.

use std::{collections::HashMap, fmt, marker::PhantomData, slice, sync::Arc};

use bytes::Bytes;
use dashmap::DashMap;
use futures::{StreamExt, stream};
use tracing::{debug, warn};
use typedkv_storage::{
    DatabaseIndex, LockHandle, LockProvider, StorageError, StorageResult, StoreSession,
};

use crate::{
    codec::{Codec, JsonCodec},
    config::ProviderConfig,
    error::{LockConflict, ProviderError, ProviderResult},
    index::TypeIndex,
};

/// Whether a write or delete is guarded by a lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockMode {
    /// Write without locking.
    #[default]
    Unlocked,
    /// Lock each record once before touching it; fail on contention.
    Optimistic,
}

impl From<bool> for LockMode {
    fn from(optimistic: bool) -> Self {
        if optimistic { Self::Optimistic } else { Self::Unlocked }
    }
}

/// Keys to read for a listing, and where they came from.
enum KeySource {
    Indexed(Vec<String>),
    Scanned(Vec<String>),
}

/// Typed access to records of type `T`.
///
/// Cloning is cheap; clones share the session, lock provider, codec and
/// configuration. [`with_database`](Self::with_database) derives a provider
/// bound to another database.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use serde::{Deserialize, Serialize};
/// use typedkv_provider::{DataProvider, LockMode};
/// use typedkv_storage::{MemoryLockProvider, MemoryStore};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Invoice {
///     total: u64,
/// }
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let invoices = DataProvider::<Invoice>::for_type(
///     Arc::new(MemoryStore::new()),
///     Arc::new(MemoryLockProvider::new()),
/// )
/// .unwrap();
///
/// invoices.insert_or_update("Invoice:1", &Invoice { total: 40 }, LockMode::Optimistic).await.unwrap();
///
/// assert_eq!(invoices.get_by_key("Invoice:1").await.unwrap(), Some(Invoice { total: 40 }));
/// assert_eq!(invoices.get_keys_in_set().await.unwrap(), vec!["Invoice:1".to_string()]);
/// # });
/// ```
pub struct DataProvider<T, C = JsonCodec> {
    session: Arc<dyn StoreSession>,
    locks: Arc<dyn LockProvider>,
    codec: Arc<C>,
    config: Arc<ProviderConfig>,
    index: TypeIndex,
    database: DatabaseIndex,
    _marker: PhantomData<fn() -> T>,
}

impl<T, C> Clone for DataProvider<T, C> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            locks: Arc::clone(&self.locks),
            codec: Arc::clone(&self.codec),
            config: Arc::clone(&self.config),
            index: self.index.clone(),
            database: self.database,
            _marker: PhantomData,
        }
    }
}

impl<T, C> fmt::Debug for DataProvider<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataProvider")
            .field("type_name", &self.config.type_name())
            .field("index", &self.index)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

impl<T> DataProvider<T, JsonCodec> {
    /// Creates a JSON-encoding provider from an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Config`] if `config` fails validation.
    pub fn new(
        session: Arc<dyn StoreSession>,
        locks: Arc<dyn LockProvider>,
        config: ProviderConfig,
    ) -> ProviderResult<Self> {
        Self::with_codec(session, locks, config, JsonCodec)
    }

    /// Creates a JSON-encoding provider configured for `T` by its simple
    /// type name.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Config`] if the derived configuration is
    /// invalid.
    pub fn for_type(
        session: Arc<dyn StoreSession>,
        locks: Arc<dyn LockProvider>,
    ) -> ProviderResult<Self> {
        Self::new(session, locks, ProviderConfig::for_type::<T>()?)
    }
}

impl<T, C> DataProvider<T, C> {
    /// Creates a provider using `codec` for payloads.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Config`] if `config` fails validation.
    pub fn with_codec(
        session: Arc<dyn StoreSession>,
        locks: Arc<dyn LockProvider>,
        config: ProviderConfig,
        codec: C,
    ) -> ProviderResult<Self> {
        config.validate()?;
        Ok(Self {
            session,
            locks,
            codec: Arc::new(codec),
            index: TypeIndex::from_config(&config),
            database: config.database(),
            config: Arc::new(config),
            _marker: PhantomData,
        })
    }

    /// Returns a provider for the same type bound to `database`.
    #[must_use]
    pub fn with_database(&self, database: impl Into<DatabaseIndex>) -> Self {
        Self { database: database.into(), ..self.clone() }
    }

    /// Database this provider reads and writes.
    #[must_use]
    pub fn database(&self) -> DatabaseIndex {
        self.database
    }

    /// Provider configuration.
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Index set and scan prefix for `T`.
    #[must_use]
    pub fn index(&self) -> &TypeIndex {
        &self.index
    }
}

impl<T, C> DataProvider<T, C>
where
    T: Send + Sync,
    C: Codec<T>,
{
    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Fetches the record stored at `key`.
    ///
    /// Returns `None` when the key is missing, holds an empty payload, or
    /// holds a payload that does not decode as `T`.
    ///
    /// # Errors
    ///
    /// [`ProviderError::MissingArgument`] for an empty key; store failures.
    #[tracing::instrument(skip(self), fields(db = %self.database))]
    pub async fn get_by_key(&self, key: &str) -> ProviderResult<Option<T>> {
        require_key(key)?;
        let mut values = self.fetch_values(slice::from_ref(&key.to_owned())).await?;
        Ok(values.pop())
    }

    /// Fetches several records in one batched read.
    ///
    /// Missing, empty and undecodable entries are omitted; the rest keep the
    /// order of `keys`.
    ///
    /// # Errors
    ///
    /// [`ProviderError::MissingArgument`] for an empty list or an empty key;
    /// store failures.
    #[tracing::instrument(skip(self, keys), fields(count = keys.len(), db = %self.database))]
    pub async fn get_by_keys(&self, keys: &[String]) -> ProviderResult<Vec<T>> {
        require_keys(keys)?;
        self.fetch_values(keys).await
    }

    /// Lists every record of type `T`.
    ///
    /// Reads the index set; when it is empty, scans for keys with the type's
    /// prefix instead and repairs the index with every key that decoded.
    /// Finding nothing is not an error.
    ///
    /// # Errors
    ///
    /// Store failures.
    #[tracing::instrument(skip(self), fields(index = %self.index.index_name(), db = %self.database))]
    pub async fn get_all_values(&self) -> ProviderResult<Vec<T>> {
        match self.resolve_keys().await? {
            KeySource::Indexed(keys) => self.fetch_values(&keys).await,
            KeySource::Scanned(keys) => {
                if keys.is_empty() {
                    return Ok(Vec::new());
                }
                let payloads = self.session.multi_get(self.database, &keys).await?;
                let mut found = Vec::new();
                let mut values = Vec::new();
                for (key, payload) in keys.into_iter().zip(payloads) {
                    if let Some(value) = self.decode_entry(&key, payload) {
                        values.push(value);
                        found.push(key);
                    }
                }
                self.repair_index(&found).await;
                Ok(values)
            },
        }
    }

    /// Maps every key of type `T` to its record.
    ///
    /// Uses the same index-then-scan strategy as
    /// [`get_all_values`](Self::get_all_values), but fetches keys one by one
    /// with at most `fetch_concurrency` reads in flight.
    ///
    /// # Errors
    ///
    /// Store failures other than a key holding a set.
    #[tracing::instrument(skip(self), fields(index = %self.index.index_name(), db = %self.database))]
    pub async fn get_all_key_value_pairs(&self) -> ProviderResult<HashMap<String, T>> {
        let (keys, scanned) = match self.resolve_keys().await? {
            KeySource::Indexed(keys) => (keys, false),
            KeySource::Scanned(keys) => (keys, true),
        };

        let entries: DashMap<String, T> = DashMap::with_capacity(keys.len());
        let outcomes: Vec<StorageResult<()>> = stream::iter(keys)
            .map(|key| {
                let entries = &entries;
                async move {
                    let payload = match self.session.get(self.database, &key).await {
                        Ok(payload) => payload,
                        Err(StorageError::WrongType { .. }) => {
                            debug!(%key, "skipping key holding a set");
                            None
                        },
                        Err(error) => return Err(error),
                    };
                    if let Some(value) = self.decode_entry(&key, payload) {
                        entries.insert(key, value);
                    }
                    Ok::<(), StorageError>(())
                }
            })
            .buffer_unordered(self.config.fetch_concurrency())
            .collect()
            .await;
        outcomes.into_iter().collect::<StorageResult<Vec<()>>>()?;

        if scanned {
            let found: Vec<String> = entries.iter().map(|entry| entry.key().clone()).collect();
            self.repair_index(&found).await;
        }
        Ok(entries.into_iter().collect())
    }

    /// Raw membership of the type's index set.
    ///
    /// # Errors
    ///
    /// Store failures.
    #[tracing::instrument(skip(self), fields(index = %self.index.index_name(), db = %self.database))]
    pub async fn get_keys_in_set(&self) -> ProviderResult<Vec<String>> {
        Ok(self.index.members(self.session.as_ref(), self.database).await?)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Encodes `value` and stores it at `key`, adding `key` to the index.
    ///
    /// Returns `true` if the store committed the write.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::MissingArgument`] for an empty key
    /// - [`ProviderError::Encode`] if `value` cannot be encoded
    /// - [`ProviderError::OptimisticLockConflict`] if `mode` is
    ///   [`LockMode::Optimistic`] and the record is locked
    /// - store failures
    #[tracing::instrument(skip(self, value), fields(db = %self.database))]
    pub async fn insert_or_update(
        &self,
        key: &str,
        value: &T,
        mode: LockMode,
    ) -> ProviderResult<bool> {
        require_key(key)?;
        let payload = self.codec.encode(value).map_err(ProviderError::Encode)?;
        self.write(key, payload, mode).await
    }

    /// Stores an already encoded payload at `key`, adding `key` to the index.
    ///
    /// The payload is stored as given; it is expected to be something the
    /// provider's codec can decode.
    ///
    /// # Errors
    ///
    /// As [`insert_or_update`](Self::insert_or_update), plus
    /// [`ProviderError::MissingArgument`] for an empty payload.
    #[tracing::instrument(skip(self, payload), fields(db = %self.database))]
    pub async fn insert_or_update_payload(
        &self,
        key: &str,
        payload: impl Into<Bytes> + Send,
        mode: LockMode,
    ) -> ProviderResult<bool> {
        require_key(key)?;
        let payload = payload.into();
        if payload.is_empty() {
            return Err(ProviderError::missing_argument("payload"));
        }
        self.write(key, payload, mode).await
    }

    // ------------------------------------------------------------------
    // Deletes
    // ------------------------------------------------------------------

    /// Deletes the record at `key` and removes it from the index.
    ///
    /// Returns `true` if the record existed.
    ///
    /// # Errors
    ///
    /// See [`delete_many`](Self::delete_many).
    #[tracing::instrument(skip(self), fields(db = %self.database))]
    pub async fn delete(&self, key: &str, mode: LockMode) -> ProviderResult<bool> {
        require_key(key)?;
        self.delete_many(slice::from_ref(&key.to_owned()), mode).await
    }

    /// Deletes the records at `keys` and removes them from the index.
    ///
    /// Unlocked, all keys and their index entries are removed in one
    /// transaction. Optimistic, every key is locked, deleted and released in
    /// turn; keys that cannot be locked are
    /// skipped and reported together once all keys have been attempted.
    ///
    /// Returns `true` if at least one record existed.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::MissingArgument`] for an empty list or an empty key
    /// - [`ProviderError::OptimisticLockConflict`] listing every key that was
    ///   locked by another owner; the other keys have been deleted
    /// - store failures, which stop the batch at the failing key; lock
    ///   conflicts collected before it are logged at `WARN`
    #[tracing::instrument(skip(self, keys), fields(count = keys.len(), db = %self.database))]
    pub async fn delete_many(&self, keys: &[String], mode: LockMode) -> ProviderResult<bool> {
        require_keys(keys)?;
        match mode {
            LockMode::Unlocked => self.delete_unlocked(keys).await,
            LockMode::Optimistic => {
                let mut conflicts = Vec::new();
                let mut removed_any = false;
                for key in keys {
                    let resource = self.config.lock_resource(key);
                    let acquired = self.locks.try_acquire(&resource, self.config.lock_ttl()).await;
                    let acquired = match acquired {
                        Ok(acquired) => acquired,
                        Err(error) => {
                            abandon_batch(&conflicts, key, &error);
                            return Err(error.into());
                        },
                    };
                    let Some(handle) = acquired else {
                        warn!(%key, "delete skipped, record is locked");
                        conflicts.push(LockConflict::delete(key.as_str()));
                        continue;
                    };
                    let result = self.delete_unlocked(slice::from_ref(key)).await;
                    release(handle).await;
                    match result {
                        Ok(removed) => removed_any |= removed,
                        Err(error) => {
                            abandon_batch(&conflicts, key, &error);
                            return Err(error);
                        },
                    }
                }

                if conflicts.is_empty() {
                    Ok(removed_any)
                } else {
                    Err(ProviderError::lock_conflict(conflicts))
                }
            },
        }
    }

    /// Checks that the underlying store session is serving requests.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn health_check(&self) -> ProviderResult<()> {
        Ok(self.session.health_check().await?)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn resolve_keys(&self) -> ProviderResult<KeySource> {
        let members = self.index.members(self.session.as_ref(), self.database).await?;
        if !members.is_empty() {
            debug!(count = members.len(), "serving from type index");
            return Ok(KeySource::Indexed(members));
        }
        debug!("type index empty, falling back to wildcard scan");
        Ok(KeySource::Scanned(self.index.scan(self.session.as_ref(), self.database).await?))
    }

    async fn fetch_values(&self, keys: &[String]) -> ProviderResult<Vec<T>> {
        let payloads = self.session.multi_get(self.database, keys).await?;
        Ok(keys
            .iter()
            .zip(payloads)
            .filter_map(|(key, payload)| self.decode_entry(key, payload))
            .collect())
    }

    fn decode_entry(&self, key: &str, payload: Option<Bytes>) -> Option<T> {
        let payload = payload.filter(|payload| !payload.is_empty())?;
        match self.codec.decode(&payload) {
            Ok(value) => Some(value),
            Err(error) => {
                debug!(%key, %error, "dropping undecodable record");
                None
            },
        }
    }

    async fn repair_index(&self, keys: &[String]) {
        if let Err(error) = self.index.repair(self.session.as_ref(), self.database, keys).await {
            warn!(%error, "type index repair failed");
        }
    }

    async fn write(&self, key: &str, payload: Bytes, mode: LockMode) -> ProviderResult<bool> {
        match mode {
            LockMode::Unlocked => self.write_unlocked(key, payload).await,
            LockMode::Optimistic => {
                let resource = self.config.lock_resource(key);
                let Some(handle) =
                    self.locks.try_acquire(&resource, self.config.lock_ttl()).await?
                else {
                    warn!(%key, "write rejected, record is locked");
                    let payload = String::from_utf8_lossy(&payload).into_owned();
                    return Err(ProviderError::lock_conflict(vec![LockConflict::write(
                        key, payload,
                    )]));
                };
                let result = self.write_unlocked(key, payload).await;
                release(handle).await;
                result
            },
        }
    }

    async fn write_unlocked(&self, key: &str, payload: Bytes) -> ProviderResult<bool> {
        let mut txn = self.session.transaction(self.database).await?;
        txn.set(key.to_owned(), payload);
        self.index.queue_add(txn.as_mut(), key);
        let committed = txn.commit().await?;
        if !committed {
            warn!(%key, "store rejected write transaction");
        }
        Ok(committed)
    }

    /// Deletes `keys` and their index entries in one transaction.
    ///
    /// Nothing is written when none of the keys hold a record, so a stale
    /// index entry for a missing key is left alone.
    async fn delete_unlocked(&self, keys: &[String]) -> ProviderResult<bool> {
        let existing = self.session.multi_get(self.database, keys).await?;
        if existing.iter().all(Option::is_none) {
            return Ok(false);
        }

        let mut txn = self.session.transaction(self.database).await?;
        for key in keys {
            txn.delete(key.clone());
            self.index.queue_remove(txn.as_mut(), key);
        }
        let committed = txn.commit().await?;
        if !committed {
            warn!(count = keys.len(), "store rejected delete transaction");
        }
        Ok(committed)
    }
}

/// Releases a lock, logging rather than failing the operation it guarded.
async fn release(handle: LockHandle) {
    let resource = handle.resource().to_owned();
    match handle.release().await {
        Ok(true) => {},
        Ok(false) => warn!(%resource, "lock expired before release"),
        Err(error) => warn!(%resource, %error, "lock release failed"),
    }
}

/// Logs the conflicts collected so far when a store failure ends a guarded
/// batch delete early.
fn abandon_batch(conflicts: &[LockConflict], key: &str, error: &impl fmt::Display) {
    if conflicts.is_empty() {
        return;
    }
    let locked: Vec<&str> = conflicts.iter().map(|conflict| conflict.key.as_str()).collect();
    warn!(%key, %error, ?locked, "batch delete stopped by store failure, locked keys not reported");
}

fn require_key(key: &str) -> ProviderResult<()> {
    if key.is_empty() {
        return Err(ProviderError::missing_argument("key"));
    }
    Ok(())
}

fn require_keys(keys: &[String]) -> ProviderResult<()> {
    if keys.is_empty() || keys.iter().any(String::is_empty) {
        return Err(ProviderError::missing_argument("keys"));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use typedkv_storage::{MemoryLockProvider, MemoryStore, testutil::Widget};

    use super::*;

    fn provider(store: &MemoryStore) -> DataProvider<Widget> {
        DataProvider::for_type(Arc::new(store.clone()), Arc::new(MemoryLockProvider::new()))
            .unwrap()
    }

    #[test]
    fn test_lock_mode_from_bool() {
        assert_eq!(LockMode::from(true), LockMode::Optimistic);
        assert_eq!(LockMode::from(false), LockMode::Unlocked);
        assert_eq!(LockMode::default(), LockMode::Unlocked);
    }

    #[test]
    fn test_argument_checks() {
        assert!(require_key("k").is_ok());
        assert!(matches!(
            require_key(""),
            Err(ProviderError::MissingArgument { argument: "key" })
        ));
        assert!(require_keys(&["a".to_owned()]).is_ok());
        assert!(require_keys(&[]).is_err());
        assert!(require_keys(&["a".to_owned(), String::new()]).is_err());
    }

    #[tokio::test]
    async fn test_for_type_names_index_after_type() {
        let store = MemoryStore::new();
        let widgets = provider(&store);
        assert_eq!(widgets.index().index_name(), "Widget");
        assert_eq!(widgets.config().type_name(), "Widget");
    }

    #[tokio::test]
    async fn test_with_database_rebinds_only_database() {
        let store = MemoryStore::new();
        let widgets = provider(&store);
        let other = widgets.with_database(DatabaseIndex::new(2));

        assert_eq!(widgets.database(), DatabaseIndex::DEFAULT);
        assert_eq!(other.database().get(), 2);
        assert_eq!(other.index(), widgets.index());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config: ProviderConfig =
            serde_json::from_str(r#"{"type_name":"Widget","fetch_concurrency":0}"#).unwrap();
        let result = DataProvider::<Widget>::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryLockProvider::new()),
            config,
        );
        assert!(matches!(result, Err(ProviderError::Config(_))));
    }

    #[tokio::test]
    async fn test_decode_entry_drops_empty_and_invalid() {
        let store = MemoryStore::new();
        let widgets = provider(&store);

        assert!(widgets.decode_entry("k", None).is_none());
        assert!(widgets.decode_entry("k", Some(Bytes::new())).is_none());
        assert!(widgets.decode_entry("k", Some(Bytes::from("nope"))).is_none());

        let payload = JsonCodec.encode(&Widget::numbered(1)).unwrap();
        assert_eq!(widgets.decode_entry("k", Some(payload)), Some(Widget::numbered(1)));
    }

    #[tokio::test]
    async fn test_health_check_delegates_to_session() {
        let store = MemoryStore::new();
        provider(&store).health_check().await.unwrap();
    }
}
