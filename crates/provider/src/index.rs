//! Per-type index sets.
//!
//! Every record type owns one set in the store whose members are the keys of
//! the records of that type. The provider updates it inside the same
//! transaction as the record on both writes and deletes, so it stays in
//! lockstep with changes made through the provider. Writers that bypass the
//! provider leave it stale; the wildcard [`scan`](TypeIndex::scan) finds such
//! records by key prefix and [`repair`](TypeIndex::repair) adds them back.

use std::collections::BTreeSet;

use futures::future::try_join_all;
use tracing::debug;
use typedkv_storage::{DatabaseIndex, StorageResult, StoreSession, Transaction};

use crate::{config::ProviderConfig, descriptor::TypeDescriptor};

/// Index set and scan prefix for one record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeIndex {
    index_name: String,
    scan_prefix: String,
}

impl TypeIndex {
    /// Creates an index with explicit names.
    pub fn new(index_name: impl Into<String>, scan_prefix: impl Into<String>) -> Self {
        Self { index_name: index_name.into(), scan_prefix: scan_prefix.into() }
    }

    /// Index named after `descriptor`, scanning by the same name.
    #[must_use]
    pub fn from_descriptor(descriptor: &TypeDescriptor) -> Self {
        Self::new(descriptor.name(), descriptor.name())
    }

    /// Index as configured by `config`.
    #[must_use]
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(config.index_name(), config.scan_prefix())
    }

    /// Name of the index set.
    #[must_use]
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Prefix used by the wildcard scan.
    #[must_use]
    pub fn scan_prefix(&self) -> &str {
        &self.scan_prefix
    }

    /// Current members of the index set.
    pub async fn members(
        &self,
        session: &dyn StoreSession,
        db: DatabaseIndex,
    ) -> StorageResult<Vec<String>> {
        session.set_members(db, &self.index_name).await
    }

    /// Queues adding `key` to the index on `txn`.
    pub fn queue_add(&self, txn: &mut dyn Transaction, key: &str) {
        txn.set_add(self.index_name.clone(), key.to_owned());
    }

    /// Queues removing `key` from the index on `txn`.
    pub fn queue_remove(&self, txn: &mut dyn Transaction, key: &str) {
        txn.set_remove(self.index_name.clone(), key.to_owned());
    }

    /// Adds `keys` found by a wildcard scan back into the index.
    ///
    /// Returns the number of keys that were missing from the index.
    pub async fn repair(
        &self,
        session: &dyn StoreSession,
        db: DatabaseIndex,
        keys: &[String],
    ) -> StorageResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let added = session.set_add(db, &self.index_name, keys).await?;
        debug!(index = %self.index_name, added, "repaired type index");
        Ok(added)
    }

    /// Enumerates keys carrying the scan prefix on every endpoint.
    ///
    /// Endpoints are scanned concurrently. Keys reported by several endpoints
    /// appear once, and the index set itself is never reported even when its
    /// name carries the prefix.
    pub async fn scan(
        &self,
        session: &dyn StoreSession,
        db: DatabaseIndex,
    ) -> StorageResult<Vec<String>> {
        let endpoints = session.endpoints();
        let scans = try_join_all(
            endpoints
                .iter()
                .map(|endpoint| session.keys_by_prefix(endpoint, db, &self.scan_prefix)),
        )
        .await?;

        let keys = merge_scans(&self.index_name, scans);
        debug!(
            prefix = %self.scan_prefix,
            endpoints = endpoints.len(),
            found = keys.len(),
            "wildcard scan"
        );
        Ok(keys)
    }
}

/// Merges per-endpoint scan results into one sorted, duplicate-free list,
/// dropping the index set's own key.
pub(crate) fn merge_scans(index_name: &str, scans: Vec<Vec<String>>) -> Vec<String> {
    scans
        .into_iter()
        .flatten()
        .filter(|key| key != index_name)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashSet;

    use bytes::Bytes;
    use proptest::prelude::*;
    use typedkv_storage::{Endpoint, MemoryStore, MemoryStoreConfig};

    use super::*;

    const DB: DatabaseIndex = DatabaseIndex::DEFAULT;

    fn replicated_store() -> MemoryStore {
        let config = MemoryStoreConfig::builder()
            .endpoints(vec![Endpoint::new("a"), Endpoint::new("b"), Endpoint::new("c")])
            .build()
            .unwrap();
        MemoryStore::with_config(config)
    }

    #[test]
    fn test_names() {
        let index = TypeIndex::from_descriptor(&TypeDescriptor::named("Widget"));
        assert_eq!(index.index_name(), "Widget");
        assert_eq!(index.scan_prefix(), "Widget");

        let config = ProviderConfig::builder()
            .type_name("Widget")
            .index_name("idx:Widget")
            .build()
            .unwrap();
        assert_eq!(TypeIndex::from_config(&config), TypeIndex::new("idx:Widget", "Widget"));
    }

    #[tokio::test]
    async fn test_queue_add_and_remove() {
        let store = MemoryStore::new();
        let index = TypeIndex::new("Widget", "Widget");

        let mut txn = store.transaction(DB).await.unwrap();
        index.queue_add(txn.as_mut(), "Widget:1");
        index.queue_add(txn.as_mut(), "Widget:2");
        assert!(txn.commit().await.unwrap());
        assert_eq!(index.members(&store, DB).await.unwrap(), vec!["Widget:1", "Widget:2"]);

        let mut txn = store.transaction(DB).await.unwrap();
        index.queue_remove(txn.as_mut(), "Widget:1");
        assert!(txn.commit().await.unwrap());
        assert_eq!(index.members(&store, DB).await.unwrap(), vec!["Widget:2"]);
    }

    #[tokio::test]
    async fn test_scan_deduplicates_replicas_and_skips_index() {
        let store = replicated_store();
        let index = TypeIndex::new("Widget", "Widget");
        store.set(DB, "Widget:1", Bytes::from("{}")).await.unwrap();
        store.set(DB, "Widget:2", Bytes::from("{}")).await.unwrap();
        store.set(DB, "Gadget:1", Bytes::from("{}")).await.unwrap();
        store.set_add(DB, "Widget", &["Widget:1".to_owned()]).await.unwrap();

        let keys = index.scan(&store, DB).await.unwrap();
        assert_eq!(keys, vec!["Widget:1", "Widget:2"]);
    }

    #[tokio::test]
    async fn test_repair_adds_missing_members() {
        let store = MemoryStore::new();
        let index = TypeIndex::new("Widget", "Widget");
        store.set_add(DB, "Widget", &["Widget:1".to_owned()]).await.unwrap();

        let added = index
            .repair(&store, DB, &["Widget:1".to_owned(), "Widget:2".to_owned()])
            .await
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(index.repair(&store, DB, &[]).await.unwrap(), 0);
        assert_eq!(index.members(&store, DB).await.unwrap().len(), 2);
    }

    proptest! {
        /// Merged scans contain each key exactly once, sorted, and never the
        /// index name.
        #[test]
        fn merge_scans_deduplicates(
            scans in proptest::collection::vec(
                proptest::collection::vec("W[a-c]{0,2}", 0..8),
                0..4,
            )
        ) {
            let merged = merge_scans("W", scans.clone());

            let expected: HashSet<&String> =
                scans.iter().flatten().filter(|key| *key != "W").collect();
            prop_assert_eq!(merged.len(), expected.len());
            prop_assert!(merged.windows(2).all(|pair| pair[0] < pair[1]));
            prop_assert!(!merged.iter().any(|key| key == "W"));
        }
    }
}
