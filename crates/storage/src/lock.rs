//! Distributed lock abstraction.
//!
//! A [`LockProvider`] hands out time-bounded exclusive ownership of a named
//! resource. Acquisition is a single attempt: a provider never waits, retries
//! or queues. Callers that lose the race get `Ok(None)` and decide for
//! themselves what contention means.
//!
//! Two providers ship with the crate:
//!
//! - [`MemoryLockProvider`]: an in-process lock table
//! - [`StoreLockProvider`]: the single-instance "set if absent with expiry,
//!   release only with the owner's token" scheme, built on any [`StoreSession`]
//!
//! # Release
//!
//! A [`LockHandle`] should be released with [`LockHandle::release`]. A handle
//! dropped without being released schedules the release on the current tokio
//! runtime; outside a runtime the lock simply runs out its TTL.

use std::{
    collections::HashMap,
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, warn};

use crate::{error::StorageResult, session::StoreSession, types::DatabaseIndex};

/// Default key prefix under which [`StoreLockProvider`] keeps its locks.
pub const DEFAULT_LOCK_KEY_PREFIX: &str = "lock:";

/// Source of exclusive, expiring ownership of named resources.
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Attempts once to acquire `resource` for at most `ttl`.
    ///
    /// Returns `Ok(None)` when another owner currently holds the resource.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`](crate::StorageError) when the provider could
    /// not be asked at all. Contention is not an error.
    #[must_use = "an acquired lock must be released"]
    async fn try_acquire(&self, resource: &str, ttl: Duration)
    -> StorageResult<Option<LockHandle>>;
}

/// Releases a lock previously granted under a token.
///
/// Implemented by lock providers and handed to every [`LockHandle`] they
/// create.
#[async_trait]
pub trait LockRelease: Send + Sync {
    /// Releases `resource` if it is still held under `token`.
    ///
    /// Returns `false` when the lock had already expired or changed owner.
    async fn release(&self, resource: &str, token: &str) -> StorageResult<bool>;
}

/// Proof of ownership of a locked resource.
pub struct LockHandle {
    resource: String,
    token: String,
    releaser: Option<Arc<dyn LockRelease>>,
}

impl LockHandle {
    /// Creates a handle that releases through `releaser`.
    pub fn new(
        resource: impl Into<String>,
        token: impl Into<String>,
        releaser: Arc<dyn LockRelease>,
    ) -> Self {
        Self { resource: resource.into(), token: token.into(), releaser: Some(releaser) }
    }

    /// Name of the locked resource.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Owner token this handle was granted under.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Releases the lock.
    ///
    /// Returns `false` if the lock had already expired or been taken over.
    ///
    /// # Errors
    ///
    /// Propagates provider failures; the lock then expires after its TTL.
    pub async fn release(mut self) -> StorageResult<bool> {
        match self.releaser.take() {
            Some(releaser) => releaser.release(&self.resource, &self.token).await,
            None => Ok(false),
        }
    }
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle")
            .field("resource", &self.resource)
            .field("released", &self.releaser.is_none())
            .finish_non_exhaustive()
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        let Some(releaser) = self.releaser.take() else {
            return;
        };
        let resource = std::mem::take(&mut self.resource);
        let token = std::mem::take(&mut self.token);

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(error) = releaser.release(&resource, &token).await {
                        warn!(%resource, %error, "deferred lock release failed");
                    }
                });
            },
            Err(_) => {
                warn!(%resource, "lock handle dropped outside a runtime; lock will expire");
            },
        }
    }
}

/// Generates a random owner token.
fn new_token() -> String {
    format!("{:032x}", rand::rng().random::<u128>())
}

#[derive(Debug)]
struct Lease {
    token: String,
    expires_at: Option<Instant>,
}

impl Lease {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Default)]
struct LockTable {
    leases: Mutex<HashMap<String, Lease>>,
}

#[async_trait]
impl LockRelease for LockTable {
    async fn release(&self, resource: &str, token: &str) -> StorageResult<bool> {
        let mut leases = self.leases.lock();
        let owned = leases
            .get(resource)
            .is_some_and(|lease| lease.token == token && lease.is_live(Instant::now()));
        if owned {
            leases.remove(resource);
        }
        Ok(owned)
    }
}

/// In-process lock provider.
///
/// Clones share one lock table.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockProvider {
    table: Arc<LockTable>,
}

impl MemoryLockProvider {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `resource` is currently held.
    #[must_use]
    pub fn is_locked(&self, resource: &str) -> bool {
        self.table
            .leases
            .lock()
            .get(resource)
            .is_some_and(|lease| lease.is_live(Instant::now()))
    }
}

#[async_trait]
impl LockProvider for MemoryLockProvider {
    #[tracing::instrument(skip(self))]
    async fn try_acquire(
        &self,
        resource: &str,
        ttl: Duration,
    ) -> StorageResult<Option<LockHandle>> {
        let now = Instant::now();
        let token = {
            let mut leases = self.table.leases.lock();
            if leases.get(resource).is_some_and(|lease| lease.is_live(now)) {
                debug!("resource already locked");
                return Ok(None);
            }
            let token = new_token();
            leases.insert(
                resource.to_owned(),
                Lease { token: token.clone(), expires_at: now.checked_add(ttl) },
            );
            token
        };

        let releaser: Arc<dyn LockRelease> = self.table.clone();
        Ok(Some(LockHandle::new(resource, token, releaser)))
    }
}

struct StoreRelease {
    session: Arc<dyn StoreSession>,
    database: DatabaseIndex,
    key_prefix: String,
}

#[async_trait]
impl LockRelease for StoreRelease {
    async fn release(&self, resource: &str, token: &str) -> StorageResult<bool> {
        let key = format!("{}{resource}", self.key_prefix);
        self.session.delete_if_equals(self.database, &key, token.as_bytes()).await
    }
}

/// Lock provider storing locks as expiring keys in a [`StoreSession`].
///
/// A lock on `resource` is the key `"{prefix}{resource}"` holding a random
/// owner token, written only if absent and set to expire after the TTL.
/// Release deletes the key only while it still holds that token, so a holder
/// whose lock expired cannot release a successor's lock.
#[derive(Clone)]
pub struct StoreLockProvider {
    release: Arc<StoreRelease>,
}

impl fmt::Debug for StoreLockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreLockProvider")
            .field("database", &self.release.database)
            .field("key_prefix", &self.release.key_prefix)
            .finish_non_exhaustive()
    }
}

#[bon::bon]
impl StoreLockProvider {
    /// Creates a provider keeping its locks in `session`.
    #[builder]
    pub fn new(
        session: Arc<dyn StoreSession>,
        #[builder(default)] database: DatabaseIndex,
        #[builder(into, default = DEFAULT_LOCK_KEY_PREFIX.to_owned())] key_prefix: String,
    ) -> Self {
        Self { release: Arc::new(StoreRelease { session, database, key_prefix }) }
    }

    /// Key under which the lock for `resource` is stored.
    #[must_use]
    pub fn lock_key(&self, resource: &str) -> String {
        format!("{}{resource}", self.release.key_prefix)
    }
}

#[async_trait]
impl LockProvider for StoreLockProvider {
    #[tracing::instrument(skip(self))]
    async fn try_acquire(
        &self,
        resource: &str,
        ttl: Duration,
    ) -> StorageResult<Option<LockHandle>> {
        let token = new_token();
        let acquired = self
            .release
            .session
            .set_if_absent(
                self.release.database,
                &self.lock_key(resource),
                Bytes::from(token.clone()),
                ttl,
            )
            .await?;

        if !acquired {
            debug!("resource already locked");
            return Ok(None);
        }

        let releaser: Arc<dyn LockRelease> = self.release.clone();
        Ok(Some(LockHandle::new(resource, token, releaser)))
    }
}
