//! Configuration for [`DataProvider`](crate::DataProvider).
//!
//! A [`ProviderConfig`] names the record type and everything derived from it:
//! the index set, the scan prefix used by the wildcard fallback, the default
//! database, and the optimistic lock policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use typedkv_storage::{ConfigError, DatabaseIndex};

use crate::descriptor::TypeDescriptor;

/// Default lock TTL (30 seconds).
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);

/// Default number of concurrent per-key fetches in
/// [`get_all_key_value_pairs`](crate::DataProvider::get_all_key_value_pairs).
pub const DEFAULT_FETCH_CONCURRENCY: usize = 16;

/// How the lock resource for a record is named.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockNaming {
    /// Lock on the record key itself.
    #[default]
    Key,
    /// Lock on `"{type}:{key}"`, so equal keys of different types do not
    /// contend.
    TypeAndKey,
}

impl LockNaming {
    /// Lock resource name for `key` of type `type_name`.
    #[must_use]
    pub fn resource(self, type_name: &str, key: &str) -> String {
        match self {
            Self::Key => key.to_owned(),
            Self::TypeAndKey => format!("{type_name}:{key}"),
        }
    }
}

/// Data provider configuration.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use typedkv_provider::{LockNaming, ProviderConfig};
///
/// let config = ProviderConfig::builder()
///     .type_name("Invoice")
///     .lock_ttl(Duration::from_secs(10))
///     .lock_naming(LockNaming::TypeAndKey)
///     .build()?;
///
/// assert_eq!(config.index_name(), "Invoice");
/// assert_eq!(config.scan_prefix(), "Invoice");
/// # Ok::<(), typedkv_storage::ConfigError>(())
/// ```
///
/// Deserialized configurations are not validated until they are handed to
/// [`DataProvider::new`](crate::DataProvider::new), which calls
/// [`validate`](Self::validate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Simple name of the record type.
    pub(crate) type_name: String,

    /// Prefix for the wildcard scan; defaults to the type name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) scan_prefix: Option<String>,

    /// Name of the index set; defaults to the type name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) index_name: Option<String>,

    /// Database used unless overridden per provider.
    #[serde(default)]
    pub(crate) database: DatabaseIndex,

    /// How long a guarded write or delete may hold its lock.
    #[serde(with = "humantime_serde", default = "default_lock_ttl")]
    pub(crate) lock_ttl: Duration,

    /// Lock resource naming scheme.
    #[serde(default)]
    pub(crate) lock_naming: LockNaming,

    /// Bound on concurrent per-key fetches.
    #[serde(default = "default_fetch_concurrency")]
    pub(crate) fetch_concurrency: usize,
}

fn default_lock_ttl() -> Duration {
    DEFAULT_LOCK_TTL
}

fn default_fetch_concurrency() -> usize {
    DEFAULT_FETCH_CONCURRENCY
}

#[bon::bon]
impl ProviderConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Optional Fields
    ///
    /// * `scan_prefix` - Wildcard scan prefix (default: the type name).
    /// * `index_name` - Index set name (default: the type name).
    /// * `database` - Database index (default: 0).
    /// * `lock_ttl` - Lock TTL (default: 30 seconds).
    /// * `lock_naming` - Lock resource naming (default: the key).
    /// * `fetch_concurrency` - Concurrent per-key fetches (default: 16).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - `type_name`, `scan_prefix` or `index_name` is empty
    /// - `lock_ttl` is zero
    /// - `fetch_concurrency` is zero
    #[builder]
    pub fn new(
        #[builder(into)] type_name: String,
        #[builder(into)] scan_prefix: Option<String>,
        #[builder(into)] index_name: Option<String>,
        #[builder(default)] database: DatabaseIndex,
        #[builder(default = DEFAULT_LOCK_TTL)] lock_ttl: Duration,
        #[builder(default)] lock_naming: LockNaming,
        #[builder(default = DEFAULT_FETCH_CONCURRENCY)] fetch_concurrency: usize,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            type_name,
            scan_prefix,
            index_name,
            database,
            lock_ttl,
            lock_naming,
            fetch_concurrency,
        };
        config.validate()?;
        Ok(config)
    }
}

impl ProviderConfig {
    /// Default configuration for records of type `T`, named by
    /// [`TypeDescriptor::of`].
    ///
    /// # Errors
    ///
    /// Never fails for nameable types; the `Result` mirrors the builder.
    pub fn for_type<T: ?Sized>() -> Result<Self, ConfigError> {
        Self::builder().type_name(TypeDescriptor::of::<T>().name()).build()
    }

    /// Checks every field against its constraints.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.type_name.is_empty() {
            return Err(ConfigError::Empty { field: "type_name" });
        }
        if self.scan_prefix.as_deref() == Some("") {
            return Err(ConfigError::Empty { field: "scan_prefix" });
        }
        if self.index_name.as_deref() == Some("") {
            return Err(ConfigError::Empty { field: "index_name" });
        }
        if self.lock_ttl.is_zero() {
            return Err(ConfigError::BelowMinimum {
                field: "lock_ttl",
                min: "1ms".into(),
                value: "0s".into(),
            });
        }
        if self.fetch_concurrency == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "fetch_concurrency",
                min: "1".into(),
                value: "0".into(),
            });
        }
        Ok(())
    }

    /// Simple name of the record type.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Descriptor for the record type.
    #[must_use]
    pub fn descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::named(self.type_name.clone())
    }

    /// Prefix used by the wildcard scan.
    #[must_use]
    pub fn scan_prefix(&self) -> &str {
        self.scan_prefix.as_deref().unwrap_or(&self.type_name)
    }

    /// Name of the index set.
    #[must_use]
    pub fn index_name(&self) -> &str {
        self.index_name.as_deref().unwrap_or(&self.type_name)
    }

    /// Default database.
    #[must_use]
    pub fn database(&self) -> DatabaseIndex {
        self.database
    }

    /// Lock TTL for guarded operations.
    #[must_use]
    pub fn lock_ttl(&self) -> Duration {
        self.lock_ttl
    }

    /// Lock resource naming scheme.
    #[must_use]
    pub fn lock_naming(&self) -> LockNaming {
        self.lock_naming
    }

    /// Bound on concurrent per-key fetches.
    #[must_use]
    pub fn fetch_concurrency(&self) -> usize {
        self.fetch_concurrency
    }

    /// Lock resource guarding `key`.
    #[must_use]
    pub fn lock_resource(&self, key: &str) -> String {
        self.lock_naming.resource(&self.type_name, key)
    }
}
