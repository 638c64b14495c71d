//! Shared test utilities for store and provider testing.
//!
//! This module provides helpers for generating test keys and values, a small
//! sample record type, and assertion macros for
//! [`StorageResult`](crate::StorageResult) values. It is feature-gated behind
//! `testutil` to prevent leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! typedkv-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use typedkv_storage::testutil::{Widget, make_key, make_tagged_value};
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Create a deterministic test key from a prefix and index.
///
/// Produces keys like `"Widget:000042"` (zero-padded to 6 digits). The
/// zero-padding keeps lexicographic ordering aligned with numeric ordering,
/// which makes prefix scan results predictable.
#[must_use]
pub fn make_key(prefix: &str, idx: usize) -> String {
    format!("{prefix}:{idx:06}")
}

/// Create a test value tagged with a task ID and sequence number.
///
/// Produces values like `"task3-val42"`. Useful for concurrent tests where
/// you need to identify which task wrote which value.
#[must_use]
pub fn make_tagged_value(task: usize, seq: usize) -> Bytes {
    Bytes::from(format!("task{task}-val{seq}"))
}

/// Small serializable record used throughout the provider tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Widget {
    /// Numeric identifier.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Free-form labels.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Widget {
    /// Create a widget named `"widget-{id}"` with no tags.
    #[must_use]
    pub fn numbered(id: u32) -> Self {
        Self { id, name: format!("widget-{id}"), tags: Vec::new() }
    }

    /// Key this widget is conventionally stored under.
    #[must_use]
    pub fn key(&self) -> String {
        format!("Widget:{}", self.id)
    }
}

/// Assert that a [`StorageResult`](crate::StorageResult) is a
/// [`StorageError::WrongType`](crate::StorageError::WrongType).
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use typedkv_storage::assert_wrong_type;
/// use typedkv_storage::error::{StorageError, StorageResult};
///
/// let result: StorageResult<()> = Err(StorageError::wrong_type("Widget"));
/// assert_wrong_type!(result);
/// ```
#[macro_export]
macro_rules! assert_wrong_type {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::WrongType { .. })),
            "expected StorageError::WrongType, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::WrongType { .. })),
            "{}: expected StorageError::WrongType, got: {:?}",
            $msg,
            $result,
        );
    };
}

/// Assert that a [`StorageResult`](crate::StorageResult) is a
/// [`StorageError::InvalidDatabase`](crate::StorageError::InvalidDatabase).
#[macro_export]
macro_rules! assert_invalid_database {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::InvalidDatabase { .. })),
            "expected StorageError::InvalidDatabase, got: {:?}",
            $result,
        );
    };
}
