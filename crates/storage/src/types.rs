//! Common types used across store operations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical partition selector within a store.
///
/// Stores such as Redis expose numbered databases; every key lives in exactly
/// one of them. The index is never negative: [`DatabaseIndex::new`] clamps
/// negative input to `0`, mirroring how the default database is selected when
/// callers pass a sentinel.
///
/// # Examples
///
/// ```
/// use typedkv_storage::DatabaseIndex;
///
/// assert_eq!(DatabaseIndex::new(3).get(), 3);
/// assert_eq!(DatabaseIndex::new(-7), DatabaseIndex::DEFAULT);
/// assert_eq!(DatabaseIndex::default().to_string(), "0");
/// ```
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(from = "i64", into = "i64")]
pub struct DatabaseIndex(u32);

impl DatabaseIndex {
    /// The default database (`0`).
    pub const DEFAULT: Self = Self(0);

    /// Creates a database index, normalizing negative values to `0`.
    ///
    /// Values above `u32::MAX` saturate.
    #[must_use]
    pub fn new(index: i64) -> Self {
        Self(u32::try_from(index.max(0)).unwrap_or(u32::MAX))
    }

    /// Returns the raw index.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<i64> for DatabaseIndex {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

impl From<u32> for DatabaseIndex {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<DatabaseIndex> for i64 {
    fn from(index: DatabaseIndex) -> Self {
        i64::from(index.0)
    }
}

impl fmt::Display for DatabaseIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of one node a store session talks to.
///
/// Scans are issued per endpoint; a session backed by replicas returns the
/// same key from several endpoints, so callers de-duplicate across them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    /// Creates an endpoint from its address or logical name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the endpoint name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Endpoint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_default_is_zero() {
        assert_eq!(DatabaseIndex::default(), DatabaseIndex::DEFAULT);
        assert_eq!(DatabaseIndex::DEFAULT.get(), 0);
    }

    #[test]
    fn test_serde_uses_plain_integer() {
        let json = serde_json::to_string(&DatabaseIndex::new(5)).unwrap();
        assert_eq!(json, "5");

        let parsed: DatabaseIndex = serde_json::from_str("-3").unwrap();
        assert_eq!(parsed, DatabaseIndex::DEFAULT);
    }

    #[test]
    fn test_endpoint_display() {
        let endpoint = Endpoint::new("10.0.0.1:6379");
        assert_eq!(endpoint.to_string(), "10.0.0.1:6379");
        assert_eq!(endpoint.as_str(), "10.0.0.1:6379");
        assert_eq!(Endpoint::from("a"), Endpoint::new(String::from("a")));
    }

    proptest! {
        /// Negative indices always normalize to the default database.
        #[test]
        fn negative_indices_normalize_to_zero(index in i64::MIN..0) {
            prop_assert_eq!(DatabaseIndex::new(index), DatabaseIndex::DEFAULT);
        }

        /// Non-negative indices within `u32` range are preserved exactly.
        #[test]
        fn non_negative_indices_are_preserved(index in 0..=i64::from(u32::MAX)) {
            prop_assert_eq!(i64::from(DatabaseIndex::new(index)), index);
        }
    }
}
