//! Error types for the data provider.
//!
//! Every fallible provider operation returns [`ProviderResult<T>`]. Store
//! failures pass through unchanged as [`ProviderError::Storage`]; the
//! provider adds argument validation, encoding failures and optimistic lock
//! conflicts on top.
//!
//! Decoding failures never appear here: batch reads drop records that fail to
//! decode and log them at `debug` level.

use std::fmt;

use thiserror::Error;
use typedkv_storage::{ConfigError, StorageError};

use crate::codec::CodecError;

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Reason attached to a conflict raised by a guarded write.
pub const WRITE_CONFLICT_MESSAGE: &str =
    "Unable to save item because it is locked. Please try again.";

/// Reason attached to a conflict raised by a guarded delete.
pub const DELETE_CONFLICT_MESSAGE: &str =
    "Unable to delete item because it is locked. Please try again.";

/// One key whose lock could not be acquired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConflict {
    /// Key of the contended record.
    pub key: String,
    /// Payload the caller tried to write; absent for deletes.
    pub payload: Option<String>,
    /// Human-readable reason.
    pub message: String,
}

impl LockConflict {
    /// Conflict for a guarded write of `payload` to `key`.
    pub fn write(key: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            payload: Some(payload.into()),
            message: WRITE_CONFLICT_MESSAGE.to_owned(),
        }
    }

    /// Conflict for a guarded delete of `key`.
    pub fn delete(key: impl Into<String>) -> Self {
        Self { key: key.into(), payload: None, message: DELETE_CONFLICT_MESSAGE.to_owned() }
    }
}

impl fmt::Display for LockConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Item is locked, please try again later. Key : {} | Value : {}. {}",
            self.key,
            self.payload.as_deref().unwrap_or("N/A"),
            self.message
        )
    }
}

/// Renders conflicts for display: a single conflict as-is, several as a
/// numbered list.
fn describe_conflicts(conflicts: &[LockConflict]) -> String {
    match conflicts {
        [single] => single.to_string(),
        many => {
            let mut message = format!("{} items are locked:", many.len());
            for (i, conflict) in many.iter().enumerate() {
                message.push_str(&format!("\n{}. {conflict}", i + 1));
            }
            message
        },
    }
}

/// Errors raised by [`DataProvider`](crate::DataProvider) operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProviderError {
    /// A required argument was empty. Raised before the store is touched.
    #[error("Missing required argument: {argument}")]
    MissingArgument {
        /// Name of the offending argument.
        argument: &'static str,
    },

    /// One or more records were locked by another owner.
    ///
    /// Guarded writes carry exactly one conflict, including the payload. A
    /// guarded batch delete aggregates every key it could not lock.
    #[error("{}", describe_conflicts(conflicts))]
    OptimisticLockConflict {
        /// Every key that could not be locked, in the order attempted.
        conflicts: Vec<LockConflict>,
    },

    /// The value to write could not be encoded.
    #[error("Failed to encode value: {0}")]
    Encode(#[source] CodecError),

    /// The provider configuration is invalid.
    #[error("Invalid provider configuration: {0}")]
    Config(#[from] ConfigError),

    /// The store rejected or failed an operation.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ProviderError {
    /// Creates a [`ProviderError::MissingArgument`].
    #[must_use]
    pub fn missing_argument(argument: &'static str) -> Self {
        Self::MissingArgument { argument }
    }

    /// Creates a [`ProviderError::OptimisticLockConflict`].
    #[must_use]
    pub fn lock_conflict(conflicts: Vec<LockConflict>) -> Self {
        Self::OptimisticLockConflict { conflicts }
    }

    /// Returns the conflicting keys if this is a lock conflict.
    #[must_use]
    pub fn conflicting_keys(&self) -> Vec<&str> {
        match self {
            Self::OptimisticLockConflict { conflicts } => {
                conflicts.iter().map(|conflict| conflict.key.as_str()).collect()
            },
            _ => Vec::new(),
        }
    }

    /// Returns `true` for errors that may succeed when retried later.
    ///
    /// Lock conflicts and transient store failures qualify. The provider never
    /// retries on its own.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::OptimisticLockConflict { .. } => true,
            Self::Storage(error) => error.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_single_conflict_display() {
        let err = ProviderError::lock_conflict(vec![LockConflict::write("Widget:1", "{}")]);
        assert_eq!(
            err.to_string(),
            "Item is locked, please try again later. Key : Widget:1 | Value : {}. \
             Unable to save item because it is locked. Please try again."
        );
    }

    #[test]
    fn test_aggregated_conflicts_are_numbered() {
        let err = ProviderError::lock_conflict(vec![
            LockConflict::delete("Widget:1"),
            LockConflict::delete("Widget:2"),
        ]);
        let message = err.to_string();

        let lines: Vec<&str> = message.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "2 items are locked:");
        assert!(lines[1].starts_with("1. Item is locked"));
        assert!(lines[1].contains("Key : Widget:1 | Value : N/A"));
        assert!(lines[2].starts_with("2. Item is locked"));
        assert!(lines[2].contains(DELETE_CONFLICT_MESSAGE));
    }

    #[test]
    fn test_conflicting_keys() {
        let err = ProviderError::lock_conflict(vec![
            LockConflict::delete("a"),
            LockConflict::delete("b"),
        ]);
        assert_eq!(err.conflicting_keys(), vec!["a", "b"]);
        assert!(ProviderError::missing_argument("key").conflicting_keys().is_empty());
    }

    #[test]
    fn test_storage_error_is_transparent() {
        let err = ProviderError::from(StorageError::timeout());
        assert_eq!(err.to_string(), "Operation timeout");
        assert!(err.is_retryable());
        assert!(!ProviderError::from(StorageError::internal("bug")).is_retryable());
    }

    #[test]
    fn test_encode_error_keeps_source() {
        let err = ProviderError::Encode(CodecError::encode("bad value"));
        assert!(err.source().is_some());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_missing_argument_display() {
        assert_eq!(
            ProviderError::missing_argument("keys").to_string(),
            "Missing required argument: keys"
        );
    }
}
