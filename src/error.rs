//! Error types for the subscription index.

use std::fmt;
use thiserror::Error;

/// Which side of the KV adapter contract failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageOp {
    Read,
    Write,
}

impl fmt::Display for StorageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageOp::Read => write!(f, "read"),
            StorageOp::Write => write!(f, "write"),
        }
    }
}

/// Main error type for subscription operations.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage {op} failed for key {key}: {message}")]
    Storage {
        op: StorageOp,
        key: String,
        message: String,
    },

    #[error("Subscription not found: {alias} in channel {channel_id}")]
    NotFound { channel_id: String, alias: String },

    #[error("Subscription already exists: {alias} in channel {channel_id}")]
    AliasExists { channel_id: String, alias: String },

    #[error("Invalid subscription: {0}")]
    InvalidSubscription(String),

    /// The second write of a two-write mutation failed; the indexes disagree
    /// until the channel is repaired.
    #[error("Index drift in channel {channel_id} (alias {alias}, space key {reverse_key}): {source}")]
    PartialConsistency {
        channel_id: String,
        alias: String,
        reverse_key: String,
        source: Box<SubscriptionError>,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Unsupported schema version: {found} (supported up to {supported})")]
    UnsupportedVersion { found: u16, supported: u16 },

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SubscriptionError {
    /// True for a missing alias. Not an operational failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SubscriptionError::NotFound { .. })
    }

    /// True when the backing store (or its encoding) failed and the user
    /// should see the generic failure message.
    pub fn is_storage_failure(&self) -> bool {
        !matches!(
            self,
            SubscriptionError::NotFound { .. }
                | SubscriptionError::AliasExists { .. }
                | SubscriptionError::InvalidSubscription(_)
                | SubscriptionError::Config(_)
        )
    }

    pub fn is_partial_consistency(&self) -> bool {
        matches!(self, SubscriptionError::PartialConsistency { .. })
    }

    pub(crate) fn read_failed(key: &str, message: impl Into<String>) -> Self {
        SubscriptionError::Storage {
            op: StorageOp::Read,
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn write_failed(key: &str, message: impl Into<String>) -> Self {
        SubscriptionError::Storage {
            op: StorageOp::Write,
            key: key.to_string(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for SubscriptionError {
    fn from(e: serde_json::Error) -> Self {
        SubscriptionError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for SubscriptionError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        SubscriptionError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for SubscriptionError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        SubscriptionError::Deserialization(e.to_string())
    }
}

/// Result type for subscription operations.
pub type Result<T> = std::result::Result<T, SubscriptionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let not_found = SubscriptionError::NotFound {
            channel_id: "C1".into(),
            alias: "a1".into(),
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_storage_failure());

        let write = SubscriptionError::write_failed("C1", "disk full");
        assert!(write.is_storage_failure());
        assert!(!write.is_partial_consistency());

        let drift = SubscriptionError::PartialConsistency {
            channel_id: "C1".into(),
            alias: "a1".into(),
            reverse_key: "space:00".into(),
            source: Box::new(write),
        };
        assert!(drift.is_storage_failure());
        assert!(drift.is_partial_consistency());
        assert!(drift.to_string().contains("disk full"));
    }
}
