//! Error types for the Tessera merge engine
//!
//! This module defines all error types surfaced by sort resolution, the
//! cross-shard merge and the reindex coordinator.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::types::ShardId;
use std::io;
use thiserror::Error;

/// Result type alias for Tessera operations
pub type Result<T> = std::result::Result<T, Error>;

/// One shard that did not contribute to a merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardFailure {
    /// Shard that failed
    pub shard: ShardId,
    /// Human readable cause (error message or "timed out")
    pub reason: String,
}

impl std::fmt::Display for ShardFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.shard, self.reason)
    }
}

/// Error types for the Tessera merge engine
#[derive(Debug, Error)]
pub enum Error {
    /// Sort field exists but cannot be sorted on (index-only or conflicting types)
    #[error("Field '{field}' is not sortable in index '{index}': {reason}")]
    UnsortableField {
        /// Requested sort field
        field: String,
        /// Index where resolution failed
        index: String,
        /// Why the field was rejected
        reason: String,
    },

    /// A normalized alias was requested that no schema defines
    #[error("Unknown sort alias '{alias}' for field '{field}'")]
    UnknownSortAlias {
        /// Field the alias was requested for
        field: String,
        /// Requested alias name
        alias: String,
    },

    /// Some shards were unreachable or returned errors
    #[error("{} shard(s) failed: {}", failures.len(), join_failures(failures))]
    PartialShardFailure {
        /// Every shard that failed, in dispatch order
        failures: Vec<ShardFailure>,
    },

    /// The caller-supplied deadline elapsed before the merge completed
    #[error("Deadline of {timeout_ms}ms exceeded")]
    DeadlineExceeded {
        /// The deadline that was exceeded
        timeout_ms: u64,
    },

    /// Reindex failed while rewriting; resumable from the checkpoint
    #[error("Reindex of '{index}' failed after {rewritten} documents: {reason}")]
    ReindexFailed {
        /// Index being reindexed
        index: String,
        /// Documents rewritten and checkpointed before the failure
        rewritten: u64,
        /// Cause of the failure
        reason: String,
    },

    /// A reindex is already running for the same index
    #[error("Schema conflict on '{index}': reindex already in progress")]
    SchemaConflict {
        /// Index with a reindex in flight
        index: String,
    },

    /// Index has no schema registered
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Schema failed validation
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Raw value cannot be encoded as the declared field type
    #[error("Invalid value for field type {field_type}: {reason}")]
    InvalidFieldValue {
        /// Declared type of the field
        field_type: String,
        /// What was wrong with the value
        reason: String,
    },

    /// Error raised by a shard executor
    #[error("Shard error: {0}")]
    Shard(String),

    /// Configuration could not be read or validated
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error (settings files, checkpoints)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn join_failures(failures: &[ShardFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Create an `UnsortableField` error
    pub fn unsortable(
        field: impl Into<String>,
        index: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::UnsortableField {
            field: field.into(),
            index: index.into(),
            reason: reason.into(),
        }
    }

    /// Create an `InvalidSchema` error
    pub fn invalid_schema(msg: impl Into<String>) -> Self {
        Error::InvalidSchema(msg.into())
    }

    /// Create a `Shard` error
    pub fn shard(msg: impl Into<String>) -> Self {
        Error::Shard(msg.into())
    }

    /// Whether retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ReindexFailed { .. }
                | Error::PartialShardFailure { .. }
                | Error::DeadlineExceeded { .. }
                | Error::Shard(_)
        )
    }
}
