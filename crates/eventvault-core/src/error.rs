//! Error taxonomy shared by every eventvault component.

use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the engine and the storage adapters.
pub type Result<T> = std::result::Result<T, EventStoreError>;

/// Top-level event store error type.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// A required identity field is missing or an argument is malformed.
    /// Raised before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An event or snapshot was handed to a write path without an
    /// aggregate id. Raised before any I/O.
    #[error("aggregate id not defined")]
    MissingAggregateId,

    /// The underlying storage failed (network, serialization, constraint
    /// violation other than an idempotent re-insert).
    #[error("storage error: {0}")]
    Storage(String),

    /// A different commit already owns this stream revision.
    #[error("concurrency conflict on stream {aggregate_id}: revision {revision} already committed")]
    ConcurrencyConflict {
        /// The stream that had the conflict.
        aggregate_id: String,
        /// The revision that was already taken.
        revision: i64,
    },

    /// Repair found a partial commit but no staging record to complete it.
    #[error("missing transaction entry for commit {commit_id}")]
    MissingTransactionEntry {
        /// The commit whose staging record is gone.
        commit_id: String,
    },

    /// The publisher rejected a dispatched event.
    #[error("publish error: {0}")]
    Publish(String),

    /// The storage adapter did not connect within the configured tolerance.
    #[error("storage adapter did not connect within {0:?}")]
    ConnectTimeout(Duration),
}

impl EventStoreError {
    /// Shorthand for wrapping any displayable driver error as a storage error.
    #[must_use]
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}
