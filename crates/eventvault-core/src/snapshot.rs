//! Snapshot value objects.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A compaction of a stream's state at a given revision. Never mutated;
/// newer snapshots supersede older ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique snapshot identifier.
    pub id: String,
    /// Aggregate/stream the snapshot compacts.
    pub aggregate_id: String,
    /// Aggregate type name.
    pub aggregate: String,
    /// Bounded-context name.
    pub context: String,
    /// Stream revision the snapshot was taken at.
    pub revision: i64,
    /// Schema version of the compaction format.
    pub version: i64,
    /// Time the snapshot was stored.
    pub commit_stamp: DateTime<Utc>,
    /// Opaque compacted state.
    pub data: serde_json::Value,
}

impl Snapshot {
    /// Selection ordering: `(revision, version, commit_stamp)` ascending.
    /// The preferred snapshot is the maximum.
    #[must_use]
    pub fn selection_order(&self, other: &Self) -> Ordering {
        self.revision
            .cmp(&other.revision)
            .then(self.version.cmp(&other.version))
            .then(self.commit_stamp.cmp(&other.commit_stamp))
    }
}

/// Caller-supplied parameters for a new snapshot. Id and stamp are assigned
/// when it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSnapshot {
    /// Aggregate/stream the snapshot compacts.
    pub aggregate_id: String,
    /// Aggregate type name; defaults to the general scope.
    #[serde(default)]
    pub aggregate: Option<String>,
    /// Bounded-context name; defaults to the general scope.
    #[serde(default)]
    pub context: Option<String>,
    /// Stream revision the snapshot was taken at.
    pub revision: i64,
    /// Schema version of the compaction format.
    #[serde(default = "default_snapshot_version")]
    pub version: i64,
    /// Opaque compacted state.
    pub data: serde_json::Value,
}

fn default_snapshot_version() -> i64 {
    1
}
