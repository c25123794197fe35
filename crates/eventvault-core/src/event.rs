//! Event value objects.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scope used for `aggregate` and `context` when the caller leaves them out.
pub const DEFAULT_SCOPE: &str = "_general";

/// An immutable, committed fact belonging to one stream.
///
/// `(aggregate_id, stream_revision)` is unique within a scope and
/// `(commit_id, commit_sequence)` is the deduplication key used to make
/// retried commits idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier (`commit_id` followed by `commit_sequence`).
    pub id: String,
    /// Aggregate/stream this event belongs to.
    pub aggregate_id: String,
    /// Aggregate type name.
    pub aggregate: String,
    /// Bounded-context name.
    pub context: String,
    /// Zero-based position of the event within its stream.
    pub stream_revision: i64,
    /// Groups events committed together.
    pub commit_id: String,
    /// Zero-based position within the commit.
    pub commit_sequence: i64,
    /// Commit timestamp.
    pub commit_stamp: DateTime<Utc>,
    /// Events of the same commit still pending after this one. Zero (or
    /// absent in storage) marks the last event of a commit.
    #[serde(default)]
    pub rest_in_commit_stream: i64,
    /// Opaque metadata.
    #[serde(default)]
    pub header: serde_json::Value,
    /// Opaque domain data.
    pub payload: serde_json::Value,
    /// Whether the event has been handed to the publisher.
    #[serde(default)]
    pub dispatched: bool,
}

impl Event {
    /// The stream identifier, which is the aggregate id.
    #[must_use]
    pub fn stream_id(&self) -> &str {
        &self.aggregate_id
    }

    /// Builds the event id for a position within a commit.
    #[must_use]
    pub fn id_for(commit_id: &str, commit_sequence: i64) -> String {
        format!("{commit_id}{commit_sequence}")
    }

    /// Whether the commit that produced this event is known to be complete.
    #[must_use]
    pub fn closes_commit(&self) -> bool {
        self.rest_in_commit_stream <= 0
    }

    /// Read ordering: `(commit_stamp, stream_revision, commit_sequence)`
    /// ascending.
    #[must_use]
    pub fn commit_order(&self, other: &Self) -> Ordering {
        self.commit_stamp
            .cmp(&other.commit_stamp)
            .then(self.stream_revision.cmp(&other.stream_revision))
            .then(self.commit_sequence.cmp(&other.commit_sequence))
    }
}

/// An event appended to a stream but not yet committed. Revision and commit
/// fields are assigned by the commit coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    /// Aggregate/stream this event will belong to.
    pub aggregate_id: String,
    /// Aggregate type name.
    pub aggregate: String,
    /// Bounded-context name.
    pub context: String,
    /// Opaque metadata.
    #[serde(default)]
    pub header: serde_json::Value,
    /// Opaque domain data.
    pub payload: serde_json::Value,
}

/// Names of payload fields that receive commit metadata when events are
/// committed. Fields left `None` are not written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMappings {
    /// Field receiving the event id.
    pub id: Option<String>,
    /// Field receiving the commit id.
    pub commit_id: Option<String>,
    /// Field receiving the commit sequence.
    pub commit_sequence: Option<String>,
    /// Field receiving the commit stamp (RFC 3339).
    pub commit_stamp: Option<String>,
    /// Field receiving the stream revision.
    pub stream_revision: Option<String>,
}

impl EventMappings {
    /// Returns `true` when no mapping is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.commit_id.is_none()
            && self.commit_sequence.is_none()
            && self.commit_stamp.is_none()
            && self.stream_revision.is_none()
    }

    /// Copies the configured commit metadata into the event's payload.
    /// Payloads that are not JSON objects are left untouched.
    pub fn apply(&self, event: &mut Event) {
        let serde_json::Value::Object(fields) = &mut event.payload else {
            return;
        };
        if let Some(key) = &self.id {
            fields.insert(key.clone(), event.id.clone().into());
        }
        if let Some(key) = &self.commit_id {
            fields.insert(key.clone(), event.commit_id.clone().into());
        }
        if let Some(key) = &self.commit_sequence {
            fields.insert(key.clone(), event.commit_sequence.into());
        }
        if let Some(key) = &self.commit_stamp {
            fields.insert(key.clone(), event.commit_stamp.to_rfc3339().into());
        }
        if let Some(key) = &self.stream_revision {
            fields.insert(key.clone(), event.stream_revision.into());
        }
    }
}
