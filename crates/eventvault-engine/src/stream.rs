//! In-memory view of one event stream with a buffer of pending events.

use eventvault_core::error::{EventStoreError, Result};
use eventvault_core::event::{Event, UncommittedEvent};
use eventvault_core::query::StreamQuery;
use serde_json::Value;

use crate::commit::CommitCoordinator;

/// The committed history of one stream plus events waiting to be committed.
///
/// `last_revision` is -1 for an empty stream. A failed commit leaves the
/// pending events in place so the caller can retry.
#[derive(Debug)]
pub struct EventStream {
    coordinator: CommitCoordinator,
    aggregate_id: String,
    aggregate: String,
    context: String,
    events: Vec<Event>,
    uncommitted_events: Vec<UncommittedEvent>,
    last_revision: i64,
}

impl EventStream {
    /// Wraps the committed `events` of the stream addressed by `query`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the query has no aggregate id.
    pub fn new(coordinator: CommitCoordinator, query: &StreamQuery, events: Vec<Event>) -> Result<Self> {
        let aggregate_id = query.require_aggregate_id()?.to_owned();
        let last_revision = events.iter().map(|e| e.stream_revision).max().unwrap_or(-1);
        Ok(Self {
            coordinator,
            aggregate_id,
            aggregate: query.aggregate_or_default().to_owned(),
            context: query.context_or_default().to_owned(),
            events,
            uncommitted_events: Vec::new(),
            last_revision,
        })
    }

    /// Aggregate id of the stream.
    #[must_use]
    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    /// Aggregate scope of the stream.
    #[must_use]
    pub fn aggregate(&self) -> &str {
        &self.aggregate
    }

    /// Context scope of the stream.
    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Committed events in read order.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Events added since the last successful commit.
    #[must_use]
    pub fn uncommitted_events(&self) -> &[UncommittedEvent] {
        &self.uncommitted_events
    }

    /// Revision of the last committed event, or -1 for an empty stream.
    /// Pending events do not count.
    #[must_use]
    pub fn current_revision(&self) -> i64 {
        self.last_revision
    }

    /// Raises the last revision to `revision` when the stream was loaded
    /// from a snapshot and holds no events past it.
    pub(crate) fn continue_from(&mut self, revision: i64) {
        self.last_revision = self.last_revision.max(revision);
    }

    /// Buffers one payload.
    pub fn add_event(&mut self, payload: Value) {
        self.add_event_with_header(Value::Null, payload);
    }

    /// Buffers one payload with an event header.
    pub fn add_event_with_header(&mut self, header: Value, payload: Value) {
        self.uncommitted_events.push(UncommittedEvent {
            aggregate_id: self.aggregate_id.clone(),
            aggregate: self.aggregate.clone(),
            context: self.context.clone(),
            header,
            payload,
        });
    }

    /// Buffers payloads in order.
    pub fn add_events(&mut self, payloads: impl IntoIterator<Item = Value>) {
        for payload in payloads {
            self.add_event(payload);
        }
    }

    /// Buffers the elements of a JSON array.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `payloads` is not an array; nothing is
    /// buffered in that case.
    pub fn add_events_from_value(&mut self, payloads: Value) -> Result<()> {
        self.add_events_from_value_with_header(&Value::Null, payloads)
    }

    /// Buffers the elements of a JSON array, each carrying `header`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `payloads` is not an array; nothing is
    /// buffered in that case.
    pub fn add_events_from_value_with_header(&mut self, header: &Value, payloads: Value) -> Result<()> {
        let Value::Array(items) = payloads else {
            return Err(EventStoreError::InvalidArgument(
                "events must be an array".into(),
            ));
        };
        for payload in items {
            self.add_event_with_header(header.clone(), payload);
        }
        Ok(())
    }

    /// Commits the pending events and returns the newly stored ones.
    ///
    /// # Errors
    ///
    /// Returns the commit error; pending events are kept for a retry.
    pub async fn commit(&mut self) -> Result<&[Event]> {
        let stored = self
            .coordinator
            .commit(self.last_revision, &self.uncommitted_events)
            .await?;
        self.uncommitted_events.clear();
        if let Some(last) = stored.last() {
            self.last_revision = last.stream_revision;
        }
        let start = self.events.len();
        self.events.extend(stored);
        Ok(&self.events[start..])
    }
}
