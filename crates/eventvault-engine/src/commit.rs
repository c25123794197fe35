//! Atomic multi-event commits over non-transactional storage.
//!
//! A batch of more than one event is first written as a staging
//! transaction keyed by its commit id, then the events are inserted, then
//! the staging record is removed. Each event carries the number of events
//! still following it in the same commit (`rest_in_commit_stream`), which
//! lets the stream reader detect and complete a batch that was only
//! partially written.

use std::sync::Arc;

use eventvault_core::clock::Clock;
use eventvault_core::error::{EventStoreError, Result};
use eventvault_core::event::{Event, EventMappings, UncommittedEvent};
use eventvault_core::storage::StorageAdapter;
use eventvault_core::transaction::Transaction;

use crate::dispatcher::Dispatcher;

/// Orchestrates appends against a storage adapter.
///
/// Holds no mutable state; clones share the adapter and may commit
/// concurrently.
#[derive(Clone)]
pub struct CommitCoordinator {
    adapter: Arc<dyn StorageAdapter>,
    clock: Arc<dyn Clock>,
    mappings: Arc<EventMappings>,
    dispatcher: Option<Dispatcher>,
}

impl std::fmt::Debug for CommitCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitCoordinator")
            .field("mappings", &self.mappings)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl CommitCoordinator {
    /// Creates a coordinator stamping commits with `clock`.
    #[must_use]
    pub fn new(adapter: Arc<dyn StorageAdapter>, clock: Arc<dyn Clock>) -> Self {
        Self {
            adapter,
            clock,
            mappings: Arc::new(EventMappings::default()),
            dispatcher: None,
        }
    }

    /// Copies commit metadata into payload fields on every commit.
    #[must_use]
    pub fn with_mappings(mut self, mappings: EventMappings) -> Self {
        self.mappings = Arc::new(mappings);
        self
    }

    /// Hands committed events straight to a dispatcher queue.
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Commits `uncommitted` on top of a stream whose last revision is
    /// `last_revision` (-1 for an empty stream) and returns the stored events.
    ///
    /// Assigns one fresh commit id to the whole batch, consecutive commit
    /// sequences and stream revisions, and a single commit stamp.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::MissingAggregateId` before any I/O if an
    /// event has no aggregate id, or the adapter's error if the write fails.
    pub async fn commit(
        &self,
        last_revision: i64,
        uncommitted: &[UncommittedEvent],
    ) -> Result<Vec<Event>> {
        if uncommitted.is_empty() {
            return Ok(Vec::new());
        }
        if uncommitted.iter().any(|e| e.aggregate_id.is_empty()) {
            return Err(EventStoreError::MissingAggregateId);
        }
        let count = i64::try_from(uncommitted.len())
            .map_err(|_| EventStoreError::InvalidArgument("commit batch too large".into()))?;

        let commit_id = self.adapter.get_new_id().await?;
        let commit_stamp = self.clock.now();
        let events: Vec<Event> = (0_i64..)
            .zip(uncommitted)
            .map(|(sequence, pending)| {
                let mut event = Event {
                    id: Event::id_for(&commit_id, sequence),
                    aggregate_id: pending.aggregate_id.clone(),
                    aggregate: pending.aggregate.clone(),
                    context: pending.context.clone(),
                    stream_revision: last_revision + 1 + sequence,
                    commit_id: commit_id.clone(),
                    commit_sequence: sequence,
                    commit_stamp,
                    rest_in_commit_stream: count - 1 - sequence,
                    header: pending.header.clone(),
                    payload: pending.payload.clone(),
                    dispatched: false,
                };
                self.mappings.apply(&mut event);
                event
            })
            .collect();

        self.add_events(&events).await?;
        tracing::debug!(%commit_id, events = events.len(), "commit stored");

        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.enqueue(events.iter().cloned()).await;
        }
        Ok(events)
    }

    /// Stores already-stamped events of one commit so that the batch is
    /// all-or-nothing from the reader's point of view.
    ///
    /// Re-running the same batch is safe: events already stored under the
    /// same `(commit_id, commit_sequence)` are skipped by the adapter.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::MissingAggregateId` before any I/O if an
    /// event has no aggregate id. Returns the adapter's error if staging or
    /// inserting fails; a failed staging write leaves nothing committed.
    pub async fn add_events(&self, events: &[Event]) -> Result<()> {
        if events.iter().any(|e| e.aggregate_id.is_empty()) {
            return Err(EventStoreError::MissingAggregateId);
        }
        match events {
            [] => Ok(()),
            [_] => self.adapter.insert_events(events).await,
            [first, ..] => {
                let commit_id = first.commit_id.clone();
                self.adapter
                    .add_transaction(&Transaction::stage(commit_id.clone(), events.to_vec()))
                    .await?;
                self.adapter.insert_events(events).await?;

                // A lingering staging record with nothing missing is harmless;
                // the next read of the stream removes it.
                if let Err(err) = self.adapter.remove_transaction(&commit_id).await {
                    tracing::warn!(%commit_id, error = %err, "removing staging record failed");
                }
                Ok(())
            }
        }
    }
}
