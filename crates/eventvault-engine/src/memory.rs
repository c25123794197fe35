//! In-memory implementation of the `StorageAdapter` trait.
//!
//! State lives behind the adapter instance, so several event stores in one
//! process never share data.

use std::collections::HashMap;

use async_trait::async_trait;
use eventvault_core::error::{EventStoreError, Result};
use eventvault_core::event::Event;
use eventvault_core::query::{EventFilter, StreamQuery};
use eventvault_core::snapshot::Snapshot;
use eventvault_core::storage::StorageAdapter;
use eventvault_core::transaction::Transaction;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct MemoryState {
    events: Vec<Event>,
    transactions: HashMap<String, Transaction>,
    snapshots: Vec<Snapshot>,
}

impl MemoryState {
    fn has_commit_key(&self, event: &Event) -> bool {
        self.events.iter().any(|e| {
            e.commit_id == event.commit_id && e.commit_sequence == event.commit_sequence
        })
    }

    fn revision_taken(&self, event: &Event) -> bool {
        self.events.iter().any(|e| {
            e.aggregate_id == event.aggregate_id
                && e.aggregate == event.aggregate
                && e.context == event.context
                && e.stream_revision == event.stream_revision
        })
    }
}

/// Storage adapter keeping events, staging records and snapshots in memory.
#[derive(Debug, Default)]
pub struct InMemoryAdapter {
    state: RwLock<MemoryState>,
}

impl InMemoryAdapter {
    /// Creates an empty in-memory adapter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageAdapter for InMemoryAdapter {
    async fn connect(&self) -> Result<()> {
        tracing::debug!("in-memory adapter connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        tracing::debug!("in-memory adapter disconnected");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.state.write().await = MemoryState::default();
        Ok(())
    }

    async fn get_new_id(&self) -> Result<String> {
        Ok(Uuid::new_v4().to_string())
    }

    async fn add_transaction(&self, transaction: &Transaction) -> Result<()> {
        self.state
            .write()
            .await
            .transactions
            .insert(transaction.commit_id.clone(), transaction.clone());
        Ok(())
    }

    async fn get_transaction(&self, commit_id: &str) -> Result<Option<Transaction>> {
        Ok(self.state.read().await.transactions.get(commit_id).cloned())
    }

    async fn remove_transaction(&self, commit_id: &str) -> Result<()> {
        self.state.write().await.transactions.remove(commit_id);
        Ok(())
    }

    async fn insert_events(&self, events: &[Event]) -> Result<()> {
        let mut state = self.state.write().await;

        // Validate the whole batch before touching state so a conflict
        // leaves nothing behind.
        let mut fresh: Vec<&Event> = Vec::with_capacity(events.len());
        for event in events {
            let duplicate_in_batch = fresh.iter().any(|e| {
                e.commit_id == event.commit_id && e.commit_sequence == event.commit_sequence
            });
            if duplicate_in_batch || state.has_commit_key(event) {
                continue;
            }
            let clashes_in_batch = fresh.iter().any(|e| {
                e.aggregate_id == event.aggregate_id
                    && e.aggregate == event.aggregate
                    && e.context == event.context
                    && e.stream_revision == event.stream_revision
            });
            if clashes_in_batch || state.revision_taken(event) {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id: event.aggregate_id.clone(),
                    revision: event.stream_revision,
                });
            }
            fresh.push(event);
        }

        state.events.extend(fresh.into_iter().cloned());
        Ok(())
    }

    async fn find_events(
        &self,
        filter: &EventFilter,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Event>> {
        let state = self.state.read().await;
        let mut matching: Vec<Event> = state
            .events
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matching.sort_by(Event::commit_order);

        Ok(matching
            .into_iter()
            .skip(skip)
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn find_last_event(&self, query: &StreamQuery) -> Result<Option<Event>> {
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|e| query.matches(&e.aggregate_id, &e.aggregate, &e.context))
            .max_by(|a, b| a.commit_order(b))
            .cloned())
    }

    async fn set_event_to_dispatched(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(event) = state.events.iter_mut().find(|e| e.id == id) {
            event.dispatched = true;
        }
        Ok(())
    }

    async fn add_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.state.write().await.snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn find_snapshot(
        &self,
        query: &StreamQuery,
        rev_max: Option<i64>,
    ) -> Result<Option<Snapshot>> {
        let state = self.state.read().await;
        Ok(state
            .snapshots
            .iter()
            .filter(|s| query.matches(&s.aggregate_id, &s.aggregate, &s.context))
            .filter(|s| rev_max.is_none_or(|max| s.revision <= max))
            .max_by(|a, b| a.selection_order(b))
            .cloned())
    }

    async fn clean_snapshots(&self, query: &StreamQuery, keep: usize) -> Result<()> {
        let mut state = self.state.write().await;
        let mut scoped: Vec<&Snapshot> = state
            .snapshots
            .iter()
            .filter(|s| query.matches(&s.aggregate_id, &s.aggregate, &s.context))
            .collect();
        scoped.sort_by(|a, b| b.selection_order(a));
        let stale: Vec<String> = scoped.iter().skip(keep).map(|s| s.id.clone()).collect();

        state.snapshots.retain(|s| !stale.contains(&s.id));
        Ok(())
    }
}
