//! `StorageAdapter` wrappers that inject faults.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use eventvault_core::error::{EventStoreError, Result};
use eventvault_core::event::Event;
use eventvault_core::query::{EventFilter, StreamQuery};
use eventvault_core::snapshot::Snapshot;
use eventvault_core::storage::StorageAdapter;
use eventvault_core::transaction::Transaction;

fn injected() -> EventStoreError {
    EventStoreError::Storage("injected fault".into())
}

/// Wraps a real adapter and fails selected operations on demand. Every
/// operation that is not armed to fail is delegated to the inner adapter.
pub struct FaultInjectingAdapter {
    inner: Arc<dyn StorageAdapter>,
    partial_batch: Mutex<Option<usize>>,
    stall_connect: AtomicBool,
    fail_add_transaction: AtomicBool,
    fail_remove_transaction: AtomicBool,
    fail_set_dispatched: AtomicBool,
    removed_transactions: AtomicUsize,
}

impl FaultInjectingAdapter {
    /// Wrap `inner` with no faults armed.
    #[must_use]
    pub fn new(inner: Arc<dyn StorageAdapter>) -> Self {
        Self {
            inner,
            partial_batch: Mutex::new(None),
            stall_connect: AtomicBool::new(false),
            fail_add_transaction: AtomicBool::new(false),
            fail_remove_transaction: AtomicBool::new(false),
            fail_set_dispatched: AtomicBool::new(false),
            removed_transactions: AtomicUsize::new(0),
        }
    }

    /// The next `insert_events` call persists only its first `persisted`
    /// events, then fails as if the process crashed mid-batch.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn crash_next_batch_after(&self, persisted: usize) {
        *self.partial_batch.lock().unwrap() = Some(persisted);
    }

    /// Make `connect` never complete, as with an unreachable backend.
    pub fn stall_connect(&self, stall: bool) {
        self.stall_connect.store(stall, Ordering::SeqCst);
    }

    /// Toggle failures of `add_transaction`.
    pub fn fail_add_transaction(&self, fail: bool) {
        self.fail_add_transaction.store(fail, Ordering::SeqCst);
    }

    /// Toggle failures of `remove_transaction`.
    pub fn fail_remove_transaction(&self, fail: bool) {
        self.fail_remove_transaction.store(fail, Ordering::SeqCst);
    }

    /// Toggle failures of `set_event_to_dispatched`.
    pub fn fail_set_dispatched(&self, fail: bool) {
        self.fail_set_dispatched.store(fail, Ordering::SeqCst);
    }

    /// Number of `remove_transaction` calls that reached the inner adapter.
    pub fn removed_transactions(&self) -> usize {
        self.removed_transactions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageAdapter for FaultInjectingAdapter {
    async fn connect(&self) -> Result<()> {
        if self.stall_connect.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        self.inner.connect().await
    }

    async fn disconnect(&self) -> Result<()> {
        self.inner.disconnect().await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }

    async fn get_new_id(&self) -> Result<String> {
        self.inner.get_new_id().await
    }

    async fn add_transaction(&self, transaction: &Transaction) -> Result<()> {
        if self.fail_add_transaction.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.add_transaction(transaction).await
    }

    async fn get_transaction(&self, commit_id: &str) -> Result<Option<Transaction>> {
        self.inner.get_transaction(commit_id).await
    }

    async fn remove_transaction(&self, commit_id: &str) -> Result<()> {
        if self.fail_remove_transaction.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.removed_transactions.fetch_add(1, Ordering::SeqCst);
        self.inner.remove_transaction(commit_id).await
    }

    async fn insert_events(&self, events: &[Event]) -> Result<()> {
        let partial = self.partial_batch.lock().unwrap().take();
        match partial {
            Some(persisted) => {
                let persisted = persisted.min(events.len());
                self.inner.insert_events(&events[..persisted]).await?;
                Err(injected())
            }
            None => self.inner.insert_events(events).await,
        }
    }

    async fn find_events(
        &self,
        filter: &EventFilter,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Event>> {
        self.inner.find_events(filter, skip, limit).await
    }

    async fn find_last_event(&self, query: &StreamQuery) -> Result<Option<Event>> {
        self.inner.find_last_event(query).await
    }

    async fn set_event_to_dispatched(&self, id: &str) -> Result<()> {
        if self.fail_set_dispatched.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.set_event_to_dispatched(id).await
    }

    async fn add_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.inner.add_snapshot(snapshot).await
    }

    async fn find_snapshot(
        &self,
        query: &StreamQuery,
        rev_max: Option<i64>,
    ) -> Result<Option<Snapshot>> {
        self.inner.find_snapshot(query, rev_max).await
    }

    async fn clean_snapshots(&self, query: &StreamQuery, keep: usize) -> Result<()> {
        self.inner.clean_snapshots(query, keep).await
    }
}

/// A storage adapter whose every operation fails with a storage error.
/// Useful for testing error-handling paths.
#[derive(Debug)]
pub struct FailingAdapter;

fn refused() -> EventStoreError {
    EventStoreError::Storage("connection refused".into())
}

#[async_trait]
impl StorageAdapter for FailingAdapter {
    async fn connect(&self) -> Result<()> {
        Err(refused())
    }

    async fn disconnect(&self) -> Result<()> {
        Err(refused())
    }

    async fn clear(&self) -> Result<()> {
        Err(refused())
    }

    async fn get_new_id(&self) -> Result<String> {
        Err(refused())
    }

    async fn add_transaction(&self, _transaction: &Transaction) -> Result<()> {
        Err(refused())
    }

    async fn get_transaction(&self, _commit_id: &str) -> Result<Option<Transaction>> {
        Err(refused())
    }

    async fn remove_transaction(&self, _commit_id: &str) -> Result<()> {
        Err(refused())
    }

    async fn insert_events(&self, _events: &[Event]) -> Result<()> {
        Err(refused())
    }

    async fn find_events(
        &self,
        _filter: &EventFilter,
        _skip: usize,
        _limit: Option<usize>,
    ) -> Result<Vec<Event>> {
        Err(refused())
    }

    async fn find_last_event(&self, _query: &StreamQuery) -> Result<Option<Event>> {
        Err(refused())
    }

    async fn set_event_to_dispatched(&self, _id: &str) -> Result<()> {
        Err(refused())
    }

    async fn add_snapshot(&self, _snapshot: &Snapshot) -> Result<()> {
        Err(refused())
    }

    async fn find_snapshot(
        &self,
        _query: &StreamQuery,
        _rev_max: Option<i64>,
    ) -> Result<Option<Snapshot>> {
        Err(refused())
    }

    async fn clean_snapshots(&self, _query: &StreamQuery, _keep: usize) -> Result<()> {
        Err(refused())
    }
}
