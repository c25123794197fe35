//! The eventstore facade wiring the engine components to one adapter.

use std::sync::Arc;

use eventvault_core::clock::{Clock, SystemClock};
use eventvault_core::error::{EventStoreError, Result};
use eventvault_core::event::Event;
use eventvault_core::publisher::Publisher;
use eventvault_core::query::{StreamQuery, UNBOUNDED};
use eventvault_core::snapshot::{NewSnapshot, Snapshot};
use eventvault_core::storage::StorageAdapter;

use crate::commit::CommitCoordinator;
use crate::dispatcher::Dispatcher;
use crate::notify::{Notifications, StoreNotification};
use crate::options::EventstoreOptions;
use crate::reader::StreamReader;
use crate::snapshot::SnapshotManager;
use crate::stream::EventStream;

/// Builds an [`Eventstore`] around a storage adapter.
pub struct EventstoreBuilder {
    adapter: Arc<dyn StorageAdapter>,
    publisher: Option<Arc<dyn Publisher>>,
    clock: Arc<dyn Clock>,
    options: EventstoreOptions,
}

impl EventstoreBuilder {
    /// Delivers committed events to `publisher`. Without one, no dispatcher
    /// runs and events stay undispatched.
    #[must_use]
    pub fn publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Replaces the system clock used for commit and snapshot stamps.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the default options.
    #[must_use]
    pub fn options(mut self, options: EventstoreOptions) -> Self {
        self.options = options;
        self
    }

    /// Assembles the eventstore. Nothing is connected until
    /// [`Eventstore::init`].
    #[must_use]
    pub fn build(self) -> Eventstore {
        let Self {
            adapter,
            publisher,
            clock,
            options,
        } = self;

        let dispatcher = publisher.map(|publisher| {
            Dispatcher::new(
                adapter.clone(),
                publisher,
                options.dispatch_interval,
                options.page_size,
            )
        });
        let mut coordinator = CommitCoordinator::new(adapter.clone(), clock.clone())
            .with_mappings(options.mappings.clone());
        if let Some(dispatcher) = &dispatcher {
            coordinator = coordinator.with_dispatcher(dispatcher.clone());
        }

        Eventstore {
            reader: StreamReader::new(adapter.clone(), options.repair_policy, options.page_size),
            snapshots: SnapshotManager::new(adapter.clone(), clock, options.max_snapshots_count),
            adapter,
            coordinator,
            dispatcher,
            notifications: Notifications::default(),
            options,
        }
    }
}

/// Entry point of the storage engine.
///
/// All operations may be called concurrently; the only shared state is the
/// adapter and the dispatcher queue.
pub struct Eventstore {
    adapter: Arc<dyn StorageAdapter>,
    coordinator: CommitCoordinator,
    reader: StreamReader,
    snapshots: SnapshotManager,
    dispatcher: Option<Dispatcher>,
    notifications: Notifications,
    options: EventstoreOptions,
}

impl std::fmt::Debug for Eventstore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Eventstore")
            .field("options", &self.options)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Eventstore {
    /// Starts building an eventstore over `adapter`.
    #[must_use]
    pub fn builder(adapter: Arc<dyn StorageAdapter>) -> EventstoreBuilder {
        EventstoreBuilder {
            adapter,
            publisher: None,
            clock: Arc::new(SystemClock),
            options: EventstoreOptions::default(),
        }
    }

    /// Options the store was built with.
    #[must_use]
    pub fn options(&self) -> &EventstoreOptions {
        &self.options
    }

    /// The dispatcher, when a publisher is configured.
    #[must_use]
    pub fn dispatcher(&self) -> Option<&Dispatcher> {
        self.dispatcher.as_ref()
    }

    /// Registers a lifecycle listener.
    pub fn subscribe(&self, listener: impl Fn(StoreNotification) + Send + Sync + 'static) {
        self.notifications.subscribe(listener);
    }

    /// Connects the adapter within the configured timeout, then starts the
    /// dispatcher.
    ///
    /// # Errors
    ///
    /// Returns `ConnectTimeout` if the adapter does not connect in time,
    /// the adapter's connect error, or the dispatcher's initial load error.
    pub async fn init(&self) -> Result<()> {
        let timeout = self.options.connect_timeout;
        tokio::time::timeout(timeout, self.adapter.connect())
            .await
            .map_err(|_| EventStoreError::ConnectTimeout(timeout))??;
        tracing::info!("eventstore connected");
        self.notifications.emit(StoreNotification::Connected);

        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.start().await?;
        }
        Ok(())
    }

    /// Stops the dispatcher and disconnects the adapter.
    ///
    /// # Errors
    ///
    /// Returns the adapter's disconnect error.
    pub async fn close(&self) -> Result<()> {
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.shutdown().await;
        }
        self.adapter.disconnect().await?;
        tracing::info!("eventstore disconnected");
        self.notifications.emit(StoreNotification::Disconnected);
        Ok(())
    }

    /// Wipes all events, staging records and snapshots.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error.
    pub async fn clear(&self) -> Result<()> {
        self.adapter.clear().await
    }

    /// Returns a fresh unique id from the adapter.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error.
    pub async fn get_new_id(&self) -> Result<String> {
        self.adapter.get_new_id().await
    }

    /// Opens an empty stream handle for a new aggregate.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` without an aggregate id.
    pub fn new_event_stream(&self, query: &StreamQuery) -> Result<EventStream> {
        EventStream::new(self.coordinator.clone(), query, Vec::new())
    }

    /// Reads revisions `[rev_min, rev_max)` into a stream handle.
    ///
    /// # Errors
    ///
    /// Same as [`Eventstore::get_events_by_revision`].
    pub async fn get_event_stream(
        &self,
        query: &StreamQuery,
        rev_min: i64,
        rev_max: i64,
    ) -> Result<EventStream> {
        let events = self.reader.get_events_by_revision(query, rev_min, rev_max).await?;
        EventStream::new(self.coordinator.clone(), query, events)
    }

    /// Loads the newest snapshot at or below `rev_max` and a stream handle
    /// with the events after it, up to `rev_max` exclusive.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` without an aggregate id, or a read error.
    pub async fn get_from_snapshot(
        &self,
        query: &StreamQuery,
        rev_max: i64,
    ) -> Result<(Option<Snapshot>, EventStream)> {
        let snapshot = self.snapshots.get_snapshot(query, rev_max).await?;
        let rev_min = snapshot.as_ref().map_or(0, |s| s.revision + 1);
        let mut stream = self.get_event_stream(query, rev_min, rev_max).await?;
        if let Some(snapshot) = &snapshot {
            stream.continue_from(snapshot.revision);
        }
        Ok((snapshot, stream))
    }

    /// Returns the last event of a stream.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` without an aggregate id, or the adapter's
    /// error.
    pub async fn get_last_event(&self, query: &StreamQuery) -> Result<Option<Event>> {
        self.reader.get_last_event(query).await
    }

    /// Opens a stream handle seeded with only the last event, ready for
    /// appending without replaying history.
    ///
    /// # Errors
    ///
    /// Same as [`Eventstore::get_last_event`].
    pub async fn get_last_event_as_stream(&self, query: &StreamQuery) -> Result<EventStream> {
        let last = self.reader.get_last_event(query).await?;
        EventStream::new(self.coordinator.clone(), query, last.into_iter().collect())
    }

    /// Stores already-stamped events of one commit atomically.
    ///
    /// # Errors
    ///
    /// See [`CommitCoordinator::add_events`].
    pub async fn add_events(&self, events: &[Event]) -> Result<()> {
        self.coordinator.add_events(events).await
    }

    /// Returns events matching `query` in read order with offset paging.
    ///
    /// # Errors
    ///
    /// See [`StreamReader::get_events`].
    pub async fn get_events(
        &self,
        query: &StreamQuery,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Event>> {
        self.reader.get_events(query, skip, limit).await
    }

    /// Returns events of one stream with revisions in `[rev_min, rev_max)`.
    ///
    /// # Errors
    ///
    /// See [`StreamReader::get_events_by_revision`].
    pub async fn get_events_by_revision(
        &self,
        query: &StreamQuery,
        rev_min: i64,
        rev_max: i64,
    ) -> Result<Vec<Event>> {
        self.reader.get_events_by_revision(query, rev_min, rev_max).await
    }

    /// Returns every undispatched event, optionally scoped.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error.
    pub async fn get_undispatched_events(&self, query: Option<&StreamQuery>) -> Result<Vec<Event>> {
        self.reader.get_undispatched_events(query).await
    }

    /// Marks an event dispatched. Marking twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty id, or the adapter's error.
    pub async fn set_event_to_dispatched(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(EventStoreError::InvalidArgument("event id is required".into()));
        }
        self.adapter.set_event_to_dispatched(id).await
    }

    /// Stores a caller-built snapshot.
    ///
    /// # Errors
    ///
    /// See [`SnapshotManager::add_snapshot`].
    pub async fn add_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.snapshots.add_snapshot(snapshot).await
    }

    /// Builds and stores a snapshot with a fresh id and stamp.
    ///
    /// # Errors
    ///
    /// See [`SnapshotManager::create_snapshot`].
    pub async fn create_snapshot(&self, params: NewSnapshot) -> Result<Snapshot> {
        self.snapshots.create_snapshot(params).await
    }

    /// Returns the preferred snapshot at or below `rev_max` (-1 for any).
    ///
    /// # Errors
    ///
    /// See [`SnapshotManager::get_snapshot`].
    pub async fn get_snapshot(&self, query: &StreamQuery, rev_max: i64) -> Result<Option<Snapshot>> {
        self.snapshots.get_snapshot(query, rev_max).await
    }

    /// Reads a whole stream, from revision 0 to the end.
    ///
    /// # Errors
    ///
    /// See [`StreamReader::get_events_by_revision`].
    pub async fn get_stream_events(&self, query: &StreamQuery) -> Result<Vec<Event>> {
        self.reader.get_events_by_revision(query, 0, UNBOUNDED).await
    }
}
