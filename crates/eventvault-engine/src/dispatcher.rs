//! At-least-once delivery of committed events to a publisher.
//!
//! The dispatcher owns an in-memory FIFO of undispatched events. Producers
//! only append to it; a single drain at a time publishes each event and
//! then marks it dispatched in storage. The durable `dispatched` flag is the
//! source of truth, so any event whose publish or mark fails is picked up
//! again the next time the queue is reloaded from storage.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eventvault_core::error::Result;
use eventvault_core::event::Event;
use eventvault_core::publisher::Publisher;
use eventvault_core::query::EventFilter;
use eventvault_core::storage::StorageAdapter;
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::pages::EventPages;

/// Lifecycle state of a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// Waiting for the next tick.
    Idle,
    /// A drain is in progress.
    Running,
    /// Shut down; no further ticks are scheduled.
    Stopped,
}

/// Counters for one drain of the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Events the publisher accepted.
    pub published: usize,
    /// Events the publisher rejected.
    pub publish_failures: usize,
    /// Published events that could not be marked dispatched.
    pub mark_failures: usize,
}

/// Result of asking the dispatcher to tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another drain was in progress (or the dispatcher is stopped).
    Skipped,
    /// The queue was drained.
    Drained(DrainReport),
}

/// FIFO of pending events with an index of the ids it holds.
#[derive(Default)]
struct PendingQueue {
    events: VecDeque<Event>,
    ids: HashSet<String>,
}

impl PendingQueue {
    fn push(&mut self, event: Event) {
        if self.ids.insert(event.id.clone()) {
            self.events.push_back(event);
        }
    }

    fn pop(&mut self) -> Option<Event> {
        let event = self.events.pop_front()?;
        self.ids.remove(&event.id);
        Some(event)
    }
}

struct Inner {
    adapter: Arc<dyn StorageAdapter>,
    publisher: Arc<dyn Publisher>,
    interval: Duration,
    page_size: usize,
    queue: Mutex<PendingQueue>,
    running: AtomicBool,
    stopped: AtomicBool,
    wake: Notify,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Resets the single-flight flag even if the drain future is dropped.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Background loop delivering undispatched events to a publisher.
///
/// Cloning is cheap; clones share the same queue and worker.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("interval", &self.inner.interval)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher polling every `interval`. Storage loads read
    /// `page_size` events at a time.
    #[must_use]
    pub fn new(
        adapter: Arc<dyn StorageAdapter>,
        publisher: Arc<dyn Publisher>,
        interval: Duration,
        page_size: usize,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                adapter,
                publisher,
                interval,
                page_size,
                queue: Mutex::new(PendingQueue::default()),
                running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                wake: Notify::new(),
                shutdown,
                worker: Mutex::new(None),
            }),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> DispatcherState {
        if self.inner.stopped.load(Ordering::Acquire) {
            DispatcherState::Stopped
        } else if self.inner.running.load(Ordering::Acquire) {
            DispatcherState::Running
        } else {
            DispatcherState::Idle
        }
    }

    /// Number of events waiting in the queue.
    pub async fn queued(&self) -> usize {
        self.inner.queue.lock().await.events.len()
    }

    /// Appends undispatched events to the queue and wakes the worker.
    /// Events already queued (same id) are ignored.
    pub async fn enqueue(&self, events: impl IntoIterator<Item = Event>) {
        let mut queue = self.inner.queue.lock().await;
        for event in events {
            queue.push(event);
        }
        drop(queue);
        self.inner.wake.notify_one();
    }

    /// Loads every undispatched event from storage into the queue.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error if the scan fails.
    pub async fn load_undispatched(&self) -> Result<usize> {
        let events = EventPages::new(
            self.inner.adapter.clone(),
            EventFilter::undispatched(None),
            self.inner.page_size,
        )
        .collect_all()
        .await?;
        let loaded = events.len();
        self.enqueue(events).await;
        tracing::debug!(loaded, "loaded undispatched events");
        Ok(loaded)
    }

    /// Loads the backlog and spawns the polling worker. Starting an already
    /// started dispatcher is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error if the initial load fails.
    pub async fn start(&self) -> Result<()> {
        let mut worker = self.inner.worker.lock().await;
        if worker.is_some() || self.inner.stopped.load(Ordering::Acquire) {
            tracing::debug!("dispatcher already started");
            return Ok(());
        }
        self.load_undispatched().await?;

        let dispatcher = self.clone();
        let shutdown = self.inner.shutdown.subscribe();
        *worker = Some(tokio::spawn(dispatcher.run(shutdown)));
        tracing::info!(interval = ?self.inner.interval, "dispatcher started");
        Ok(())
    }

    /// Stops the worker and waits for an in-flight drain to finish.
    pub async fn shutdown(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.shutdown.send_replace(true);
        let worker = self.inner.worker.lock().await.take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                tracing::warn!(error = %err, "dispatcher worker ended abnormally");
            }
        }
        tracing::info!("dispatcher stopped");
    }

    /// Runs one drain unless another is in progress.
    ///
    /// A drain that starts with an empty queue first reloads undispatched
    /// events from storage, so failed deliveries are retried on the next poll.
    pub async fn tick(&self) -> TickOutcome {
        if self.inner.stopped.load(Ordering::Acquire) {
            return TickOutcome::Skipped;
        }
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("previous drain still running; tick skipped");
            return TickOutcome::Skipped;
        }
        let _guard = RunningGuard(&self.inner.running);

        if self.queued().await == 0 {
            if let Err(err) = self.load_undispatched().await {
                tracing::warn!(error = %err, "reloading undispatched events failed");
            }
        }
        TickOutcome::Drained(self.drain().await)
    }

    async fn drain(&self) -> DrainReport {
        let mut report = DrainReport::default();
        loop {
            let next = self.inner.queue.lock().await.pop();
            let Some(event) = next else {
                break;
            };

            if let Err(err) = self.inner.publisher.publish(&event.payload).await {
                tracing::warn!(event_id = %event.id, error = %err, "publish failed; event stays undispatched");
                report.publish_failures += 1;
                continue;
            }
            report.published += 1;

            if let Err(err) = self.inner.adapter.set_event_to_dispatched(&event.id).await {
                tracing::warn!(event_id = %event.id, error = %err, "marking event dispatched failed");
                report.mark_failures += 1;
            }
        }
        if report != DrainReport::default() {
            tracing::debug!(?report, "dispatch drain finished");
        }
        report
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.inner.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
                () = self.inner.wake.notified() => {}
            }
            self.tick().await;
        }
    }
}
