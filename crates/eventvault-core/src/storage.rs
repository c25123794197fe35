//! Storage adapter abstraction.
//!
//! Every backend implements these primitives. The commit protocol, the
//! read-time repair and snapshot selection are built on top of them in the
//! engine, so backends never re-implement protocol semantics.

use async_trait::async_trait;

use crate::error::Result;
use crate::event::Event;
use crate::query::{EventFilter, StreamQuery};
use crate::snapshot::Snapshot;
use crate::transaction::Transaction;

/// Persistence primitives a storage backend provides.
///
/// Implementations own their state per instance and must be safe for
/// concurrent use; correctness across concurrent commits relies on the key
/// uniqueness enforced here rather than on locks in the caller.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Opens the backend (connections, schema). Called once at startup.
    async fn connect(&self) -> Result<()>;

    /// Releases backend resources.
    async fn disconnect(&self) -> Result<()>;

    /// Wipes every event, staging record and snapshot.
    async fn clear(&self) -> Result<()>;

    /// Returns a fresh unique id for commits and snapshots.
    async fn get_new_id(&self) -> Result<String>;

    /// Stores a staging record keyed by its commit id.
    async fn add_transaction(&self, transaction: &Transaction) -> Result<()>;

    /// Loads the staging record for a commit, if one exists.
    async fn get_transaction(&self, commit_id: &str) -> Result<Option<Transaction>>;

    /// Deletes the staging record for a commit. Deleting a missing record
    /// succeeds.
    async fn remove_transaction(&self, commit_id: &str) -> Result<()>;

    /// Inserts a batch of events.
    ///
    /// An event whose `(commit_id, commit_sequence)` already exists is
    /// skipped and counts as success. An event whose stream revision is
    /// already held by another commit fails the call with
    /// `EventStoreError::ConcurrencyConflict`.
    async fn insert_events(&self, events: &[Event]) -> Result<()>;

    /// Returns events matching `filter`, ordered by
    /// `(commit_stamp, stream_revision, commit_sequence)` ascending, after
    /// skipping `skip` of them and returning at most `limit` (`None` means
    /// unbounded).
    async fn find_events(
        &self,
        filter: &EventFilter,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Event>>;

    /// Returns the last event of a stream in read order.
    async fn find_last_event(&self, query: &StreamQuery) -> Result<Option<Event>>;

    /// Marks an event dispatched. Marking it again is a no-op.
    async fn set_event_to_dispatched(&self, id: &str) -> Result<()>;

    /// Stores a snapshot.
    async fn add_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    /// Returns the preferred snapshot with `revision <= rev_max` (any
    /// revision when `rev_max` is `None`), scoped by the query.
    async fn find_snapshot(&self, query: &StreamQuery, rev_max: Option<i64>)
    -> Result<Option<Snapshot>>;

    /// Deletes all but the `keep` preferred snapshots of a stream.
    async fn clean_snapshots(&self, query: &StreamQuery, keep: usize) -> Result<()>;
}
