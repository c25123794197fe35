//! The commit protocol, stream reads with repair,
//! snapshots and at-least-once dispatch over any
//! [`StorageAdapter`](eventvault_core::storage::StorageAdapter).
//!
//! [`Eventstore`] is the entry point; [`InMemoryAdapter`] is a complete
//! adapter for tests and single-process use.

pub mod commit;
pub mod dispatcher;
pub mod eventstore;
pub mod memory;
pub mod notify;
pub mod options;
pub mod pages;
pub mod reader;
pub mod snapshot;
pub mod stream;

pub use commit::CommitCoordinator;
pub use dispatcher::{Dispatcher, DispatcherState, DrainReport, TickOutcome};
pub use eventstore::{Eventstore, EventstoreBuilder};
pub use memory::InMemoryAdapter;
pub use notify::{Notifications, StoreNotification};
pub use options::EventstoreOptions;
pub use pages::{EventPages, PageToken};
pub use reader::{RepairPolicy, StreamReader};
pub use snapshot::SnapshotManager;
pub use stream::EventStream;
