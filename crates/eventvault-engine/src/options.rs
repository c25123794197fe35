//! Tuning knobs of an [`Eventstore`](crate::Eventstore).

use std::time::Duration;

use eventvault_core::event::EventMappings;

use crate::reader::RepairPolicy;

/// Options applied when an eventstore is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventstoreOptions {
    /// Interval between dispatcher polls.
    pub dispatch_interval: Duration,
    /// Upper bound on `StorageAdapter::connect` during `init`.
    pub connect_timeout: Duration,
    /// Events fetched per storage call on unbounded scans.
    pub page_size: usize,
    /// Snapshots kept per stream; `None` keeps all.
    pub max_snapshots_count: Option<usize>,
    /// Behaviour of reads that meet a partial commit without staging record.
    pub repair_policy: RepairPolicy,
    /// Commit metadata copied into event payloads.
    pub mappings: EventMappings,
}

impl Default for EventstoreOptions {
    fn default() -> Self {
        Self {
            dispatch_interval: Duration::from_millis(100),
            connect_timeout: Duration::from_secs(10),
            page_size: 1000,
            max_snapshots_count: None,
            repair_policy: RepairPolicy::default(),
            mappings: EventMappings::default(),
        }
    }
}
