//! Staging records for multi-event commits.

use serde::{Deserialize, Serialize};

use crate::event::Event;

/// Durable record of a commit's full event batch, written before the events
/// themselves and removed once they are all stored. Its presence after a
/// crash signals that the commit may be partial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Commit the batch belongs to; the record's key.
    pub commit_id: String,
    /// Stream the commit targets.
    pub aggregate_id: String,
    /// Aggregate type name.
    pub aggregate: String,
    /// Bounded-context name.
    pub context: String,
    /// Every event of the commit, in commit sequence order.
    pub events: Vec<Event>,
}

impl Transaction {
    /// Stages a batch. The stream coordinates are taken from the first event.
    #[must_use]
    pub fn stage(commit_id: impl Into<String>, events: Vec<Event>) -> Self {
        let (aggregate_id, aggregate, context) = events
            .first()
            .map(|e| (e.aggregate_id.clone(), e.aggregate.clone(), e.context.clone()))
            .unwrap_or_default();
        Self {
            commit_id: commit_id.into(),
            aggregate_id,
            aggregate,
            context,
            events,
        }
    }

    /// The trailing `rest` events of the batch: the ones still missing when
    /// the last stored event reports `rest` pending events after it.
    #[must_use]
    pub fn missing_suffix(&self, rest: i64) -> &[Event] {
        let rest = usize::try_from(rest).unwrap_or(0).min(self.events.len());
        &self.events[self.events.len() - rest..]
    }
}
