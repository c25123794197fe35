//! Revision-bounded stream reads with read-time repair of partial commits.

use std::sync::Arc;

use eventvault_core::error::{EventStoreError, Result};
use eventvault_core::event::Event;
use eventvault_core::query::{EventFilter, StreamQuery, UNBOUNDED};
use eventvault_core::storage::StorageAdapter;
use serde::{Deserialize, Serialize};

use crate::pages::{EventPages, PageToken};

/// What a read does when it finds a partial commit whose staging record is
/// gone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairPolicy {
    /// Log and return the events that are present.
    #[default]
    ReturnPartial,
    /// Fail the read with `EventStoreError::MissingTransactionEntry`.
    Fail,
}

/// Resolves stream reads, completing partial commits it detects.
#[derive(Clone)]
pub struct StreamReader {
    adapter: Arc<dyn StorageAdapter>,
    policy: RepairPolicy,
    page_size: usize,
}

impl std::fmt::Debug for StreamReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReader")
            .field("policy", &self.policy)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl StreamReader {
    /// Creates a reader. `page_size` bounds each storage call of unbounded
    /// scans.
    #[must_use]
    pub fn new(adapter: Arc<dyn StorageAdapter>, policy: RepairPolicy, page_size: usize) -> Self {
        Self {
            adapter,
            policy,
            page_size,
        }
    }

    /// Returns events matching `query` in read order, skipping `skip` and
    /// returning at most `limit` (`None` means unbounded).
    ///
    /// Single-stream reads that reach the end of the stream run the partial
    /// commit check on their last event.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error, or `MissingTransactionEntry` under
    /// `RepairPolicy::Fail`.
    pub async fn get_events(
        &self,
        query: &StreamQuery,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Event>> {
        let filter = EventFilter::for_query(query.clone());
        let mut repaired = false;
        loop {
            let events = self.scan(&filter, skip, limit).await?;
            let reached_end = limit.is_none_or(|limit| events.len() < limit);
            if query.aggregate_id.is_none() || !reached_end {
                return Ok(events);
            }
            let Some(last) = events.last() else {
                return Ok(events);
            };
            if last.closes_commit() {
                self.discard_staging(last).await;
                return Ok(events);
            }
            if repaired || !self.repair(last).await? {
                return Ok(events);
            }
            repaired = true;
        }
    }

    /// Returns the events of one stream with revisions in
    /// `[rev_min, rev_max)`, `rev_max` equal to -1 meaning "to the end",
    /// in read order.
    ///
    /// If the last event belongs to a commit that is not complete, the
    /// missing events are restored from the commit's staging record and the
    /// read is run again.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` without an aggregate id, the adapter's
    /// error, or `MissingTransactionEntry` under `RepairPolicy::Fail`.
    pub async fn get_events_by_revision(
        &self,
        query: &StreamQuery,
        rev_min: i64,
        rev_max: i64,
    ) -> Result<Vec<Event>> {
        query.require_aggregate_id()?;
        let filter = EventFilter::revision_range(query.clone(), rev_min, rev_max);
        let mut repaired = false;
        loop {
            let events = self.scan(&filter, 0, None).await?;
            let Some(last) = events.last() else {
                return Ok(events);
            };

            if last.closes_commit() {
                self.discard_staging(last).await;
                return Ok(events);
            }
            if rev_max != UNBOUNDED && last.stream_revision == rev_max - 1 {
                // The range ends inside a commit; later events are out of range.
                return Ok(events);
            }
            if repaired || !self.repair(last).await? {
                return Ok(events);
            }
            repaired = true;
        }
    }

    /// Returns the last event of a stream in read order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` without an aggregate id, or the adapter's
    /// error.
    pub async fn get_last_event(&self, query: &StreamQuery) -> Result<Option<Event>> {
        query.require_aggregate_id()?;
        self.adapter.find_last_event(query).await
    }

    /// Returns every undispatched event in read order, optionally scoped.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error.
    pub async fn get_undispatched_events(&self, query: Option<&StreamQuery>) -> Result<Vec<Event>> {
        EventPages::new(
            self.adapter.clone(),
            EventFilter::undispatched(query.cloned()),
            self.page_size,
        )
        .collect_all()
        .await
    }

    async fn scan(&self, filter: &EventFilter, skip: usize, limit: Option<usize>) -> Result<Vec<Event>> {
        match limit {
            Some(limit) => self.adapter.find_events(filter, skip, Some(limit)).await,
            None => {
                let start = PageToken { skip };
                EventPages::resume(self.adapter.clone(), filter.clone(), self.page_size, start)
                    .collect_all()
                    .await
            }
        }
    }

    /// Completes the commit `last` belongs to. Returns `false` when the
    /// staging record is gone and the policy allows a partial result.
    async fn repair(&self, last: &Event) -> Result<bool> {
        let commit_id = &last.commit_id;
        let Some(transaction) = self.adapter.get_transaction(commit_id).await? else {
            return match self.policy {
                RepairPolicy::ReturnPartial => {
                    tracing::warn!(
                        %commit_id,
                        missing = last.rest_in_commit_stream,
                        "partial commit has no staging record; returning partial stream"
                    );
                    Ok(false)
                }
                RepairPolicy::Fail => Err(EventStoreError::MissingTransactionEntry {
                    commit_id: commit_id.clone(),
                }),
            };
        };

        let missing = transaction.missing_suffix(last.rest_in_commit_stream);
        self.adapter.insert_events(missing).await?;
        if let Err(err) = self.adapter.remove_transaction(commit_id).await {
            tracing::warn!(%commit_id, error = %err, "removing staging record after repair failed");
        }
        tracing::info!(%commit_id, restored = missing.len(), "repaired partial commit");
        Ok(true)
    }

    /// Drops the staging record of a completed multi-event commit, if one
    /// was left behind.
    async fn discard_staging(&self, last: &Event) {
        if last.commit_sequence == 0 {
            return;
        }
        if let Err(err) = self.adapter.remove_transaction(&last.commit_id).await {
            tracing::debug!(commit_id = %last.commit_id, error = %err, "staging cleanup failed");
        }
    }
}
