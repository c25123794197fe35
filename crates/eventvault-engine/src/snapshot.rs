//! Snapshot storage and selection.

use std::sync::Arc;

use eventvault_core::clock::Clock;
use eventvault_core::error::{EventStoreError, Result};
use eventvault_core::event::DEFAULT_SCOPE;
use eventvault_core::query::{StreamQuery, UNBOUNDED};
use eventvault_core::snapshot::{NewSnapshot, Snapshot};
use eventvault_core::storage::StorageAdapter;

/// Stores snapshots and finds the one to rebuild a stream from.
#[derive(Clone)]
pub struct SnapshotManager {
    adapter: Arc<dyn StorageAdapter>,
    clock: Arc<dyn Clock>,
    max_snapshots_count: Option<usize>,
}

impl std::fmt::Debug for SnapshotManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotManager")
            .field("max_snapshots_count", &self.max_snapshots_count)
            .finish_non_exhaustive()
    }
}

impl SnapshotManager {
    /// Creates a manager. With `max_snapshots_count` set, only that many
    /// newest snapshots of a stream are kept after each store.
    #[must_use]
    pub fn new(
        adapter: Arc<dyn StorageAdapter>,
        clock: Arc<dyn Clock>,
        max_snapshots_count: Option<usize>,
    ) -> Self {
        Self {
            adapter,
            clock,
            max_snapshots_count,
        }
    }

    /// Persists a snapshot. Revision monotonicity is not enforced.
    ///
    /// # Errors
    ///
    /// Returns `MissingAggregateId` before any I/O if the snapshot has no
    /// aggregate id, or the adapter's error if the write fails.
    pub async fn add_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        if snapshot.aggregate_id.is_empty() {
            return Err(EventStoreError::MissingAggregateId);
        }
        self.adapter.add_snapshot(snapshot).await?;
        tracing::debug!(
            aggregate_id = %snapshot.aggregate_id,
            revision = snapshot.revision,
            "snapshot stored"
        );

        if let Some(keep) = self.max_snapshots_count {
            let scope = StreamQuery::stream(snapshot.aggregate_id.clone())
                .with_aggregate(snapshot.aggregate.clone())
                .with_context(snapshot.context.clone());
            if let Err(err) = self.adapter.clean_snapshots(&scope, keep.max(1)).await {
                tracing::warn!(aggregate_id = %snapshot.aggregate_id, error = %err, "pruning snapshots failed");
            }
        }
        Ok(())
    }

    /// Builds a snapshot with a fresh id and the current time, and stores it.
    ///
    /// # Errors
    ///
    /// Returns `MissingAggregateId` before any I/O if no aggregate id is
    /// given, or the adapter's error.
    pub async fn create_snapshot(&self, params: NewSnapshot) -> Result<Snapshot> {
        if params.aggregate_id.is_empty() {
            return Err(EventStoreError::MissingAggregateId);
        }
        let snapshot = Snapshot {
            id: self.adapter.get_new_id().await?,
            aggregate_id: params.aggregate_id,
            aggregate: params.aggregate.unwrap_or_else(|| DEFAULT_SCOPE.into()),
            context: params.context.unwrap_or_else(|| DEFAULT_SCOPE.into()),
            revision: params.revision,
            version: params.version,
            commit_stamp: self.clock.now(),
            data: params.data,
        };
        self.add_snapshot(&snapshot).await?;
        Ok(snapshot)
    }

    /// Returns the snapshot with the greatest revision `<= rev_max` (any
    /// revision when `rev_max` is -1), ties broken by version then stamp.
    /// Returns `None` when no snapshot qualifies.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` without an aggregate id, or the adapter's
    /// error.
    pub async fn get_snapshot(&self, query: &StreamQuery, rev_max: i64) -> Result<Option<Snapshot>> {
        query.require_aggregate_id()?;
        let bound = (rev_max != UNBOUNDED).then_some(rev_max);
        self.adapter.find_snapshot(query, bound).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use eventvault_test_support::SteppingClock;
    use serde_json::json;

    use super::*;
    use crate::memory::InMemoryAdapter;

    fn manager(max: Option<usize>) -> SnapshotManager {
        let clock = SteppingClock::new(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
            Duration::seconds(1),
        );
        SnapshotManager::new(Arc::new(InMemoryAdapter::new()), Arc::new(clock), max)
    }

    fn params(revision: i64, version: i64, data: &str) -> NewSnapshot {
        NewSnapshot {
            aggregate_id: "Y".into(),
            aggregate: None,
            context: None,
            revision,
            version,
            data: json!(data),
        }
    }

    #[tokio::test]
    async fn test_get_snapshot_selects_greatest_revision_at_or_below_bound() {
        // Arrange
        let snapshots = manager(None);
        snapshots.create_snapshot(params(1, 1, "a")).await.unwrap();
        snapshots.create_snapshot(params(2, 1, "b")).await.unwrap();

        // Act
        let at_one = snapshots
            .get_snapshot(&StreamQuery::stream("Y"), 1)
            .await
            .unwrap();
        let latest = snapshots
            .get_snapshot(&StreamQuery::stream("Y"), UNBOUNDED)
            .await
            .unwrap();

        // Assert
        assert_eq!(at_one.unwrap().data, json!("a"));
        assert_eq!(latest.unwrap().data, json!("b"));
    }

    #[tokio::test]
    async fn test_ties_on_revision_prefer_higher_version_then_later_stamp() {
        let snapshots = manager(None);
        snapshots.create_snapshot(params(3, 2, "v2")).await.unwrap();
        snapshots.create_snapshot(params(3, 1, "v1-late")).await.unwrap();
        snapshots.create_snapshot(params(3, 2, "v2-late")).await.unwrap();

        let chosen = snapshots
            .get_snapshot(&StreamQuery::stream("Y"), UNBOUNDED)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(chosen.data, json!("v2-late"));
    }

    #[tokio::test]
    async fn test_no_qualifying_snapshot_is_none() {
        let snapshots = manager(None);
        snapshots.create_snapshot(params(5, 1, "late")).await.unwrap();

        let found = snapshots
            .get_snapshot(&StreamQuery::stream("Y"), 4)
            .await
            .unwrap();

        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_without_aggregate_id_is_rejected() {
        let snapshots = manager(None);
        let mut missing = params(1, 1, "a");
        missing.aggregate_id = String::new();

        let result = snapshots.create_snapshot(missing).await;

        assert!(matches!(result, Err(EventStoreError::MissingAggregateId)));
    }

    #[tokio::test]
    async fn test_scope_isolates_contexts() {
        let snapshots = manager(None);
        let mut billing = params(1, 1, "billing");
        billing.context = Some("billing".into());
        snapshots.create_snapshot(billing).await.unwrap();

        let sales = snapshots
            .get_snapshot(&StreamQuery::stream("Y").with_context("sales"), UNBOUNDED)
            .await
            .unwrap();
        let any = snapshots
            .get_snapshot(&StreamQuery::stream("Y"), UNBOUNDED)
            .await
            .unwrap();

        assert!(sales.is_none());
        assert_eq!(any.unwrap().context, "billing");
    }

    #[tokio::test]
    async fn test_pruning_keeps_only_newest_snapshots() {
        // Arrange
        let snapshots = manager(Some(1));
        snapshots.create_snapshot(params(1, 1, "a")).await.unwrap();

        // Act
        snapshots.create_snapshot(params(2, 1, "b")).await.unwrap();

        // Assert
        let old = snapshots
            .get_snapshot(&StreamQuery::stream("Y"), 1)
            .await
            .unwrap();
        assert!(old.is_none());
    }
}
