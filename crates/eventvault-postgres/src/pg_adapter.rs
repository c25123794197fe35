//! `PostgreSQL` implementation of the `StorageAdapter` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use eventvault_core::error::{EventStoreError, Result};
use eventvault_core::event::Event;
use eventvault_core::query::{EventFilter, StreamQuery};
use eventvault_core::snapshot::Snapshot;
use eventvault_core::storage::StorageAdapter;
use eventvault_core::transaction::Transaction;

const EVENT_COLUMNS: &str = "SELECT id, aggregate_id, aggregate, context, stream_revision, \
     commit_id, commit_sequence, commit_stamp, rest_in_commit_stream, header, payload, dispatched \
     FROM events WHERE TRUE";

const SNAPSHOT_COLUMNS: &str = "SELECT id, aggregate_id, aggregate, context, revision, version, \
     commit_stamp, data FROM snapshots WHERE TRUE";

const REVISION_CONSTRAINT: &str = "events_stream_revision_key";

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    aggregate_id: String,
    aggregate: String,
    context: String,
    stream_revision: i64,
    commit_id: String,
    commit_sequence: i64,
    commit_stamp: DateTime<Utc>,
    rest_in_commit_stream: i64,
    header: Value,
    payload: Value,
    dispatched: bool,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id,
            aggregate_id: row.aggregate_id,
            aggregate: row.aggregate,
            context: row.context,
            stream_revision: row.stream_revision,
            commit_id: row.commit_id,
            commit_sequence: row.commit_sequence,
            commit_stamp: row.commit_stamp,
            rest_in_commit_stream: row.rest_in_commit_stream,
            header: row.header,
            payload: row.payload,
            dispatched: row.dispatched,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: String,
    aggregate_id: String,
    aggregate: String,
    context: String,
    revision: i64,
    version: i64,
    commit_stamp: DateTime<Utc>,
    data: Value,
}

impl From<SnapshotRow> for Snapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            id: row.id,
            aggregate_id: row.aggregate_id,
            aggregate: row.aggregate,
            context: row.context,
            revision: row.revision,
            version: row.version,
            commit_stamp: row.commit_stamp,
            data: row.data,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    commit_id: String,
    aggregate_id: String,
    aggregate: String,
    context: String,
    events: Json<Vec<Event>>,
}

fn push_scope(builder: &mut QueryBuilder<'_, Postgres>, query: &StreamQuery) {
    if let Some(aggregate_id) = &query.aggregate_id {
        builder.push(" AND aggregate_id = ").push_bind(aggregate_id.clone());
    }
    if let Some(aggregate) = &query.aggregate {
        builder.push(" AND aggregate = ").push_bind(aggregate.clone());
    }
    if let Some(context) = &query.context {
        builder.push(" AND context = ").push_bind(context.clone());
    }
}

fn to_i64(value: usize, what: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| EventStoreError::InvalidArgument(format!("{what} out of range")))
}

fn is_revision_conflict(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.constraint() == Some(REVISION_CONSTRAINT))
}

/// PostgreSQL-backed storage adapter. Batch inserts run in one database
/// transaction, so a batch is never half-written.
#[derive(Debug, Clone)]
pub struct PgAdapter {
    pool: PgPool,
}

impl PgAdapter {
    /// Creates a new `PgAdapter` over a connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StorageAdapter for PgAdapter {
    async fn connect(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(EventStoreError::storage)?;
        tracing::debug!("postgres adapter connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.pool.close().await;
        tracing::debug!("postgres adapter disconnected");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("TRUNCATE events, transactions, snapshots")
            .execute(&self.pool)
            .await
            .map_err(EventStoreError::storage)?;
        Ok(())
    }

    async fn get_new_id(&self) -> Result<String> {
        Ok(Uuid::new_v4().to_string())
    }

    async fn add_transaction(&self, transaction: &Transaction) -> Result<()> {
        sqlx::query(
            "INSERT INTO transactions (commit_id, aggregate_id, aggregate, context, events) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (commit_id) DO UPDATE SET events = EXCLUDED.events",
        )
        .bind(&transaction.commit_id)
        .bind(&transaction.aggregate_id)
        .bind(&transaction.aggregate)
        .bind(&transaction.context)
        .bind(Json(&transaction.events))
        .execute(&self.pool)
        .await
        .map_err(EventStoreError::storage)?;
        Ok(())
    }

    async fn get_transaction(&self, commit_id: &str) -> Result<Option<Transaction>> {
        let row: Option<TransactionRow> = sqlx::query_as(
            "SELECT commit_id, aggregate_id, aggregate, context, events \
             FROM transactions WHERE commit_id = $1",
        )
        .bind(commit_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(EventStoreError::storage)?;

        Ok(row.map(|row| Transaction {
            commit_id: row.commit_id,
            aggregate_id: row.aggregate_id,
            aggregate: row.aggregate,
            context: row.context,
            events: row.events.0,
        }))
    }

    async fn remove_transaction(&self, commit_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM transactions WHERE commit_id = $1")
            .bind(commit_id)
            .execute(&self.pool)
            .await
            .map_err(EventStoreError::storage)?;
        Ok(())
    }

    async fn insert_events(&self, events: &[Event]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(EventStoreError::storage)?;

        for event in events {
            let inserted = sqlx::query(
                "INSERT INTO events (id, aggregate_id, aggregate, context, stream_revision, \
                 commit_id, commit_sequence, commit_stamp, rest_in_commit_stream, header, payload, \
                 dispatched) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
                 ON CONFLICT (commit_id, commit_sequence) DO NOTHING",
            )
            .bind(&event.id)
            .bind(&event.aggregate_id)
            .bind(&event.aggregate)
            .bind(&event.context)
            .bind(event.stream_revision)
            .bind(&event.commit_id)
            .bind(event.commit_sequence)
            .bind(event.commit_stamp)
            .bind(event.rest_in_commit_stream)
            .bind(&event.header)
            .bind(&event.payload)
            .bind(event.dispatched)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => {}
                Err(err) if is_revision_conflict(&err) => {
                    return Err(EventStoreError::ConcurrencyConflict {
                        aggregate_id: event.aggregate_id.clone(),
                        revision: event.stream_revision,
                    });
                }
                Err(err) => return Err(EventStoreError::storage(err)),
            }
        }

        tx.commit().await.map_err(EventStoreError::storage)?;
        Ok(())
    }

    async fn find_events(
        &self,
        filter: &EventFilter,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Event>> {
        let mut builder = QueryBuilder::<Postgres>::new(EVENT_COLUMNS);
        push_scope(&mut builder, &filter.query);
        if let Some(rev_min) = filter.rev_min {
            builder.push(" AND stream_revision >= ").push_bind(rev_min);
        }
        if let Some(rev_max) = filter.rev_max {
            builder.push(" AND stream_revision < ").push_bind(rev_max);
        }
        if filter.undispatched_only {
            builder.push(" AND NOT dispatched");
        }
        builder.push(" ORDER BY commit_stamp, stream_revision, commit_sequence");
        if let Some(limit) = limit {
            builder.push(" LIMIT ").push_bind(to_i64(limit, "limit")?);
        }
        builder.push(" OFFSET ").push_bind(to_i64(skip, "skip")?);

        let rows: Vec<EventRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(EventStoreError::storage)?;
        Ok(rows.into_iter().map(Event::from).collect())
    }

    async fn find_last_event(&self, query: &StreamQuery) -> Result<Option<Event>> {
        let mut builder = QueryBuilder::<Postgres>::new(EVENT_COLUMNS);
        push_scope(&mut builder, query);
        builder.push(
            " ORDER BY commit_stamp DESC, stream_revision DESC, commit_sequence DESC LIMIT 1",
        );

        let row: Option<EventRow> = builder
            .build_query_as()
            .fetch_optional(&self.pool)
            .await
            .map_err(EventStoreError::storage)?;
        Ok(row.map(Event::from))
    }

    async fn set_event_to_dispatched(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE events SET dispatched = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(EventStoreError::storage)?;
        Ok(())
    }

    async fn add_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        sqlx::query(
            "INSERT INTO snapshots (id, aggregate_id, aggregate, context, revision, version, \
             commit_stamp, data) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&snapshot.id)
        .bind(&snapshot.aggregate_id)
        .bind(&snapshot.aggregate)
        .bind(&snapshot.context)
        .bind(snapshot.revision)
        .bind(snapshot.version)
        .bind(snapshot.commit_stamp)
        .bind(&snapshot.data)
        .execute(&self.pool)
        .await
        .map_err(EventStoreError::storage)?;
        Ok(())
    }

    async fn find_snapshot(
        &self,
        query: &StreamQuery,
        rev_max: Option<i64>,
    ) -> Result<Option<Snapshot>> {
        let mut builder = QueryBuilder::<Postgres>::new(SNAPSHOT_COLUMNS);
        push_scope(&mut builder, query);
        if let Some(rev_max) = rev_max {
            builder.push(" AND revision <= ").push_bind(rev_max);
        }
        builder.push(" ORDER BY revision DESC, version DESC, commit_stamp DESC LIMIT 1");

        let row: Option<SnapshotRow> = builder
            .build_query_as()
            .fetch_optional(&self.pool)
            .await
            .map_err(EventStoreError::storage)?;
        Ok(row.map(Snapshot::from))
    }

    async fn clean_snapshots(&self, query: &StreamQuery, keep: usize) -> Result<()> {
        let mut builder =
            QueryBuilder::<Postgres>::new("DELETE FROM snapshots WHERE id IN (SELECT id FROM snapshots WHERE TRUE");
        push_scope(&mut builder, query);
        builder
            .push(" ORDER BY revision DESC, version DESC, commit_stamp DESC OFFSET ")
            .push_bind(to_i64(keep, "keep")?)
            .push(")");

        let deleted = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(EventStoreError::storage)?;
        tracing::debug!(deleted = deleted.rows_affected(), "old snapshots pruned");
        Ok(())
    }
}
