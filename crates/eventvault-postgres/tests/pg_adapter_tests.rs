//! Integration tests for `PgAdapter`.
//!
//! These need a `PostgreSQL` server reachable through `DATABASE_URL`; run
//! them with `cargo test -- --ignored`.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use eventvault_core::error::EventStoreError;
use eventvault_core::event::{DEFAULT_SCOPE, Event};
use eventvault_core::query::{EventFilter, StreamQuery, UNBOUNDED};
use eventvault_core::snapshot::Snapshot;
use eventvault_core::storage::StorageAdapter;
use eventvault_core::transaction::Transaction;
use eventvault_engine::Eventstore;
use eventvault_postgres::PgAdapter;
use sqlx::PgPool;

fn stamp(second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, second).unwrap()
}

/// Helper to build an `Event` with sensible defaults.
fn make_event(aggregate_id: &str, revision: i64, commit_id: &str, sequence: i64, rest: i64) -> Event {
    Event {
        id: Event::id_for(commit_id, sequence),
        aggregate_id: aggregate_id.to_string(),
        aggregate: DEFAULT_SCOPE.to_string(),
        context: DEFAULT_SCOPE.to_string(),
        stream_revision: revision,
        commit_id: commit_id.to_string(),
        commit_sequence: sequence,
        commit_stamp: stamp(0),
        rest_in_commit_stream: rest,
        header: serde_json::Value::Null,
        payload: serde_json::json!({ "revision": revision }),
        dispatched: false,
    }
}

fn make_snapshot(id: &str, revision: i64, data: &str) -> Snapshot {
    Snapshot {
        id: id.to_string(),
        aggregate_id: "Y".to_string(),
        aggregate: DEFAULT_SCOPE.to_string(),
        context: DEFAULT_SCOPE.to_string(),
        revision,
        version: 1,
        commit_stamp: stamp(0),
        data: serde_json::json!(data),
    }
}

async fn connected(pool: PgPool) -> PgAdapter {
    let adapter = PgAdapter::new(pool);
    adapter.connect().await.unwrap();
    adapter
}

// --- insert_events + find_events ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn test_insert_and_find_round_trip(pool: PgPool) {
    let adapter = connected(pool).await;
    let events = vec![make_event("a", 0, "c1", 0, 1), make_event("a", 1, "c1", 1, 0)];

    adapter.insert_events(&events).await.unwrap();

    let loaded = adapter
        .find_events(&EventFilter::for_query(StreamQuery::stream("a")), 0, None)
        .await
        .unwrap();
    assert_eq!(loaded, events);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn test_reinserting_commit_key_is_a_noop(pool: PgPool) {
    let adapter = connected(pool).await;
    let event = make_event("a", 0, "c1", 0, 0);

    adapter.insert_events(&[event.clone()]).await.unwrap();
    adapter.insert_events(&[event]).await.unwrap();

    let loaded = adapter
        .find_events(&EventFilter::for_query(StreamQuery::stream("a")), 0, None)
        .await
        .unwrap();
    assert_eq!(loaded.len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn test_revision_clash_is_a_concurrency_conflict(pool: PgPool) {
    let adapter = connected(pool).await;
    adapter
        .insert_events(&[make_event("a", 0, "c1", 0, 0)])
        .await
        .unwrap();

    let result = adapter.insert_events(&[make_event("a", 0, "c2", 0, 0)]).await;

    assert!(matches!(
        result,
        Err(EventStoreError::ConcurrencyConflict { revision: 0, .. })
    ));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn test_find_events_applies_range_skip_and_limit(pool: PgPool) {
    let adapter = connected(pool).await;
    for revision in 0..4 {
        let commit_id = format!("c{revision}");
        adapter
            .insert_events(&[make_event("r", revision, &commit_id, 0, 0)])
            .await
            .unwrap();
    }

    let range = adapter
        .find_events(
            &EventFilter::revision_range(StreamQuery::stream("r"), 1, 3),
            0,
            None,
        )
        .await
        .unwrap();
    let page = adapter
        .find_events(&EventFilter::for_query(StreamQuery::stream("r")), 1, Some(2))
        .await
        .unwrap();

    let revisions = |events: &[Event]| events.iter().map(|e| e.stream_revision).collect::<Vec<_>>();
    assert_eq!(revisions(&range), vec![1, 2]);
    assert_eq!(revisions(&page), vec![1, 2]);
}

// --- dispatch flag ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn test_set_event_to_dispatched_is_idempotent(pool: PgPool) {
    let adapter = connected(pool).await;
    let event = make_event("d", 0, "c1", 0, 0);
    adapter.insert_events(&[event.clone()]).await.unwrap();

    adapter.set_event_to_dispatched(&event.id).await.unwrap();
    adapter.set_event_to_dispatched(&event.id).await.unwrap();

    let undispatched = adapter
        .find_events(&EventFilter::undispatched(None), 0, None)
        .await
        .unwrap();
    assert!(undispatched.is_empty());
}

// --- staging records ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn test_transaction_round_trip_and_removal(pool: PgPool) {
    let adapter = connected(pool).await;
    let events = vec![make_event("t", 0, "c1", 0, 1), make_event("t", 1, "c1", 1, 0)];
    let staged = Transaction::stage("c1", events);

    adapter.add_transaction(&staged).await.unwrap();
    let loaded = adapter.get_transaction("c1").await.unwrap();
    adapter.remove_transaction("c1").await.unwrap();

    assert_eq!(loaded, Some(staged));
    assert!(adapter.get_transaction("c1").await.unwrap().is_none());
}

// --- snapshots ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn test_find_snapshot_honours_revision_bound(pool: PgPool) {
    let adapter = connected(pool).await;
    adapter.add_snapshot(&make_snapshot("s1", 1, "a")).await.unwrap();
    adapter.add_snapshot(&make_snapshot("s2", 2, "b")).await.unwrap();
    let query = StreamQuery::stream("Y");

    let at_one = adapter.find_snapshot(&query, Some(1)).await.unwrap().unwrap();
    let newest = adapter.find_snapshot(&query, None).await.unwrap().unwrap();

    assert_eq!(at_one.data, serde_json::json!("a"));
    assert_eq!(newest.data, serde_json::json!("b"));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn test_clean_snapshots_keeps_newest(pool: PgPool) {
    let adapter = connected(pool).await;
    for (id, revision) in [("s1", 1), ("s2", 2), ("s3", 3)] {
        adapter.add_snapshot(&make_snapshot(id, revision, id)).await.unwrap();
    }
    let query = StreamQuery::stream("Y");

    adapter.clean_snapshots(&query, 2).await.unwrap();

    assert!(adapter.find_snapshot(&query, Some(1)).await.unwrap().is_none());
    assert_eq!(
        adapter.find_snapshot(&query, None).await.unwrap().unwrap().id,
        "s3"
    );
}

// --- through the eventstore ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn test_eventstore_commits_and_reads_over_postgres(pool: PgPool) {
    let store = Eventstore::builder(Arc::new(PgAdapter::new(pool))).build();
    store.init().await.unwrap();
    let query = StreamQuery::stream("2");

    let mut stream = store.new_event_stream(&query).unwrap();
    stream.add_events((0..3).map(|n| serde_json::json!({ "n": n })));
    stream.commit().await.unwrap();
    let events = store
        .get_events_by_revision(&query, 0, UNBOUNDED)
        .await
        .unwrap();

    assert_eq!(events.len(), 3);
    assert_eq!(store.get_undispatched_events(None).await.unwrap().len(), 3);
}
