//! Integration tests driving the eventstore facade end to end over the
//! in-memory adapter.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use eventvault_core::error::EventStoreError;
use eventvault_core::query::{StreamQuery, UNBOUNDED};
use eventvault_core::snapshot::NewSnapshot;
use eventvault_core::storage::StorageAdapter;
use eventvault_engine::{
    DrainReport, Eventstore, EventstoreOptions, InMemoryAdapter, RepairPolicy, StoreNotification,
    TickOutcome,
};
use eventvault_test_support::{FaultInjectingAdapter, RecordingPublisher, SteppingClock};
use serde_json::json;

fn clock() -> Arc<SteppingClock> {
    Arc::new(SteppingClock::new(
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        chrono::Duration::milliseconds(5),
    ))
}

fn store_over(adapter: Arc<dyn StorageAdapter>) -> Eventstore {
    Eventstore::builder(adapter).clock(clock()).build()
}

async fn commit_one_by_one(store: &Eventstore, aggregate_id: &str, count: i64) {
    let query = StreamQuery::stream(aggregate_id);
    for n in 0..count {
        let mut stream = store.get_last_event_as_stream(&query).await.unwrap();
        stream.add_event(json!({ "n": n }));
        stream.commit().await.unwrap();
    }
}

#[tokio::test]
async fn test_events_committed_individually_are_read_in_commit_order() {
    // Arrange
    let store = store_over(Arc::new(InMemoryAdapter::new()));
    commit_one_by_one(&store, "2", 4).await;

    // Act
    let events = store
        .get_events_by_revision(&StreamQuery::stream("2"), 0, UNBOUNDED)
        .await
        .unwrap();

    // Assert
    let revisions: Vec<i64> = events.iter().map(|e| e.stream_revision).collect();
    assert_eq!(revisions, vec![0, 1, 2, 3]);
    let payloads: Vec<_> = events.iter().map(|e| e.payload["n"].clone()).collect();
    assert_eq!(payloads, vec![json!(0), json!(1), json!(2), json!(3)]);
}

#[tokio::test]
async fn test_revision_range_is_half_open() {
    let store = store_over(Arc::new(InMemoryAdapter::new()));
    commit_one_by_one(&store, "r", 4).await;

    let events = store
        .get_events_by_revision(&StreamQuery::stream("r"), 1, 3)
        .await
        .unwrap();

    let revisions: Vec<i64> = events.iter().map(|e| e.stream_revision).collect();
    assert_eq!(revisions, vec![1, 2]);
}

#[tokio::test]
async fn test_reads_across_streams_are_ordered_by_stamp_revision_sequence() {
    // Arrange
    let store = store_over(Arc::new(InMemoryAdapter::new()));
    let mut a = store.new_event_stream(&StreamQuery::stream("a")).unwrap();
    a.add_events([json!(1), json!(2)]);
    a.commit().await.unwrap();
    let mut b = store.new_event_stream(&StreamQuery::stream("b")).unwrap();
    b.add_event(json!(3));
    b.commit().await.unwrap();
    a.add_event(json!(4));
    a.commit().await.unwrap();

    // Act
    let events = store.get_events(&StreamQuery::all(), 0, None).await.unwrap();

    // Assert
    assert_eq!(events.len(), 4);
    for pair in events.windows(2) {
        let key = |e: &eventvault_core::event::Event| {
            (e.commit_stamp, e.stream_revision, e.commit_sequence)
        };
        assert!(key(&pair[0]) <= key(&pair[1]));
    }
    let payloads: Vec<_> = events.iter().map(|e| e.payload.clone()).collect();
    assert_eq!(payloads, vec![json!(1), json!(2), json!(3), json!(4)]);
}

#[tokio::test]
async fn test_concurrent_handles_cannot_share_a_revision() {
    // Arrange
    let store = store_over(Arc::new(InMemoryAdapter::new()));
    let query = StreamQuery::stream("c");
    let mut first = store.new_event_stream(&query).unwrap();
    let mut second = store.new_event_stream(&query).unwrap();
    first.add_event(json!("first"));
    second.add_event(json!("second"));

    // Act
    first.commit().await.unwrap();
    let result = second.commit().await;

    // Assert
    assert!(matches!(
        result,
        Err(EventStoreError::ConcurrencyConflict { revision: 0, .. })
    ));
    assert_eq!(second.uncommitted_events().len(), 1);
    let events = store.get_stream_events(&query).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload, json!("first"));
}

#[tokio::test]
async fn test_interrupted_batch_is_completed_by_the_next_read() {
    // Arrange
    let memory = Arc::new(InMemoryAdapter::new());
    let faulty = Arc::new(FaultInjectingAdapter::new(memory.clone()));
    let store = store_over(faulty.clone());
    let query = StreamQuery::stream("X");
    let mut stream = store.new_event_stream(&query).unwrap();
    stream.add_events([json!("e0"), json!("e1"), json!("e2")]);
    faulty.crash_next_batch_after(2);

    // Act
    let commit = stream.commit().await;
    let events = store
        .get_events_by_revision(&query, 0, UNBOUNDED)
        .await
        .unwrap();

    // Assert
    assert!(matches!(commit, Err(EventStoreError::Storage(_))));
    assert_eq!(stream.uncommitted_events().len(), 3);
    let payloads: Vec<_> = events.iter().map(|e| e.payload.clone()).collect();
    assert_eq!(payloads, vec![json!("e0"), json!("e1"), json!("e2")]);
    let rest: Vec<i64> = events.iter().map(|e| e.rest_in_commit_stream).collect();
    assert_eq!(rest, vec![2, 1, 0]);
    assert!(
        memory
            .get_transaction(&events[0].commit_id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_offset_read_of_a_stream_also_repairs() {
    let memory = Arc::new(InMemoryAdapter::new());
    let faulty = Arc::new(FaultInjectingAdapter::new(memory.clone()));
    let store = store_over(faulty.clone());
    let query = StreamQuery::stream("X");
    let mut stream = store.new_event_stream(&query).unwrap();
    stream.add_events([json!(0), json!(1), json!(2)]);
    faulty.crash_next_batch_after(1);
    let _ = stream.commit().await;

    let events = store.get_events(&query, 0, None).await.unwrap();

    assert_eq!(events.len(), 3);
}

#[tokio::test]
async fn test_partial_commit_without_staging_record_follows_policy() {
    // Arrange
    let memory = Arc::new(InMemoryAdapter::new());
    let faulty = Arc::new(FaultInjectingAdapter::new(memory.clone()));
    let store = store_over(faulty.clone());
    let strict = Eventstore::builder(memory.clone())
        .options(EventstoreOptions {
            repair_policy: RepairPolicy::Fail,
            ..EventstoreOptions::default()
        })
        .build();
    let query = StreamQuery::stream("X");
    let mut stream = store.new_event_stream(&query).unwrap();
    stream.add_events([json!(0), json!(1), json!(2)]);
    faulty.crash_next_batch_after(2);
    let _ = stream.commit().await;
    let partial = memory.find_last_event(&query).await.unwrap().unwrap();
    memory.remove_transaction(&partial.commit_id).await.unwrap();

    // Act
    let lenient = store.get_events_by_revision(&query, 0, UNBOUNDED).await;
    let failing = strict.get_events_by_revision(&query, 0, UNBOUNDED).await;

    // Assert
    assert_eq!(lenient.unwrap().len(), 2);
    assert!(matches!(
        failing,
        Err(EventStoreError::MissingTransactionEntry { commit_id }) if commit_id == partial.commit_id
    ));
}

#[tokio::test]
async fn test_replaying_a_commit_does_not_duplicate_events() {
    // Arrange
    let store = store_over(Arc::new(InMemoryAdapter::new()));
    let query = StreamQuery::stream("i");
    let mut stream = store.new_event_stream(&query).unwrap();
    stream.add_events([json!(0), json!(1)]);
    let committed = stream.commit().await.unwrap().to_vec();

    // Act
    store.add_events(&committed).await.unwrap();
    store.add_events(&committed[..1]).await.unwrap();

    // Assert
    assert_eq!(store.get_stream_events(&query).await.unwrap(), committed);
}

#[tokio::test]
async fn test_snapshot_lookup_honours_revision_bound() {
    // Arrange
    let store = store_over(Arc::new(InMemoryAdapter::new()));
    for (revision, data) in [(1, "a"), (2, "b")] {
        store
            .create_snapshot(NewSnapshot {
                aggregate_id: "Y".into(),
                aggregate: None,
                context: None,
                revision,
                version: 1,
                data: json!(data),
            })
            .await
            .unwrap();
    }
    let query = StreamQuery::stream("Y");

    // Act
    let at_one = store.get_snapshot(&query, 1).await.unwrap().unwrap();
    let newest = store.get_snapshot(&query, UNBOUNDED).await.unwrap().unwrap();

    // Assert
    assert_eq!(at_one.data, json!("a"));
    assert_eq!(newest.data, json!("b"));
    assert_eq!(newest.revision, 2);
}

#[tokio::test]
async fn test_one_tick_publishes_and_marks_all_undispatched_events() {
    // Arrange
    let publisher = Arc::new(RecordingPublisher::new());
    let store = Eventstore::builder(Arc::new(InMemoryAdapter::new()))
        .clock(clock())
        .publisher(publisher.clone())
        .build();
    commit_one_by_one(&store, "d", 2).await;
    let dispatcher = store.dispatcher().unwrap();

    // Act
    let first = dispatcher.tick().await;
    let second = dispatcher.tick().await;

    // Assert
    assert_eq!(
        first,
        TickOutcome::Drained(DrainReport {
            published: 2,
            ..DrainReport::default()
        })
    );
    assert_eq!(publisher.published(), vec![json!({ "n": 0 }), json!({ "n": 1 })]);
    assert!(store.get_undispatched_events(None).await.unwrap().is_empty());
    assert_eq!(second, TickOutcome::Drained(DrainReport::default()));
}

#[tokio::test]
async fn test_started_dispatcher_delivers_backlog_and_new_commits() {
    // Arrange
    let adapter = Arc::new(InMemoryAdapter::new());
    let seeding = store_over(adapter.clone());
    commit_one_by_one(&seeding, "bg", 1).await;
    let publisher = Arc::new(RecordingPublisher::new());
    let store = Eventstore::builder(adapter)
        .clock(clock())
        .publisher(publisher.clone())
        .options(EventstoreOptions {
            dispatch_interval: Duration::from_millis(10),
            ..EventstoreOptions::default()
        })
        .build();

    // Act
    store.init().await.unwrap();
    commit_one_by_one(&store, "bg2", 1).await;
    let mut delivered = false;
    for _ in 0..200 {
        if store.get_undispatched_events(None).await.unwrap().is_empty() {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    store.close().await.unwrap();

    // Assert
    assert!(delivered);
    assert!(publisher.published().len() >= 2);
}

#[tokio::test]
async fn test_init_fails_when_connect_stalls() {
    // Arrange
    let faulty = Arc::new(FaultInjectingAdapter::new(Arc::new(InMemoryAdapter::new())));
    faulty.stall_connect(true);
    let store = Eventstore::builder(faulty)
        .options(EventstoreOptions {
            connect_timeout: Duration::from_millis(20),
            ..EventstoreOptions::default()
        })
        .build();

    // Act
    let result = store.init().await;

    // Assert
    assert!(matches!(
        result,
        Err(EventStoreError::ConnectTimeout(timeout)) if timeout == Duration::from_millis(20)
    ));
}

#[tokio::test]
async fn test_lifecycle_notifications_arrive_in_order() {
    // Arrange
    let store = store_over(Arc::new(InMemoryAdapter::new()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    store.subscribe(move |n| sink.lock().unwrap().push(n));

    // Act
    store.init().await.unwrap();
    store.close().await.unwrap();

    // Assert
    assert_eq!(
        *seen.lock().unwrap(),
        vec![StoreNotification::Connected, StoreNotification::Disconnected]
    );
}
