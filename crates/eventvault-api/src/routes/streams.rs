//! Routes addressing a single stream.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use eventvault_core::event::Event;
use eventvault_core::query::{StreamQuery, UNBOUNDED};
use eventvault_core::snapshot::{NewSnapshot, Snapshot};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::state::AppState;

/// Stream scope plus optional revision bounds.
#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    /// Aggregate type.
    pub aggregate: Option<String>,
    /// Bounded context.
    pub context: Option<String>,
    /// Inclusive lower revision bound; defaults to 0.
    pub rev_min: Option<i64>,
    /// Exclusive upper revision bound; defaults to the end of the stream.
    pub rev_max: Option<i64>,
}

impl StreamParams {
    fn query(&self, aggregate_id: String) -> StreamQuery {
        StreamQuery {
            aggregate_id: Some(aggregate_id),
            aggregate: self.aggregate.clone(),
            context: self.context.clone(),
        }
    }
}

/// Body of a commit request.
#[derive(Debug, Deserialize)]
pub struct CommitRequest {
    /// Aggregate type.
    pub aggregate: Option<String>,
    /// Bounded context.
    pub context: Option<String>,
    /// Header attached to every event of the commit.
    #[serde(default)]
    pub header: Value,
    /// Event payloads; must be a JSON array.
    pub events: Value,
}

/// Body of a snapshot request.
#[derive(Debug, Deserialize)]
pub struct SnapshotRequest {
    /// Aggregate type.
    pub aggregate: Option<String>,
    /// Bounded context.
    pub context: Option<String>,
    /// Stream revision the snapshot was taken at.
    pub revision: i64,
    /// Format version of `data`.
    pub version: Option<i64>,
    /// Compacted state.
    pub data: Value,
}

/// GET /api/v1/streams/{aggregate_id}/events
async fn get_stream_events(
    State(state): State<AppState>,
    Path(aggregate_id): Path<String>,
    Query(params): Query<StreamParams>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let events = state
        .eventstore
        .get_events_by_revision(
            &params.query(aggregate_id),
            params.rev_min.unwrap_or(0),
            params.rev_max.unwrap_or(UNBOUNDED),
        )
        .await?;
    Ok(Json(events))
}

/// POST /api/v1/streams/{aggregate_id}/events
async fn commit_events(
    State(state): State<AppState>,
    Path(aggregate_id): Path<String>,
    Json(request): Json<CommitRequest>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let query = StreamQuery {
        aggregate_id: Some(aggregate_id),
        aggregate: request.aggregate,
        context: request.context,
    };
    let mut stream = state.eventstore.get_last_event_as_stream(&query).await?;
    stream.add_events_from_value_with_header(&request.header, request.events)?;

    let committed = stream.commit().await?.to_vec();
    tracing::debug!(
        aggregate_id = %stream.aggregate_id(),
        revision = stream.current_revision(),
        "events committed"
    );
    Ok(Json(committed))
}

/// GET /api/v1/streams/{aggregate_id}/last-event
async fn get_last_event(
    State(state): State<AppState>,
    Path(aggregate_id): Path<String>,
    Query(params): Query<StreamParams>,
) -> Result<Json<Option<Event>>, ApiError> {
    let event = state
        .eventstore
        .get_last_event(&params.query(aggregate_id))
        .await?;
    Ok(Json(event))
}

/// GET /api/v1/streams/{aggregate_id}/snapshot
async fn get_snapshot(
    State(state): State<AppState>,
    Path(aggregate_id): Path<String>,
    Query(params): Query<StreamParams>,
) -> Result<Json<Option<Snapshot>>, ApiError> {
    let snapshot = state
        .eventstore
        .get_snapshot(
            &params.query(aggregate_id),
            params.rev_max.unwrap_or(UNBOUNDED),
        )
        .await?;
    Ok(Json(snapshot))
}

/// POST /api/v1/streams/{aggregate_id}/snapshots
async fn create_snapshot(
    State(state): State<AppState>,
    Path(aggregate_id): Path<String>,
    Json(request): Json<SnapshotRequest>,
) -> Result<Json<Snapshot>, ApiError> {
    let snapshot = state
        .eventstore
        .create_snapshot(NewSnapshot {
            aggregate_id,
            aggregate: request.aggregate,
            context: request.context,
            revision: request.revision,
            version: request.version.unwrap_or(1),
            data: request.data,
        })
        .await?;
    Ok(Json(snapshot))
}

/// Returns the router for single-stream operations.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/{aggregate_id}/events",
            get(get_stream_events).post(commit_events),
        )
        .route("/{aggregate_id}/last-event", get(get_last_event))
        .route("/{aggregate_id}/snapshot", get(get_snapshot))
        .route("/{aggregate_id}/snapshots", post(create_snapshot))
}
