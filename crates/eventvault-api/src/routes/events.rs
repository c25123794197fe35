//! Routes over the whole event log.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use eventvault_core::event::Event;
use eventvault_core::query::StreamQuery;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// Offset paging over all streams, optionally scoped.
#[derive(Debug, Default, Deserialize)]
pub struct EventListParams {
    /// Aggregate type.
    pub aggregate: Option<String>,
    /// Bounded context.
    pub context: Option<String>,
    /// Events to skip.
    pub skip: Option<usize>,
    /// Maximum number of events; unbounded when absent.
    pub limit: Option<usize>,
}

/// Response of the mark-dispatched endpoint.
#[derive(Debug, Serialize)]
pub struct DispatchedResponse {
    /// Id of the marked event.
    pub id: String,
    /// Always `true`.
    pub dispatched: bool,
}

/// GET /api/v1/events
async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<EventListParams>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let query = StreamQuery {
        aggregate_id: None,
        aggregate: params.aggregate,
        context: params.context,
    };
    let events = state
        .eventstore
        .get_events(&query, params.skip.unwrap_or(0), params.limit)
        .await?;
    Ok(Json(events))
}

/// GET /api/v1/events/undispatched
async fn list_undispatched(State(state): State<AppState>) -> Result<Json<Vec<Event>>, ApiError> {
    let events = state.eventstore.get_undispatched_events(None).await?;
    Ok(Json(events))
}

/// POST /api/v1/events/{id}/dispatched
async fn mark_dispatched(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DispatchedResponse>, ApiError> {
    state.eventstore.set_event_to_dispatched(&id).await?;
    Ok(Json(DispatchedResponse {
        id,
        dispatched: true,
    }))
}

/// Returns the router for log-wide operations.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_events))
        .route("/undispatched", get(list_undispatched))
        .route("/{id}/dispatched", post(mark_dispatched))
}
