//! Health check endpoint.

use axum::extract::State;
use axum::{Json, Router, routing::get};
use eventvault_engine::DispatcherState;
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Dispatcher state, absent when dispatch is disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatcher: Option<&'static str>,
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let dispatcher = state.eventstore.dispatcher().map(|d| match d.state() {
        DispatcherState::Idle => "idle",
        DispatcherState::Running => "running",
        DispatcherState::Stopped => "stopped",
    });
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        dispatcher,
    })
}

/// Returns the health check router.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
