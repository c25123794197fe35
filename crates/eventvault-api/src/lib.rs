//! HTTP surface over the eventvault storage engine.

pub mod config;
pub mod error;
pub mod publisher;
pub mod routes;
pub mod state;
pub mod storage;

use axum::Router;

use crate::state::AppState;

/// Builds the application router. Layers (tracing, CORS) are added by the
/// binary.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/streams", routes::streams::router())
        .nest("/api/v1/events", routes::events::router())
        .with_state(state)
}
