//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use eventvault_api::build_router;
use eventvault_api::state::AppState;
use eventvault_core::clock::Clock;
use eventvault_engine::{Eventstore, EventstoreOptions, InMemoryAdapter};
use eventvault_test_support::{FixedClock, RecordingPublisher};
use http_body_util::BodyExt;
use tower::ServiceExt;

/// Fixed timestamp used across all integration tests.
fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 15, 10, 0, 0).unwrap(),
    ))
}

/// An eventstore over a fresh in-memory adapter with a deterministic clock.
pub fn test_eventstore() -> Arc<Eventstore> {
    Arc::new(
        Eventstore::builder(Arc::new(InMemoryAdapter::new()))
            .clock(fixed_clock())
            .build(),
    )
}

/// An eventstore with a dispatcher delivering to `publisher`. The
/// dispatcher is not started, so tests drive it with `tick`.
pub fn test_eventstore_with_publisher(publisher: Arc<RecordingPublisher>) -> Arc<Eventstore> {
    Arc::new(
        Eventstore::builder(Arc::new(InMemoryAdapter::new()))
            .clock(fixed_clock())
            .publisher(publisher)
            .options(EventstoreOptions::default())
            .build(),
    )
}

/// Build the full app router over `eventstore`, as `main.rs` does.
pub fn build_test_app(eventstore: Arc<Eventstore>) -> Router {
    build_router(AppState::new(eventstore))
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
