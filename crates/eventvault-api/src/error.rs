//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use eventvault_core::error::EventStoreError;
use serde::Serialize;
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The eventstore failed to start or stop.
    #[error("eventstore error: {0}")]
    Store(#[from] EventStoreError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `EventStoreError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub EventStoreError);

impl From<EventStoreError> for ApiError {
    fn from(err: EventStoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            EventStoreError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
            EventStoreError::MissingAggregateId => {
                (StatusCode::BAD_REQUEST, "missing_aggregate_id")
            }
            EventStoreError::ConcurrencyConflict { .. } => {
                (StatusCode::CONFLICT, "concurrency_conflict")
            }
            EventStoreError::MissingTransactionEntry { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "missing_transaction_entry")
            }
            EventStoreError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            EventStoreError::Publish(_) => (StatusCode::INTERNAL_SERVER_ERROR, "publish_error"),
            EventStoreError::ConnectTimeout(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "connect_timeout")
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        let body = ErrorBody {
            error: error_code,
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn status_of(err: EventStoreError) -> StatusCode {
        let response = ApiError(err).into_response();
        response.status()
    }

    #[test]
    fn test_argument_errors_map_to_400() {
        assert_eq!(
            status_of(EventStoreError::InvalidArgument("bad input".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(EventStoreError::MissingAggregateId),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_concurrency_conflict_maps_to_409() {
        assert_eq!(
            status_of(EventStoreError::ConcurrencyConflict {
                aggregate_id: "a".into(),
                revision: 3,
            }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_storage_and_publish_map_to_500() {
        assert_eq!(
            status_of(EventStoreError::Storage("db down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(EventStoreError::Publish("broker down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(EventStoreError::MissingTransactionEntry {
                commit_id: "c".into()
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_connect_timeout_maps_to_503() {
        assert_eq!(
            status_of(EventStoreError::ConnectTimeout(Duration::from_secs(1))),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
