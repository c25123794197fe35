//! Shared application state.

use std::sync::Arc;

use eventvault_engine::Eventstore;

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The eventstore serving every route.
    pub eventstore: Arc<Eventstore>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(eventstore: Arc<Eventstore>) -> Self {
        Self { eventstore }
    }
}
