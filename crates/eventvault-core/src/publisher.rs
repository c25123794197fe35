//! Publisher abstraction the dispatcher delivers committed events to.

use async_trait::async_trait;

use crate::error::Result;

/// Receives the payload of every committed event, at least once.
///
/// Return `EventStoreError::Publish` to signal a rejected delivery; the
/// event stays undispatched and is retried on a later poll.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes one event payload.
    async fn publish(&self, payload: &serde_json::Value) -> Result<()>;
}
