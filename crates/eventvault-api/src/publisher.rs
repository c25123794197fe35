//! Publisher that writes dispatched events to the log.

use async_trait::async_trait;
use eventvault_core::error::Result;
use eventvault_core::publisher::Publisher;

/// Logs each dispatched payload at `info`. Stands in for a message broker.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPublisher;

#[async_trait]
impl Publisher for TracingPublisher {
    async fn publish(&self, payload: &serde_json::Value) -> Result<()> {
        tracing::info!(%payload, "event dispatched");
        Ok(())
    }
}
