//! Mock `Publisher` implementations for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use eventvault_core::error::{EventStoreError, Result};
use eventvault_core::publisher::Publisher;

/// A publisher that records every payload it receives and always succeeds.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<serde_json::Value>>,
}

impl RecordingPublisher {
    /// Create an empty recording publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all payloads published so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn published(&self) -> Vec<serde_json::Value> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, payload: &serde_json::Value) -> Result<()> {
        self.published.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

/// A publisher that rejects every payload whose JSON matches `reject`, or
/// every payload when `reject` is `None`. Accepted payloads are recorded.
#[derive(Debug, Default)]
pub struct FailingPublisher {
    reject: Option<serde_json::Value>,
    published: Mutex<Vec<serde_json::Value>>,
}

impl FailingPublisher {
    /// A publisher that rejects everything.
    #[must_use]
    pub fn always() -> Self {
        Self::default()
    }

    /// A publisher that rejects only the given payload.
    #[must_use]
    pub fn rejecting(payload: serde_json::Value) -> Self {
        Self {
            reject: Some(payload),
            published: Mutex::new(Vec::new()),
        }
    }

    /// Returns the payloads that were accepted.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn published(&self) -> Vec<serde_json::Value> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for FailingPublisher {
    async fn publish(&self, payload: &serde_json::Value) -> Result<()> {
        match &self.reject {
            Some(rejected) if rejected != payload => {
                self.published.lock().unwrap().push(payload.clone());
                Ok(())
            }
            _ => Err(EventStoreError::Publish("broker unavailable".into())),
        }
    }
}
