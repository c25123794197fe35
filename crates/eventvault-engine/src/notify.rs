//! Connection lifecycle notifications.

use std::sync::{Arc, PoisonError, RwLock};

/// Lifecycle change of the underlying storage connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreNotification {
    /// The adapter connected and the store is ready.
    Connected,
    /// The adapter was disconnected.
    Disconnected,
}

type Listener = Arc<dyn Fn(StoreNotification) + Send + Sync>;

/// Registry of lifecycle listeners, called synchronously in subscription
/// order.
#[derive(Clone, Default)]
pub struct Notifications {
    listeners: Arc<RwLock<Vec<Listener>>>,
}

impl std::fmt::Debug for Notifications {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("Notifications")
            .field("listeners", &count)
            .finish()
    }
}

impl Notifications {
    /// Registers a listener.
    pub fn subscribe(&self, listener: impl Fn(StoreNotification) + Send + Sync + 'static) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    /// Calls every listener with `notification`.
    pub fn emit(&self, notification: StoreNotification) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        tracing::debug!(?notification, listeners = listeners.len(), "store notification");
        for listener in listeners {
            listener(notification);
        }
    }
}
