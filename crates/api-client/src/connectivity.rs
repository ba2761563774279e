//! Connectivity detection

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Reports whether the device can reach the network.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Current connectivity
    async fn is_connected(&self) -> bool;

    /// Receiver notified on every connectivity change
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Connectivity state fed by the platform's network listener.
///
/// Clones share state; every clone observes and can publish changes.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    state: Arc<watch::Sender<bool>>,
}

impl NetworkMonitor {
    /// Create a monitor with an initial state
    #[must_use]
    pub fn new(connected: bool) -> Self {
        let (state, _) = watch::channel(connected);
        Self {
            state: Arc::new(state),
        }
    }

    /// Monitor that starts online
    #[must_use]
    pub fn online() -> Self {
        Self::new(true)
    }

    /// Monitor that starts offline
    #[must_use]
    pub fn offline() -> Self {
        Self::new(false)
    }

    /// Publish a connectivity change; repeated values do not notify
    pub fn set_connected(&self, connected: bool) {
        let changed = self.state.send_if_modified(|current| {
            if *current == connected {
                false
            } else {
                *current = connected;
                true
            }
        });
        if changed {
            info!(connected = connected, "Connectivity changed");
        }
    }

    /// Current state without awaiting
    #[must_use]
    pub fn current(&self) -> bool {
        *self.state.borrow()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::online()
    }
}

#[async_trait]
impl ConnectivityProbe for NetworkMonitor {
    async fn is_connected(&self) -> bool {
        self.current()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}
