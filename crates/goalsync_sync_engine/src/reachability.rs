//! Network reachability signal.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// A shared connectivity flag.
///
/// The host feeds platform reachability callbacks into [`set_online`]; the
/// orchestrator watches it to pause and resume the pipeline. Clones share the
/// same flag.
///
/// [`set_online`]: ReachabilityMonitor::set_online
#[derive(Debug, Clone)]
pub struct ReachabilityMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl ReachabilityMonitor {
    /// Creates a monitor with an initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Returns the current state.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Updates the state. Returns true if it changed.
    ///
    /// Subscribers are only notified of actual changes.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
        if changed {
            info!(online, "reachability changed");
        }
        changed
    }

    /// Subscribes to changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ReachabilityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_changes() {
        let monitor = ReachabilityMonitor::new(true);
        let mut rx = monitor.subscribe();

        assert!(!monitor.set_online(true));
        assert!(!rx.has_changed().unwrap());

        assert!(monitor.clone().set_online(false));
        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());
        assert!(!monitor.is_online());
    }
}
