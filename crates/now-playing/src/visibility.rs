//! Page visibility signal
//!
//! The page reports `visibilitychange` events; the poller watches the value
//! to skip hidden ticks and to refresh as soon as the page is shown again.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared, cloneable visibility flag.
#[derive(Debug, Clone)]
pub struct VisibilitySignal {
    tx: Arc<watch::Sender<bool>>,
}

impl VisibilitySignal {
    pub fn new(visible: bool) -> Self {
        let (tx, _) = watch::channel(visible);
        Self { tx: Arc::new(tx) }
    }

    /// Record the page's visibility. Repeating the current value does not
    /// wake watchers.
    pub fn set_visible(&self, visible: bool) {
        self.tx.send_if_modified(|current| {
            if *current == visible {
                false
            } else {
                *current = visible;
                true
            }
        });
    }

    pub fn is_visible(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for VisibilitySignal {
    fn default() -> Self {
        Self::new(true)
    }
}
