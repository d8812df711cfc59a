//! Cooperative cancellation shared by all run plans

use std::sync::Arc;
use tokio::sync::watch;

/// Broadcast cancel flag; clones observe the same signal
#[derive(Debug, Clone)]
pub struct CancelSignal {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Request cancellation of every run using this signal
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation is requested
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        let changed = receiver.wait_for(|cancelled| *cancelled).await.map(|_| ());
        if changed.is_err() {
            // The sender lives as long as any clone, so this only happens on teardown
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}
