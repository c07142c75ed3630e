//! First-class cancellation token plumbed through every pipeline
//! operation: a signal that propagates to all stages.
//!
//! Grounded on `gateway::runtime::cancel::CancelToken`'s atomic-flag
//! shape, but backed by a `tokio::sync::watch` channel instead of a bare
//! `AtomicBool` so blocking stage operations can `select!` against it
//! without missing a wakeup on any blocking send/receive.

use tokio::sync::watch;

#[derive(Clone)]
pub struct CancelToken {
    tx: std::sync::Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: std::sync::Arc::new(tx),
            rx,
        }
    }

    /// Signal cancellation to every clone of this token.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation has been requested. Safe to race in a
    /// `select!` arm: unlike a bare `Notify`, a `watch` receiver always
    /// observes the latest value, so this never misses a cancellation
    /// that happened before the future was polled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
