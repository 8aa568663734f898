//! Cooperative shutdown for the reconciliation pool.
//!
//! One controller is shared between the hosting process, the dispatcher
//! and every worker. Each participant holds a [`ShutdownToken`]; dropping
//! the token counts the participant as stopped, which is what
//! [`ShutdownController::wait_for_completion`] waits for.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// Shutdown coordinator owned by the hosting process
pub struct ShutdownController {
    cancel_tx: watch::Sender<bool>,
    guard_tx: Mutex<Option<mpsc::Sender<()>>>,
    guard_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
    requested: AtomicBool,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (cancel_tx, _) = watch::channel(false);
        let (guard_tx, guard_rx) = mpsc::channel(1);

        Self {
            cancel_tx,
            guard_tx: Mutex::new(Some(guard_tx)),
            guard_rx: tokio::sync::Mutex::new(guard_rx),
            requested: AtomicBool::new(false),
        }
    }

    /// Mint a token for one dispatcher or worker task
    pub fn token(&self) -> ShutdownToken {
        let guard = self
            .guard_tx
            .lock()
            .expect("shutdown guard lock poisoned")
            .clone();

        ShutdownToken {
            cancel_rx: self.cancel_tx.subscribe(),
            _guard: guard,
        }
    }

    /// Signal every token holder to stop. Idempotent.
    pub fn request_shutdown(&self) {
        if self.requested.swap(true, Ordering::SeqCst) {
            warn!("Shutdown already requested, ignoring duplicate signal");
            return;
        }

        info!("Shutdown requested");
        let _ = self.cancel_tx.send(true);
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolve once every outstanding token has been dropped.
    ///
    /// No new tokens can be minted after this is called. Callers bound the
    /// wait with `tokio::time::timeout`.
    pub async fn wait_for_completion(&self) {
        // Drop our own sender so recv() can observe channel closure
        self.guard_tx
            .lock()
            .expect("shutdown guard lock poisoned")
            .take();

        let mut rx = self.guard_rx.lock().await;
        while rx.recv().await.is_some() {}

        info!("All reconciliation tasks stopped");
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-task handle: observes cancellation, counts toward completion
pub struct ShutdownToken {
    cancel_rx: watch::Receiver<bool>,
    _guard: Option<mpsc::Sender<()>>,
}

impl ShutdownToken {
    /// Check cancellation without waiting
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Wait until shutdown is requested
    pub async fn cancelled(&mut self) {
        loop {
            if *self.cancel_rx.borrow_and_update() {
                return;
            }
            if self.cancel_rx.changed().await.is_err() {
                // Controller dropped; treat as cancellation
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_token_observes_cancellation() {
        let controller = ShutdownController::new();
        let mut token = controller.token();

        assert!(!token.is_cancelled());
        controller.request_shutdown();
        assert!(token.is_cancelled());
        token.cancelled().await; // resolves immediately
    }

    #[tokio::test]
    async fn test_duplicate_request_is_ignored() {
        let controller = ShutdownController::new();
        controller.request_shutdown();
        controller.request_shutdown();
        assert!(controller.is_shutdown_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_completion_resolves_after_tokens_drop() {
        let controller = ShutdownController::new();
        let mut token = controller.token();

        let handle = tokio::spawn(async move {
            token.cancelled().await;
            drop(token);
        });

        controller.request_shutdown();
        tokio::time::timeout(Duration::from_secs(5), controller.wait_for_completion())
            .await
            .expect("completion wait should resolve once tokens are dropped");
        handle.await.unwrap();
    }
}
