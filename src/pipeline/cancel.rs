// src/pipeline/cancel.rs
//
// Per-job stop signals. A fight job stops issuing window requests once it is
// cancelled or once the scorer reports the model unreachable; requests still
// queued for that job are answered with `Skipped` and their frames dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `cancel()` has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Signals shared between a fight job and the pool workers serving it.
#[derive(Debug, Clone)]
pub struct JobSignals {
    pub cancel: CancelToken,
    unavailable: Arc<AtomicBool>,
}

impl JobSignals {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn mark_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    pub fn model_unavailable(&self) -> bool {
        self.unavailable.load(Ordering::SeqCst)
    }

    pub fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.model_unavailable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancelled_resolves_after_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        assert!(!token.is_cancelled());
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_unavailable_stops_job() {
        let signals = JobSignals::new(CancelToken::new());
        assert!(!signals.should_stop());
        signals.clone().mark_unavailable();
        assert!(signals.should_stop());
    }
}
