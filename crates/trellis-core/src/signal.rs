//! Cooperative cancellation for background tasks.
//!
//! Every background task in the framework (scanner-cache reaper,
//! rate-limiter reapers, cache GC, the accept loop) listens on a
//! [`StopSignal`] so shutdown can prove that no background work
//! outlives it. Signals are clonable; triggering any clone releases
//! every waiter, and triggering twice is a no-op.
//!
//! # Example
//!
//! ```
//! use trellis_core::StopSignal;
//!
//! let signal = StopSignal::new();
//! let observer = signal.clone();
//!
//! signal.stop();
//! assert!(observer.is_stopped());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// A clonable, idempotent stop signal.
#[derive(Debug, Clone)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
    sender: broadcast::Sender<()>,
}

impl StopSignal {
    /// Creates a new, untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            stopped: Arc::new(AtomicBool::new(false)),
            sender,
        }
    }

    /// Triggers the signal, releasing all waiters. Idempotent.
    pub fn stop(&self) {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            // No receivers is fine; the flag alone satisfies late subscribers.
            let _ = self.sender.send(());
        }
    }

    /// Returns `true` once the signal has been triggered.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Waits until the signal is triggered.
    ///
    /// Resolves immediately if the signal was already triggered.
    pub async fn stopped(&self) {
        if self.is_stopped() {
            return;
        }
        let mut receiver = self.sender.subscribe();
        // stop() sets the flag before broadcasting, so a subscriber that
        // missed the broadcast observes the flag here.
        if self.is_stopped() {
            return;
        }
        let _ = receiver.recv().await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_new_signal_is_not_stopped() {
        let signal = StopSignal::new();
        assert!(!signal.is_stopped());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let signal = StopSignal::new();
        signal.stop();
        signal.stop();
        assert!(signal.is_stopped());
    }

    #[test]
    fn test_clones_share_state() {
        let signal = StopSignal::new();
        let clone = signal.clone();
        clone.stop();
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn test_stopped_resolves_after_trigger() {
        let signal = StopSignal::new();
        let waiter = signal.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            signal.stop();
        });

        tokio::time::timeout(Duration::from_secs(1), waiter.stopped())
            .await
            .expect("stopped() should resolve");
    }

    #[tokio::test]
    async fn test_stopped_resolves_immediately_when_already_triggered() {
        let signal = StopSignal::new();
        signal.stop();

        tokio::time::timeout(Duration::from_millis(10), signal.stopped())
            .await
            .expect("stopped() should resolve immediately");
    }
}
