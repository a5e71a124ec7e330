//! Cooperative stop signal.
//!
//! One process-wide signal marks shutdown; the poller also hands each
//! account loop its own signal for targeted cancellation. Signals are
//! checked at loop boundaries only — an in-flight fetch is never aborted
//! preemptively.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// A clonable, one-way stop signal.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    triggered: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers the signal. Idempotent; wakes all waiters.
    pub fn trigger(&self) {
        self.inner.triggered.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Whether the signal has been triggered.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Waits until the signal is triggered.
    pub async fn wait(&self) {
        while !self.is_triggered() {
            let notified = self.inner.notify.notified();
            // Re-check after arming the waiter so a trigger between the
            // loop condition and `notified()` is not missed.
            if self.is_triggered() {
                break;
            }
            notified.await;
        }
    }
}
