//! Cancellation token shared by every task of a run.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// A callback type for cancellation notifications.
pub type CancelCallback = Box<dyn Fn(&CancelReason) + Send + Sync>;

/// Why a run was cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CancelReason {
    /// `terminate` was called on the process manager.
    Terminated,
    /// The run exceeded its time budget.
    Timeout {
        /// The budget in milliseconds.
        budget_ms: u64,
    },
    /// Any other caller-supplied reason.
    Other {
        /// Free-text reason.
        message: String,
    },
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminated => write!(f, "terminated"),
            Self::Timeout { budget_ms } => write!(f, "timed out after {budget_ms}ms"),
            Self::Other { message } => write!(f, "{message}"),
        }
    }
}

/// A token for cooperative cancellation.
///
/// Cancellation is idempotent - only the first reason is kept.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<CancelReason>>,
    callbacks: RwLock<Vec<CancelCallback>>,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    ///
    /// Returns true if this call performed the cancellation, false if the
    /// token was already cancelled. Panicking callbacks are logged and
    /// suppressed.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        *self.reason.write() = Some(reason.clone());
        let callbacks = self.callbacks.read();
        for callback in callbacks.iter() {
            invoke(callback.as_ref(), &reason);
        }
        true
    }

    /// Registers a callback to be invoked on cancellation.
    ///
    /// If already cancelled, the callback is invoked immediately.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: Fn(&CancelReason) + Send + Sync + 'static,
    {
        if let Some(reason) = self.reason() {
            invoke(&callback, &reason);
        } else {
            self.callbacks.write().push(Box::new(callback));
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        self.reason.read().clone()
    }
}

fn invoke(callback: &(dyn Fn(&CancelReason) + Send + Sync), reason: &CancelReason) {
    if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(reason))) {
        warn!("Cancellation callback panicked: {:?}", e);
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_token_default_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_first_reason_wins() {
        let token = CancellationToken::new();
        assert!(token.cancel(CancelReason::Timeout { budget_ms: 50 }));
        assert!(!token.cancel(CancelReason::Terminated));

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some(CancelReason::Timeout { budget_ms: 50 }));
    }

    #[test]
    fn test_on_cancel_before_and_after() {
        let token = CancellationToken::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = counter.clone();
        token.on_cancel(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        token.cancel(CancelReason::Terminated);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let c = counter.clone();
        token.on_cancel(move |reason| {
            assert_eq!(reason, &CancelReason::Terminated);
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_callback_panic_suppressed() {
        let token = CancellationToken::new();
        token.on_cancel(|_| panic!("Intentional panic"));

        token.cancel(CancelReason::Terminated);
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(CancelReason::Terminated.to_string(), "terminated");
        assert_eq!(
            CancelReason::Timeout { budget_ms: 250 }.to_string(),
            "timed out after 250ms"
        );
        assert_eq!(
            CancelReason::Other { message: "shutdown".to_string() }.to_string(),
            "shutdown"
        );
    }
}
