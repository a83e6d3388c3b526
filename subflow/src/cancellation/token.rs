//! Cancellation token for cooperative cancellation.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::warn;

/// A callback type for cancellation notifications.
pub type CancelCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    callbacks: RwLock<Vec<CancelCallback>>,
    notify: Notify,
    children: RwLock<Vec<CancellationToken>>,
}

/// A cloneable handle for cooperative cancellation.
///
/// Clones share state. Cancellation is idempotent: only the first reason is
/// kept. Tasks observe it either by polling [`is_cancelled`](Self::is_cancelled)
/// or by awaiting [`cancelled`](Self::cancelled) at their suspension points.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that is cancelled whenever this one is.
    ///
    /// Cancelling the child does not affect the parent.
    #[must_use]
    pub fn child_token(&self) -> Self {
        let child = Self::new();
        {
            let mut children = self.inner.children.write();
            children.retain(|c| !c.is_cancelled());
            children.push(child.clone());
        }
        // The parent may have drained its children before the push above.
        if self.is_cancelled() {
            child.cancel(self.reason().unwrap_or_default());
        }
        child
    }

    /// Requests cancellation with a reason.
    ///
    /// Callbacks run immediately; a panicking callback is logged and
    /// suppressed. Waiters and child tokens are woken.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        {
            // The reason is written before the flag, so an observer of the
            // flag always finds it.
            let mut slot = self.inner.reason.write();
            if self.is_cancelled() {
                return;
            }
            *slot = Some(reason.clone());
            self.inner.cancelled.store(true, Ordering::SeqCst);
        }

        for callback in self.inner.callbacks.read().iter() {
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback();
            })) {
                warn!("Cancellation callback panicked: {:?}", e);
            }
        }

        self.inner.notify.notify_waiters();

        let children = std::mem::take(&mut *self.inner.children.write());
        for child in children {
            child.cancel(reason.clone());
        }
    }

    /// Registers a callback to be invoked on cancellation.
    ///
    /// If already cancelled, the callback is invoked immediately.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.is_cancelled() {
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback();
            })) {
                warn!("Cancellation callback panicked: {:?}", e);
            }
        } else {
            self.inner.callbacks.write().push(Box::new(callback));
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.read().clone()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent cancel is not missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_token_default_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_token_cancel_idempotent() {
        let token = CancellationToken::new();
        token.cancel("unsubscribed");
        token.cancel("shutdown");

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("unsubscribed".to_string()));
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel("stop");
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_on_cancel_before_and_after() {
        let token = CancellationToken::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = counter.clone();
        token.on_cancel(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        token.cancel("test");
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let c = counter.clone();
        token.on_cancel(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_callback_panic_suppressed() {
        let token = CancellationToken::new();
        token.on_cancel(|| panic!("Intentional panic"));
        token.cancel("test");
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_child_follows_parent() {
        let parent = CancellationToken::new();
        let child = parent.child_token();

        child.cancel("child only");
        assert!(!parent.is_cancelled());

        let other = parent.child_token();
        parent.cancel("runner stopped");
        assert_eq!(other.reason(), Some("runner stopped".to_string()));

        let late = parent.child_token();
        assert!(late.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_cancel() {
        let token = CancellationToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        token.cancel("go");
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_woken_waiter_sees_reason() {
        for _ in 0..200 {
            let token = CancellationToken::new();
            let waiter = {
                let token = token.clone();
                tokio::spawn(async move {
                    token.cancelled().await;
                    token.reason()
                })
            };
            let canceller = {
                let token = token.clone();
                std::thread::spawn(move || token.cancel("unsubscribed"))
            };

            let reason = tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter should wake")
                .unwrap();
            canceller.join().unwrap();
            assert_eq!(reason, Some("unsubscribed".to_string()));
        }
    }

    #[test]
    fn test_concurrent_cancels_keep_one_reason() {
        let token = CancellationToken::new();
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let token = token.clone();
                std::thread::spawn(move || token.cancel(format!("reason-{i}")))
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let reason = token.reason().unwrap();
        assert!(reason.starts_with("reason-"));
        token.cancel("late");
        assert_eq!(token.reason(), Some(reason));
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel("done");
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .unwrap();
    }
}
