//! Cooperative shutdown signal shared between tasks.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::Notify;

/// One-shot termination signal.
///
/// Cloneable handle used for run cancellation and engine teardown. Waiters
/// are released once `shutdown` is called; the signal is level-triggered,
/// so waiting after the fact completes immediately.
#[derive(Clone)]
pub struct Shutdown {
    terminated: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            terminated: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Signals termination and wakes all waiters.
    pub fn shutdown(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Returns true once `shutdown` has been called.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Waits until termination is signalled.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let terminated = self.terminated.clone();
        let notify = self.notify.clone();

        async move {
            loop {
                if terminated.load(Ordering::SeqCst) {
                    return;
                }
                let notified = notify.notified();
                if terminated.load(Ordering::SeqCst) {
                    return;
                }
                notified.await;
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_after_shutdown_completes() {
        let shutdown = Shutdown::new();
        shutdown.shutdown();
        assert!(shutdown.is_terminated());
        shutdown.wait().await;
    }

    #[tokio::test]
    async fn test_shutdown_releases_waiter() {
        let shutdown = Shutdown::new();
        let waiter = shutdown.wait();

        let handle = tokio::spawn(waiter);
        shutdown.shutdown();
        handle.await.unwrap();
    }
}
