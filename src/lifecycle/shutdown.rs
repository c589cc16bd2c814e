//! Shutdown coordination for the engine.

use std::sync::Arc;
use tokio::sync::watch;

/// Process-wide shutdown signal.
///
/// Closes exactly once, no matter how many tasks call [`close_once`](Self::close_once)
/// concurrently. Waiters that arrive after the close observe it immediately, so
/// the signal can be handed to tasks spawned at any time.
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    /// Watch channel sender holding the closed flag.
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// Create a new, open shutdown signal.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Close the signal.
    ///
    /// Returns true only for the caller that performed the transition.
    pub fn close_once(&self) -> bool {
        self.tx.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    /// Whether the signal has been closed.
    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal is closed.
    pub async fn done(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns once closed.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_close_once_is_idempotent() {
        let shutdown = ShutdownSignal::new();
        assert!(!shutdown.is_closed());
        assert!(shutdown.close_once());
        assert!(!shutdown.close_once());
        assert!(shutdown.is_closed());
    }

    #[tokio::test]
    async fn test_concurrent_close_single_transition() {
        let shutdown = ShutdownSignal::new();
        let mut handles = Vec::new();
        for _ in 0..32 {
            let s = shutdown.clone();
            handles.push(tokio::spawn(async move { s.close_once() }));
        }

        let mut transitions = 0;
        for handle in handles {
            if handle.await.unwrap() {
                transitions += 1;
            }
        }
        assert_eq!(transitions, 1);
    }

    #[tokio::test]
    async fn test_waiters_before_and_after_close() {
        let shutdown = ShutdownSignal::new();
        let early = {
            let s = shutdown.clone();
            tokio::spawn(async move { s.done().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        shutdown.close_once();
        tokio::time::timeout(Duration::from_secs(1), early)
            .await
            .expect("early waiter not woken")
            .unwrap();

        // Late waiter sees the close immediately.
        tokio::time::timeout(Duration::from_millis(100), shutdown.done())
            .await
            .expect("late waiter blocked");
    }
}
