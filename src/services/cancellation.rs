//! Session cancellation signalling.
//!
//! A `watch` channel rather than `broadcast`: late subscribers still see a
//! cancellation that happened before they started waiting.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Owner side; cancelling is idempotent.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Observer side handed to sessions and runners.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle/signal pair.
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelSignal { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Cancel when `parent` fires or after `deadline`, whichever comes first.
    pub fn link(&self, parent: CancelSignal, deadline: Option<Duration>) -> tokio::task::JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        () = parent.cancelled() => {}
                        () = tokio::time::sleep(deadline) => {
                            tracing::warn!(deadline_secs = deadline.as_secs_f64(), "global deadline reached, cancelling sessions");
                        }
                    }
                }
                None => parent.cancelled().await,
            }
            handle.cancel();
        })
    }
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancelled. Pends forever if the handle is dropped uncancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let (handle, signal) = cancellation();
        let waiter = tokio::spawn(async move { signal.cancelled().await });
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_cancellation() {
        let (handle, _signal) = cancellation();
        handle.cancel();
        let late = handle.signal();
        assert!(late.is_cancelled());
        tokio::time::timeout(Duration::from_millis(100), late.cancelled())
            .await
            .expect("already cancelled");
    }

    #[tokio::test]
    async fn test_never_does_not_fire() {
        let signal = CancelSignal::never();
        assert!(!signal.is_cancelled());
        let fired = tokio::time::timeout(Duration::from_millis(50), signal.cancelled()).await;
        assert!(fired.is_err());
    }

    #[tokio::test]
    async fn test_link_fires_on_deadline() {
        let (child, signal) = cancellation();
        child.link(CancelSignal::never(), Some(Duration::from_millis(20)));
        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .expect("deadline should cancel");
    }

    #[tokio::test]
    async fn test_link_follows_parent() {
        let (parent, parent_signal) = cancellation();
        let (child, signal) = cancellation();
        child.link(parent_signal, None);
        parent.cancel();
        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .expect("parent cancellation propagates");
    }
}
