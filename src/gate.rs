//! FIFO mutual-exclusion gate for async collaborators.
//!
//! Unlike a plain async mutex, release hands the gate directly to the oldest
//! waiter, so a caller that keeps re-acquiring cannot overtake callers that
//! queued earlier.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::trace;

#[derive(Default)]
struct GateState {
    held: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// FIFO gate. Clones share the same gate.
#[derive(Clone, Default)]
pub struct FifoGate {
    state: Arc<Mutex<GateState>>,
}

impl FifoGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the gate. Waiters are granted the gate in arrival order.
    ///
    /// Cancel safe: dropping the future before it completes gives up the
    /// place in the queue, and a grant that arrived meanwhile is passed on.
    pub async fn acquire(&self) -> GateGuard {
        loop {
            let rx = {
                let mut state = self.state.lock();
                if !state.held {
                    state.held = true;
                    return self.guard();
                }
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                trace!(waiting = state.waiters.len(), "gate busy, queued");
                rx
            };

            let mut pending = PendingHandoff {
                gate: self,
                rx,
                granted: false,
            };
            if (&mut pending.rx).await.is_ok() {
                pending.granted = true;
                return self.guard();
            }
        }
    }

    /// Take the gate if it is free and nobody is queued.
    pub fn try_acquire(&self) -> Option<GateGuard> {
        let mut state = self.state.lock();
        if state.held {
            return None;
        }
        state.held = true;
        Some(self.guard())
    }

    pub fn is_held(&self) -> bool {
        self.state.lock().held
    }

    /// Number of queued waiters still interested in the gate.
    pub fn waiting(&self) -> usize {
        self.state
            .lock()
            .waiters
            .iter()
            .filter(|waiter| !waiter.is_closed())
            .count()
    }

    fn guard(&self) -> GateGuard {
        GateGuard { gate: self.clone() }
    }

    /// Hand the gate to the oldest live waiter, or mark it free.
    fn release(&self) {
        let mut state = self.state.lock();
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                trace!(waiting = state.waiters.len(), "gate handed off");
                return;
            }
        }
        state.held = false;
    }
}

impl fmt::Debug for FifoGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FifoGate")
            .field("held", &state.held)
            .field("waiting", &state.waiters.len())
            .finish()
    }
}

/// Holds the gate until dropped.
#[must_use = "the gate is released as soon as the guard is dropped"]
pub struct GateGuard {
    gate: FifoGate,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.gate.release();
    }
}

impl fmt::Debug for GateGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateGuard").finish_non_exhaustive()
    }
}

/// A queued acquire. If dropped before the grant was observed, any grant
/// already sent is released again.
struct PendingHandoff<'a> {
    gate: &'a FifoGate,
    rx: oneshot::Receiver<()>,
    granted: bool,
}

impl Drop for PendingHandoff<'_> {
    fn drop(&mut self) {
        if self.granted {
            return;
        }
        self.rx.close();
        if self.rx.try_recv().is_ok() {
            self.gate.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::task::Poll;
    use std::time::Duration;

    #[test]
    fn test_try_acquire() {
        let gate = FifoGate::new();
        let guard = gate.try_acquire().unwrap();
        assert!(gate.is_held());
        assert!(gate.try_acquire().is_none());
        drop(guard);
        assert!(!gate.is_held());
        assert!(gate.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_acquire_when_free() {
        let gate = FifoGate::new();
        let guard = gate.acquire().await;
        assert!(gate.is_held());
        drop(guard);
        assert!(!gate.is_held());
    }

    #[tokio::test]
    async fn test_waiters_are_served_in_order() {
        let gate = FifoGate::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = gate.acquire().await;

        let mut handles = Vec::new();
        for i in 0..4 {
            let queued = gate.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let _guard = queued.acquire().await;
                order.lock().push(i);
            }));
            // Let the task queue up before spawning the next one.
            while gate.waiting() < i + 1 {
                tokio::task::yield_now().await;
            }
        }

        drop(first);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
        assert!(!gate.is_held());
    }

    #[tokio::test]
    async fn test_release_skips_cancelled_waiter() {
        let gate = FifoGate::new();
        let guard = gate.acquire().await;

        let cancelled = tokio::time::timeout(Duration::from_millis(10), gate.acquire()).await;
        assert!(cancelled.is_err());
        assert_eq!(gate.waiting(), 0);

        drop(guard);
        assert!(!gate.is_held());
    }

    #[tokio::test]
    async fn test_grant_to_dropped_future_is_passed_on() {
        let gate = FifoGate::new();
        let guard = gate.acquire().await;

        let mut queued = Box::pin(gate.acquire());
        // Poll once so the future queues itself.
        assert!(poll_once(queued.as_mut()).await.is_none());
        assert_eq!(gate.waiting(), 1);

        // Grant is sent but never observed.
        drop(guard);
        assert!(gate.is_held());
        drop(queued);
        assert!(!gate.is_held());
    }

    async fn poll_once<F: Future + Unpin>(mut fut: F) -> Option<F::Output> {
        std::future::poll_fn(|cx| match Pin::new(&mut fut).poll(cx) {
            Poll::Ready(output) => Poll::Ready(Some(output)),
            Poll::Pending => Poll::Ready(None),
        })
        .await
    }
}
