use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

/*
Tracks callers that are blocked on a pool checkout.
- The pool itself knows how many connections exist and how many are idle,
  but not how many callers are queued behind it.
- Every checkout goes through `track_checkout`, which counts the caller as waiting
  until the checkout future resolves (or is dropped).
- Counters are plain atomics, readers get a snapshot and never block a checkout.
*/

/// Pool state tracker for checkout bookkeeping
#[derive(Debug, Default)]
pub struct PoolStateTracker {
    waiting: AtomicU32,
    checkouts: AtomicU32,
}

/// Decrements the waiting counter when the checkout completes or is cancelled
struct WaitingGuard<'a> {
    waiting: &'a AtomicU32,
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

impl PoolStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs a checkout future while counting the caller as waiting
    pub async fn track_checkout<F, T>(&self, checkout: F) -> T
    where
        F: Future<Output = T>,
    {
        let prev = self.waiting.fetch_add(1, Ordering::SeqCst);
        debug!(waiting = prev + 1, "Waiting for pooled connection");
        let _guard = WaitingGuard {
            waiting: &self.waiting,
        };

        let result = checkout.await;
        self.checkouts.fetch_add(1, Ordering::SeqCst);
        result
    }

    /// Callers currently blocked on a checkout
    pub fn waiting(&self) -> u32 {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Checkouts completed since the tracker was created (successful or not)
    pub fn checkouts(&self) -> u32 {
        self.checkouts.load(Ordering::SeqCst)
    }
}
