//! Probe worker liveness tracking
//!
//! Workers are detached threads. The tracker counts the ones still running so
//! the dispatcher can wait a bounded time for them before tearing down the
//! USB context.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct TrackerInner {
    live: Mutex<usize>,
    idle: Condvar,
    started: AtomicUsize,
}

/// Shared counter of running probe workers
#[derive(Debug, Clone, Default)]
pub struct WorkerTracker {
    inner: Arc<TrackerInner>,
}

impl WorkerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker; it counts as live until the guard is dropped
    pub fn enter(&self) -> WorkerGuard {
        *self.inner.live.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        self.inner.started.fetch_add(1, Ordering::SeqCst);
        WorkerGuard {
            inner: self.inner.clone(),
        }
    }

    /// Workers currently running
    pub fn live(&self) -> usize {
        *self.inner.live.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Workers registered since creation
    pub fn started(&self) -> usize {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// Wait up to `timeout` for all workers to finish
    ///
    /// Returns the number still running when the wait ended.
    pub fn drain(&self, timeout: Duration) -> usize {
        let live = self.inner.live.lock().unwrap_or_else(|e| e.into_inner());
        let (live, _) = self
            .inner
            .idle
            .wait_timeout_while(live, timeout, |live| *live > 0)
            .unwrap_or_else(|e| e.into_inner());
        *live
    }
}

/// Marks one worker as live; released on drop, including during unwinding
#[derive(Debug)]
pub struct WorkerGuard {
    inner: Arc<TrackerInner>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        let mut live = self.inner.live.lock().unwrap_or_else(|e| e.into_inner());
        *live = live.saturating_sub(1);
        if *live == 0 {
            self.inner.idle.notify_all();
        }
    }
}
