//! Test utilities for aoa-probe
//!
//! Helpers for tests that observe work done on other threads.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{wait_until, DEFAULT_TEST_TIMEOUT};
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//!
//! let flag = Arc::new(AtomicBool::new(false));
//! let setter = flag.clone();
//! std::thread::spawn(move || setter.store(true, Ordering::SeqCst));
//!
//! assert!(wait_until(DEFAULT_TEST_TIMEOUT, || flag.load(Ordering::SeqCst)));
//! ```

use std::time::{Duration, Instant};

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between predicate checks in [`wait_until`]
pub const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Poll `condition` until it holds or `timeout` elapses
///
/// Returns whether the condition was observed to hold.
pub fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Measure how long `f` takes to run
pub fn timed<T, F>(f: F) -> (T, Duration)
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let value = f();
    (value, start.elapsed())
}
