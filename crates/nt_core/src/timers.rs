//! Small timer helpers used by the rekey debounce and the GK retry
//! backoff. Kept separate from [`crate::mls`] and [`crate::router`] so
//! their state machines stay synchronous and unit-testable without a
//! runtime; only these wrappers touch `tokio::time`.

use std::time::Duration;

use tokio::task::JoinHandle;

/// A timer that, once armed, ignores further `arm` calls until it fires
/// or is cancelled. This is what gives the rekey debounce its
/// coalescing behavior: a burst of membership changes arms one timer,
/// not one per change.
#[derive(Default)]
pub struct DebounceTimer {
    handle: Option<JoinHandle<()>>,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self { handle: None }
    }

    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Arm the timer to run `job` after `delay`, unless it's already
    /// armed. Returns `true` if this call actually armed it.
    pub fn arm_once<F>(&mut self, delay: Duration, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_armed() {
            return false;
        }
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            job();
        }));
        true
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Exponential backoff schedule for retrying a stalled GK handshake:
/// `initial * 2^attempt`, capped at `max_attempts` (an attempt index at
/// or past that bound means "give up").
pub fn backoff_delay(initial: Duration, attempt: u32) -> Duration {
    initial.saturating_mul(1u32 << attempt.min(31))
}

pub fn backoff_exhausted(attempt: u32, max_attempts: u32) -> bool {
    attempt >= max_attempts
}
