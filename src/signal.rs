//! Frame-arrival coupling between the driver's notifier thread and the
//! streaming thread.
//!
//! The driver signals frames from its own thread at arbitrary times; the
//! consumer blocks until an unconsumed frame exists or a fixed wait budget is
//! exhausted. The arrival counter only ever increments; "consumed" tracking
//! lives with the caller, which passes its pulled count into every wait.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Wait attempts before a stalled camera is reported.
pub const WAIT_ATTEMPTS: u32 = 5;

/// Bound on a single condvar wait.
pub const WAIT_STEP: Duration = Duration::from_secs(1);

/// The bounded wait expired with no new frame.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("no frame arrived within {attempts} wait attempts ({waited:?} total)")]
pub struct WaitTimeout {
    pub attempts: u32,
    pub waited: Duration,
}

/// Condvar-signaled arrival counter shared with the driver callback.
#[derive(Debug, Default)]
pub struct FrameSignal {
    available: Mutex<u64>,
    cond: Condvar,
}

impl FrameSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one frame arrival and wake the consumer.
    ///
    /// Called from the driver's event context; the critical section is a
    /// single increment, so the notifier never waits on the consumer.
    pub fn frame_arrived(&self) {
        let mut available = lock(&self.available);
        *available += 1;
        self.cond.notify_one();
    }

    /// Frames signaled so far. Non-decreasing until [`reset`](Self::reset).
    pub fn available(&self) -> u64 {
        *lock(&self.available)
    }

    /// Zero the counter for a fresh session.
    pub fn reset(&self) {
        *lock(&self.available) = 0;
    }

    /// Block until more frames have arrived than `last_pulled`, or the wait
    /// budget runs out.
    ///
    /// Returns the arrival count observed when the predicate held. Each wake,
    /// stale or signaled, re-checks the predicate and costs one attempt, so
    /// the worst case is `WAIT_ATTEMPTS * WAIT_STEP` and a spurious wake can
    /// never produce a false positive.
    pub fn wait_for_frame(&self, last_pulled: u64) -> Result<u64, WaitTimeout> {
        self.wait_with(last_pulled, WAIT_ATTEMPTS, WAIT_STEP)
    }

    fn wait_with(
        &self,
        last_pulled: u64,
        attempts: u32,
        step: Duration,
    ) -> Result<u64, WaitTimeout> {
        let mut available = lock(&self.available);
        if *available > last_pulled {
            return Ok(*available);
        }
        for _ in 0..attempts {
            let (guard, _timed_out) = self
                .cond
                .wait_timeout(available, step)
                .unwrap_or_else(PoisonError::into_inner);
            available = guard;
            if *available > last_pulled {
                return Ok(*available);
            }
        }
        Err(WaitTimeout {
            attempts,
            waited: step * attempts,
        })
    }
}

// The guarded value is a plain counter, so a panic on another thread cannot
// leave it in an invalid state; keep going with the inner value.
fn lock(m: &Mutex<u64>) -> std::sync::MutexGuard<'_, u64> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
