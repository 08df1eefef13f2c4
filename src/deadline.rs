//! Cooperative deadline primitive for bounded device operations.
//!
//! A [`Deadline`] is a non-blocking elapsed-time check: the polling loop that
//! drives a command/response exchange re-checks it between polls instead of
//! being interrupted. Elapse is computed on demand from a stored start
//! instant, so no timer thread is involved and the check is portable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Returned when a [`Deadline`] is started while it is still armed.
#[derive(Debug, Error)]
#[error("deadline is already armed; cancel or reset it before starting again")]
pub struct InvalidState;

/// A one-shot, cancellable deadline.
///
/// `has_elapsed` and `cancel` take `&self` and are safe to call from the
/// polling path while the owner holds the deadline; the cancelled flag is
/// atomic and the start instant is only written by `start`/`reset`, which
/// require exclusive access.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use atbench::Deadline;
///
/// let deadline = Deadline::started(Duration::from_millis(50));
/// while !deadline.has_elapsed() {
///     // poll the device, do a unit of work...
///     # break;
/// }
/// ```
#[derive(Debug, Default)]
pub struct Deadline {
    armed: Option<(Instant, Duration)>,
    cancelled: AtomicBool,
}

impl Deadline {
    /// Create an unarmed deadline. `has_elapsed` returns `false` until
    /// [`start`](Self::start) is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a deadline that is already counting down `duration`.
    pub fn started(duration: Duration) -> Self {
        Self {
            armed: Some((Instant::now(), duration)),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Arm the deadline for `duration`, counting from now.
    ///
    /// Fails with [`InvalidState`] if the deadline is currently armed and has
    /// been neither cancelled nor reset. Starting after `cancel` is allowed:
    /// cancellation disarms.
    pub fn start(&mut self, duration: Duration) -> Result<(), InvalidState> {
        if self.armed.is_some() && !self.cancelled.load(Ordering::Acquire) {
            return Err(InvalidState);
        }
        self.cancelled.store(false, Ordering::Release);
        self.armed = Some((Instant::now(), duration));
        Ok(())
    }

    /// Non-blocking elapse check.
    ///
    /// Returns `true` iff the deadline is armed, not cancelled, and at least
    /// its duration has passed since `start`. The clock is monotonic, so once
    /// this returns `true` it stays `true` until the deadline is reset or
    /// restarted.
    pub fn has_elapsed(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return false;
        }
        match self.armed {
            Some((started, duration)) => started.elapsed() >= duration,
            None => false,
        }
    }

    /// Cancel the deadline. Idempotent; afterwards `has_elapsed` returns
    /// `false` until the next `start`.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Clear all state, allowing reuse.
    pub fn reset(&mut self) {
        self.armed = None;
        self.cancelled.store(false, Ordering::Release);
    }

    /// Time left before elapse, if armed and not cancelled. Used to bound the
    /// final poll slice of a read loop.
    pub fn remaining(&self) -> Option<Duration> {
        if self.cancelled.load(Ordering::Acquire) {
            return None;
        }
        let (started, duration) = self.armed?;
        Some(duration.saturating_sub(started.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn not_elapsed_immediately_after_start() {
        let deadline = Deadline::started(Duration::from_millis(50));
        assert!(!deadline.has_elapsed());
    }

    #[test]
    fn elapses_after_duration() {
        let deadline = Deadline::started(Duration::from_millis(20));
        sleep(Duration::from_millis(30));
        assert!(deadline.has_elapsed());
        // The check is idempotent and sticky.
        assert!(deadline.has_elapsed());
        assert!(deadline.has_elapsed());
    }

    #[test]
    fn cancel_suppresses_elapse_forever() {
        let deadline = Deadline::started(Duration::from_millis(10));
        deadline.cancel();
        sleep(Duration::from_millis(25));
        assert!(!deadline.has_elapsed());
        deadline.cancel(); // idempotent
        assert!(!deadline.has_elapsed());
    }

    #[test]
    fn cancel_after_elapse_suppresses_too() {
        let deadline = Deadline::started(Duration::from_millis(5));
        sleep(Duration::from_millis(10));
        assert!(deadline.has_elapsed());
        deadline.cancel();
        assert!(!deadline.has_elapsed());
    }

    #[test]
    fn double_start_is_invalid_state() {
        let mut deadline = Deadline::new();
        deadline.start(Duration::from_secs(1)).unwrap();
        assert!(deadline.start(Duration::from_secs(1)).is_err());
    }

    #[test]
    fn start_after_cancel_is_allowed() {
        let mut deadline = Deadline::new();
        deadline.start(Duration::from_secs(1)).unwrap();
        deadline.cancel();
        deadline.start(Duration::from_millis(5)).unwrap();
        sleep(Duration::from_millis(10));
        assert!(deadline.has_elapsed());
    }

    #[test]
    fn reset_allows_reuse() {
        let mut deadline = Deadline::started(Duration::from_millis(5));
        sleep(Duration::from_millis(10));
        assert!(deadline.has_elapsed());
        deadline.reset();
        assert!(!deadline.has_elapsed());
        deadline.start(Duration::from_secs(1)).unwrap();
        assert!(!deadline.has_elapsed());
    }

    #[test]
    fn remaining_counts_down() {
        let deadline = Deadline::started(Duration::from_millis(100));
        let first = deadline.remaining().unwrap();
        sleep(Duration::from_millis(10));
        let second = deadline.remaining().unwrap();
        assert!(second < first);
        deadline.cancel();
        assert_eq!(deadline.remaining(), None);
    }
}
