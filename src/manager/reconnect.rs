//! Reconnection policy.
//!
//! Decides whether and when to retry after an abnormal close. Backoff is
//! linear: the delay for attempt `n` is `base_interval * n`, bounded
//! growth proportional to the attempt count. After `max_attempts`
//! consecutive failures the policy gives up and the caller must invoke
//! `connect()` explicitly to resume.
//!
//! The policy is a pure decision; the event loop owns the timer it arms
//! and cancels it on `disconnect()`.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// RetrySchedule
// ============================================================================

/// A single scheduled retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySchedule {
    /// Attempt number this retry represents (1-based).
    pub attempt: u32,

    /// Delay before the retry fires.
    pub delay: Duration,
}

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Attempt-indexed linear backoff with a hard attempt cap.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    /// Base interval multiplied by the attempt number.
    base_interval: Duration,

    /// Attempts after which the policy gives up.
    max_attempts: u32,
}

impl ReconnectPolicy {
    /// Creates a policy.
    #[inline]
    #[must_use]
    pub const fn new(base_interval: Duration, max_attempts: u32) -> Self {
        Self {
            base_interval,
            max_attempts,
        }
    }

    /// Returns the maximum attempt count.
    #[inline]
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides the next retry given the attempts made so far.
    ///
    /// Returns `None` when attempts are exhausted; the event loop then
    /// surfaces the terminal error and arms nothing. Otherwise returns
    /// the next attempt number and its delay. The caller must record the
    /// new attempt count before the timer fires, so a racing close event
    /// cannot double-schedule against a stale count.
    #[must_use]
    pub fn schedule(&self, current_attempts: u32) -> Option<RetrySchedule> {
        if current_attempts >= self.max_attempts {
            return None;
        }

        let attempt = current_attempts + 1;
        Some(RetrySchedule {
            attempt,
            delay: self.base_interval * attempt,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_delay_growth() {
        let policy = ReconnectPolicy::new(Duration::from_millis(100), 5);

        let first = policy.schedule(0).expect("first retry");
        let second = policy.schedule(1).expect("second retry");
        let third = policy.schedule(2).expect("third retry");

        assert_eq!(first.attempt, 1);
        assert_eq!(first.delay, Duration::from_millis(100));
        assert_eq!(second.attempt, 2);
        assert_eq!(second.delay, Duration::from_millis(200));
        assert_eq!(third.attempt, 3);
        assert_eq!(third.delay, Duration::from_millis(300));
    }

    #[test]
    fn test_exhaustion() {
        let policy = ReconnectPolicy::new(Duration::from_millis(100), 3);

        assert!(policy.schedule(2).is_some());
        assert!(policy.schedule(3).is_none());
        assert!(policy.schedule(4).is_none());
    }

    #[test]
    fn test_zero_max_attempts_never_retries() {
        let policy = ReconnectPolicy::new(Duration::from_secs(3), 0);
        assert!(policy.schedule(0).is_none());
    }
}
