//! Keep-alive heartbeat timer.
//!
//! Wraps a repeating tokio interval behind an armed/disarmed switch so
//! the event loop can select on it unconditionally: while disarmed,
//! [`Heartbeat::tick`] never completes. At most one timer is armed per
//! manager instance; arming again restarts the cadence.
//!
//! The first beat fires one full period after [`Heartbeat::start`], not
//! immediately.

// ============================================================================
// Imports
// ============================================================================

use std::future::pending;
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

// ============================================================================
// Heartbeat
// ============================================================================

/// Armed/disarmed repeating keep-alive timer.
#[derive(Debug, Default)]
pub struct Heartbeat {
    /// The armed interval, if any.
    interval: Option<Interval>,
}

impl Heartbeat {
    /// Creates a disarmed heartbeat.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { interval: None }
    }

    /// Arms the timer with the given cadence.
    ///
    /// An already-armed timer is stopped first, so exactly one cadence
    /// is ever active.
    pub fn start(&mut self, period: Duration) {
        self.stop();

        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
    }

    /// Disarms the timer. Idempotent.
    #[inline]
    pub fn stop(&mut self) {
        self.interval = None;
    }

    /// Returns `true` while armed.
    #[inline]
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.interval.is_some()
    }

    /// Waits for the next beat; never completes while disarmed.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => pending().await,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
