//! Schedulable timers
//!
//! The session core never sleeps. Every delay (reconnect backoff, heartbeat
//! interval, heartbeat timeout) is requested from a [`Scheduler`], and the
//! firing is delivered back to the core as a [`TimerId`].
//!
//! - [`TokioScheduler`] backs timers with `tokio::time::sleep` tasks
//! - [`ManualScheduler`] runs on a simulated clock for deterministic tests

mod manual;
mod runtime;

use std::fmt;
use std::time::Duration;

pub use manual::ManualScheduler;
pub use runtime::TokioScheduler;

/// Identifier of one scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// One-shot timer and wall-clock capability
pub trait Scheduler {
    /// Arm a one-shot timer firing after `delay`
    fn schedule(&mut self, delay: Duration) -> TimerId;

    /// Disarm a timer. Cancelling an unknown or already fired timer is a no-op.
    fn cancel(&mut self, id: TimerId);

    /// Current time in milliseconds since the Unix epoch
    fn now_millis(&self) -> i64;
}
