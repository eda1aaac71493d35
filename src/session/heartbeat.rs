//! Heartbeat monitor
//!
//! While connected, a PING carrying its send time goes out every interval.
//! Each probe arms a timeout; the matching PONG disarms it and yields the
//! round-trip latency. A probe that is never acknowledged means the
//! connection is dead and must be forced closed.

use std::time::Duration;

use tracing::{debug, trace};

use crate::protocol::Envelope;
use crate::timer::{Scheduler, TimerId};

/// Liveness probing settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatPolicy {
    /// Send probes while connected
    pub enabled: bool,

    /// Delay between probes
    pub interval: Duration,

    /// Maximum wait for an acknowledgment
    pub timeout: Duration,
}

impl Default for HeartbeatPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_millis(25_000),
            timeout: Duration::from_millis(10_000),
        }
    }
}

/// Which heartbeat timer fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatTimer {
    Interval,
    Timeout,
}

/// Probe and watchdog bookkeeping for one connection
#[derive(Debug)]
pub struct HeartbeatMonitor {
    policy: HeartbeatPolicy,
    interval_timer: Option<TimerId>,
    timeout_timer: Option<TimerId>,
    /// Send time of the unacknowledged probe
    outstanding: Option<i64>,
    last_ack_at: Option<i64>,
    latency: Option<Duration>,
}

impl HeartbeatMonitor {
    pub fn new(policy: HeartbeatPolicy) -> Self {
        Self {
            policy,
            interval_timer: None,
            timeout_timer: None,
            outstanding: None,
            last_ack_at: None,
            latency: None,
        }
    }

    /// Begin probing. Restarts cleanly if already running; a new
    /// connection never inherits the previous one's measurements.
    pub fn start<S: Scheduler>(&mut self, scheduler: &mut S) {
        self.stop(scheduler);
        if !self.policy.enabled {
            return;
        }
        self.interval_timer = Some(scheduler.schedule(self.policy.interval));
        debug!(interval_ms = self.policy.interval.as_millis() as u64, "Heartbeat started");
    }

    /// Cancel both timers and forget the outstanding probe and the last
    /// measured round-trip
    pub fn stop<S: Scheduler>(&mut self, scheduler: &mut S) {
        if let Some(id) = self.interval_timer.take() {
            scheduler.cancel(id);
        }
        if let Some(id) = self.timeout_timer.take() {
            scheduler.cancel(id);
        }
        self.outstanding = None;
        self.last_ack_at = None;
        self.latency = None;
    }

    /// Identify a timer owned by this monitor
    pub fn owns(&self, id: TimerId) -> Option<HeartbeatTimer> {
        if self.interval_timer == Some(id) {
            Some(HeartbeatTimer::Interval)
        } else if self.timeout_timer == Some(id) {
            Some(HeartbeatTimer::Timeout)
        } else {
            None
        }
    }

    /// Interval elapsed: re-arm and produce a probe unless one is still
    /// awaiting acknowledgment
    pub fn on_interval<S: Scheduler>(&mut self, scheduler: &mut S) -> Option<Envelope> {
        self.interval_timer = Some(scheduler.schedule(self.policy.interval));

        if self.outstanding.is_some() {
            trace!("Previous probe still outstanding, skipping");
            return None;
        }

        let now = scheduler.now_millis();
        self.outstanding = Some(now);
        self.timeout_timer = Some(scheduler.schedule(self.policy.timeout));
        Some(Envelope::ping(now))
    }

    /// PONG received. Returns the measured latency if it acknowledged the
    /// outstanding probe.
    pub fn on_ack<S: Scheduler>(&mut self, scheduler: &mut S, echoed: Option<i64>) -> Option<Duration> {
        let sent = self.outstanding?;
        if let Some(echoed) = echoed {
            if echoed != sent {
                debug!(echoed, expected = sent, "Ignoring PONG for another probe");
                return None;
            }
        }

        if let Some(id) = self.timeout_timer.take() {
            scheduler.cancel(id);
        }
        self.outstanding = None;

        let now = scheduler.now_millis();
        let latency = Duration::from_millis((now - sent).max(0) as u64);
        self.last_ack_at = Some(now);
        self.latency = Some(latency);
        Some(latency)
    }

    /// Timeout fired. Returns true if it belonged to the outstanding probe.
    pub fn on_timeout(&mut self, id: TimerId) -> bool {
        if self.timeout_timer != Some(id) {
            return false;
        }
        self.timeout_timer = None;
        self.outstanding.is_some()
    }

    /// Check if the interval timer is armed
    pub fn is_running(&self) -> bool {
        self.interval_timer.is_some()
    }

    /// Check if a probe awaits acknowledgment
    pub fn probe_outstanding(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Latency of the last acknowledged probe
    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }

    /// Time of the last acknowledgment, in epoch milliseconds
    pub fn last_ack_at(&self) -> Option<i64> {
        self.last_ack_at
    }

    /// Watchdog limit
    pub fn timeout(&self) -> Duration {
        self.policy.timeout
    }
}
