//! Reconnection scheduling
//!
//! Delays grow geometrically from the initial interval by the backoff rate
//! and are capped at the maximum interval. There is no jitter, so the delay
//! sequence is fully determined by the policy.

use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};

/// Automatic reconnection settings
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Reconnect after an abnormal close
    pub enabled: bool,

    /// Delay before the first attempt
    pub initial_interval: Duration,

    /// Upper bound on any delay
    pub max_interval: Duration,

    /// Attempt budget, `None` for unlimited
    pub max_attempts: Option<u32>,

    /// Growth factor between consecutive delays
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_interval: Duration::from_millis(1000),
            max_interval: Duration::from_millis(30_000),
            max_attempts: None,
            multiplier: 1.5,
        }
    }
}

/// Outcome of asking for the next attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Try again after `delay`; `attempt` is 1-based
    Retry { attempt: u32, delay: Duration },

    /// Budget used up after `attempts` attempts
    Exhausted { attempts: u32 },
}

/// Attempt counter and delay sequence for one session
pub struct ReconnectScheduler {
    policy: ReconnectPolicy,
    backoff: ExponentialBackoff,
    attempts: u32,
}

impl ReconnectScheduler {
    /// Create a scheduler with a fresh attempt budget
    pub fn new(policy: ReconnectPolicy) -> Self {
        let backoff = ExponentialBackoff {
            current_interval: policy.initial_interval,
            initial_interval: policy.initial_interval,
            randomization_factor: 0.0,
            multiplier: policy.multiplier,
            max_interval: policy.max_interval,
            max_elapsed_time: None,
            ..Default::default()
        };
        Self {
            policy,
            backoff,
            attempts: 0,
        }
    }

    /// Consume one attempt from the budget
    pub fn next_attempt(&mut self) -> ReconnectDecision {
        if let Some(max) = self.policy.max_attempts {
            if self.attempts >= max {
                return ReconnectDecision::Exhausted {
                    attempts: self.attempts,
                };
            }
        }

        self.attempts += 1;
        let delay = self
            .backoff
            .next_backoff()
            .map(round_to_millis)
            .unwrap_or(self.policy.max_interval)
            .min(self.policy.max_interval);

        ReconnectDecision::Retry {
            attempt: self.attempts,
            delay,
        }
    }

    /// Restore the full budget and the initial delay
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.backoff.reset();
    }

    /// Attempts consumed since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay the next attempt would use
    pub fn current_interval(&self) -> Duration {
        round_to_millis(self.backoff.current_interval)
    }

    /// Reconnection policy
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }
}

/// Round to whole milliseconds, absorbing sub-millisecond float error
fn round_to_millis(d: Duration) -> Duration {
    Duration::from_millis(((d.as_nanos() + 500_000) / 1_000_000) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delays(scheduler: &mut ReconnectScheduler, n: usize) -> Vec<u64> {
        (0..n)
            .map(|_| match scheduler.next_attempt() {
                ReconnectDecision::Retry { delay, .. } => delay.as_millis() as u64,
                ReconnectDecision::Exhausted { .. } => panic!("unexpected exhaustion"),
            })
            .collect()
    }

    #[test]
    fn test_default_delay_sequence() {
        let mut scheduler = ReconnectScheduler::new(ReconnectPolicy::default());
        assert_eq!(
            delays(&mut scheduler, 6),
            vec![1000, 1500, 2250, 3375, 5063, 7594]
        );
    }

    #[test]
    fn test_delays_are_capped() {
        let mut scheduler = ReconnectScheduler::new(ReconnectPolicy {
            initial_interval: Duration::from_millis(1000),
            max_interval: Duration::from_millis(4000),
            multiplier: 2.0,
            ..Default::default()
        });
        assert_eq!(
            delays(&mut scheduler, 5),
            vec![1000, 2000, 4000, 4000, 4000]
        );
    }

    #[test]
    fn test_budget_exhaustion() {
        let mut scheduler = ReconnectScheduler::new(ReconnectPolicy {
            max_attempts: Some(2),
            ..Default::default()
        });
        assert!(matches!(scheduler.next_attempt(), ReconnectDecision::Retry { attempt: 1, .. }));
        assert!(matches!(scheduler.next_attempt(), ReconnectDecision::Retry { attempt: 2, .. }));
        assert_eq!(
            scheduler.next_attempt(),
            ReconnectDecision::Exhausted { attempts: 2 }
        );
        assert_eq!(scheduler.attempts(), 2);
    }

    #[test]
    fn test_zero_budget_never_retries() {
        let mut scheduler = ReconnectScheduler::new(ReconnectPolicy {
            max_attempts: Some(0),
            ..Default::default()
        });
        assert_eq!(
            scheduler.next_attempt(),
            ReconnectDecision::Exhausted { attempts: 0 }
        );
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut scheduler = ReconnectScheduler::new(ReconnectPolicy::default());
        delays(&mut scheduler, 3);
        assert_eq!(scheduler.current_interval(), Duration::from_millis(3375));

        scheduler.reset();
        assert_eq!(scheduler.attempts(), 0);
        assert_eq!(delays(&mut scheduler, 2), vec![1000, 1500]);
    }

    #[test]
    fn test_flat_backoff() {
        let mut scheduler = ReconnectScheduler::new(ReconnectPolicy {
            multiplier: 1.0,
            ..Default::default()
        });
        assert_eq!(delays(&mut scheduler, 3), vec![1000, 1000, 1000]);
    }
}
