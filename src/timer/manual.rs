//! Simulated-clock scheduler

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{Scheduler, TimerId};

/// Scheduler driven by an explicit simulated clock
///
/// Cloning yields another handle to the same clock, so a test can keep one
/// handle while the connection manager owns the other. Nothing fires until
/// [`ManualScheduler::advance`] or [`ManualScheduler::fire_next`] is called.
#[derive(Debug, Clone)]
pub struct ManualScheduler {
    inner: Arc<Mutex<ManualClock>>,
}

#[derive(Debug)]
struct ManualClock {
    now: i64,
    next_id: u64,
    /// (deadline, id) ordered by deadline, then arming order
    queue: BTreeSet<(i64, TimerId)>,
    deadlines: HashMap<TimerId, i64>,
}

impl ManualClock {
    fn pop_due(&mut self, until: i64) -> Option<TimerId> {
        let &(deadline, id) = self.queue.iter().next()?;
        if deadline > until {
            return None;
        }
        self.queue.remove(&(deadline, id));
        self.deadlines.remove(&id);
        self.now = self.now.max(deadline);
        Some(id)
    }
}

impl ManualScheduler {
    /// Create a scheduler whose clock starts at `start_millis`
    pub fn new(start_millis: i64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualClock {
                now: start_millis,
                next_id: 0,
                queue: BTreeSet::new(),
                deadlines: HashMap::new(),
            })),
        }
    }

    /// Move the clock forward by `by`, handing every timer that comes due to
    /// `fire` in deadline order. Timers armed by `fire` itself are honoured
    /// if they fall inside the window.
    pub fn advance(&self, by: Duration, mut fire: impl FnMut(TimerId)) {
        let target = self.now_millis() + by.as_millis() as i64;
        loop {
            // Lock is released before `fire` so it may arm new timers.
            let due = self.inner.lock().pop_due(target);
            match due {
                Some(id) => fire(id),
                None => break,
            }
        }
        let mut clock = self.inner.lock();
        clock.now = clock.now.max(target);
    }

    /// Jump the clock to the earliest pending deadline and pop that timer
    pub fn fire_next(&self) -> Option<TimerId> {
        self.inner.lock().pop_due(i64::MAX)
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<i64> {
        self.inner.lock().queue.iter().next().map(|(deadline, _)| *deadline)
    }

    /// Number of armed timers
    pub fn pending_count(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Check whether a timer is still armed
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.inner.lock().deadlines.contains_key(&id)
    }

    /// Delay remaining until a timer fires
    pub fn remaining(&self, id: TimerId) -> Option<Duration> {
        let clock = self.inner.lock();
        clock
            .deadlines
            .get(&id)
            .map(|deadline| Duration::from_millis((deadline - clock.now).max(0) as u64))
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration) -> TimerId {
        let mut clock = self.inner.lock();
        clock.next_id += 1;
        let id = TimerId(clock.next_id);
        let deadline = clock.now + delay.as_millis() as i64;
        clock.queue.insert((deadline, id));
        clock.deadlines.insert(id, deadline);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        let mut clock = self.inner.lock();
        if let Some(deadline) = clock.deadlines.remove(&id) {
            clock.queue.remove(&(deadline, id));
        }
    }

    fn now_millis(&self) -> i64 {
        self.inner.lock().now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_in_deadline_order() {
        let mut scheduler = ManualScheduler::new(1_000);
        let late = scheduler.schedule(Duration::from_millis(300));
        let early = scheduler.schedule(Duration::from_millis(100));

        let mut fired = Vec::new();
        scheduler.advance(Duration::from_millis(500), |id| fired.push(id));

        assert_eq!(fired, vec![early, late]);
        assert_eq!(scheduler.now_millis(), 1_500);
    }

    #[test]
    fn test_nothing_fires_before_deadline() {
        let mut scheduler = ManualScheduler::default();
        let id = scheduler.schedule(Duration::from_millis(100));

        let mut fired = Vec::new();
        scheduler.advance(Duration::from_millis(99), |id| fired.push(id));
        assert!(fired.is_empty());
        assert_eq!(scheduler.remaining(id), Some(Duration::from_millis(1)));

        scheduler.advance(Duration::from_millis(1), |id| fired.push(id));
        assert_eq!(fired, vec![id]);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut scheduler = ManualScheduler::default();
        let id = scheduler.schedule(Duration::from_millis(10));
        scheduler.cancel(id);
        scheduler.cancel(id);
        scheduler.cancel(TimerId(999));

        assert_eq!(scheduler.pending_count(), 0);
        assert!(scheduler.fire_next().is_none());
    }

    #[test]
    fn test_timers_armed_while_firing() {
        let scheduler = ManualScheduler::default();
        let mut rearming = scheduler.clone();
        rearming.schedule(Duration::from_millis(100));

        let mut fired_at = Vec::new();
        scheduler.advance(Duration::from_millis(350), |_| {
            fired_at.push(rearming.now_millis());
            rearming.schedule(Duration::from_millis(100));
        });

        assert_eq!(fired_at, vec![100, 200, 300]);
        assert_eq!(scheduler.next_deadline(), Some(400));
    }

    #[test]
    fn test_fire_next_jumps_clock() {
        let mut scheduler = ManualScheduler::default();
        let id = scheduler.schedule(Duration::from_secs(30));
        assert_eq!(scheduler.fire_next(), Some(id));
        assert_eq!(scheduler.now_millis(), 30_000);
    }
}
