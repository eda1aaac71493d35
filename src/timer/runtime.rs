//! Tokio-backed scheduler

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use super::{Scheduler, TimerId};

/// Scheduler spawning one sleeping task per timer
///
/// Firings are delivered on the receiver returned by [`TokioScheduler::new`].
/// Must be used from within a tokio runtime.
pub struct TokioScheduler {
    fired_tx: mpsc::UnboundedSender<TimerId>,
    timers: HashMap<TimerId, JoinHandle<()>>,
    next_id: u64,
}

impl TokioScheduler {
    /// Create a scheduler and the receiver its firings arrive on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerId>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            fired_tx,
            timers: HashMap::new(),
            next_id: 0,
        };
        (scheduler, fired_rx)
    }

    /// Number of timers that have not fired or been cancelled yet
    pub fn armed_count(&self) -> usize {
        self.timers.values().filter(|h| !h.is_finished()).count()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration) -> TimerId {
        self.timers.retain(|_, handle| !handle.is_finished());

        self.next_id += 1;
        let id = TimerId(self.next_id);
        let fired_tx = self.fired_tx.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = fired_tx.send(id);
        });
        self.timers.insert(id, handle);

        trace!(timer = %id, delay_ms = delay.as_millis() as u64, "Timer armed");
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
            trace!(timer = %id, "Timer cancelled");
        }
    }

    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}
