//! Bounded outbound queue
//!
//! Holds envelopes sent while the session is not connected. When full, the
//! oldest entry is evicted to make room for the newest.

use std::collections::VecDeque;

use crate::protocol::Envelope;

/// Outbound queue settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePolicy {
    /// Buffer sends made while disconnected
    pub enabled: bool,

    /// Maximum buffered envelopes
    pub capacity: usize,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 100,
        }
    }
}

/// FIFO of envelopes awaiting a live connection
#[derive(Debug)]
pub struct OutboundQueue {
    capacity: usize,
    items: VecDeque<Envelope>,
}

impl OutboundQueue {
    /// Create an empty queue holding at most `capacity` envelopes
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    /// Append an envelope, returning the one evicted to make room
    pub fn push(&mut self, envelope: Envelope) -> Option<Envelope> {
        if self.capacity == 0 {
            return Some(envelope);
        }
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(envelope);
        evicted
    }

    /// Remove and return every queued envelope in send order
    pub fn drain(&mut self) -> Vec<Envelope> {
        self.items.drain(..).collect()
    }

    /// Number of queued envelopes
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of queued envelopes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop everything queued
    pub fn clear(&mut self) {
        self.items.clear();
    }
}
