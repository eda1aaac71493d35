//! Topic subscriptions
//!
//! Tracks local subscribers per topic and decides when the server needs to
//! hear about it: SUBSCRIBE goes out only when a topic gains its first local
//! subscriber, UNSUBSCRIBE only when it loses its last, and in both cases
//! only while connected. On every (re)connection the full topic set is
//! announced again.

use super::bus::{Callback, EventBus, Handle};
use crate::protocol::Envelope;

/// Registration on a topic
pub type SubscriptionHandle = Handle<String>;

/// Subscribers keyed by topic
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscribers: EventBus<String, Envelope>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Returns the SUBSCRIBE request to transmit, if any.
    pub fn subscribe(
        &mut self,
        topic: &str,
        callback: Callback<Envelope>,
        connected: bool,
        now_millis: i64,
    ) -> (SubscriptionHandle, Option<Envelope>) {
        let first = self.subscribers.listener_count(topic) == 0;
        let handle = self.subscribers.on(topic.to_string(), callback);
        let request = (first && connected).then(|| Envelope::subscribe(topic, now_millis));
        (handle, request)
    }

    /// Remove one subscriber. Returns whether it was registered and the
    /// UNSUBSCRIBE request to transmit, if any.
    pub fn unsubscribe(
        &mut self,
        handle: &SubscriptionHandle,
        connected: bool,
        now_millis: i64,
    ) -> (bool, Option<Envelope>) {
        if !self.subscribers.off(handle) {
            return (false, None);
        }
        let topic = handle.key();
        let emptied = self.subscribers.listener_count(topic.as_str()) == 0;
        let request = (emptied && connected).then(|| Envelope::unsubscribe(topic.as_str(), now_millis));
        (true, request)
    }

    /// Remove every subscriber of a topic. Returns whether any existed and
    /// the UNSUBSCRIBE request to transmit, if any.
    pub fn unsubscribe_topic(
        &mut self,
        topic: &str,
        connected: bool,
        now_millis: i64,
    ) -> (bool, Option<Envelope>) {
        if self.subscribers.off_all(topic) == 0 {
            return (false, None);
        }
        let request = connected.then(|| Envelope::unsubscribe(topic, now_millis));
        (true, request)
    }

    /// SUBSCRIBE requests for every topic with subscribers, in topic order
    pub fn resubscribe_all(&self, now_millis: i64) -> Vec<Envelope> {
        self.subscribers
            .keys()
            .map(|topic| Envelope::subscribe(topic.as_str(), now_millis))
            .collect()
    }

    /// Deliver an inbound envelope to the topic's subscribers
    pub fn dispatch(&self, topic: &str, envelope: &Envelope) -> usize {
        self.subscribers.emit(topic, envelope)
    }

    /// Topics with at least one subscriber, in order
    pub fn topics(&self) -> Vec<String> {
        self.subscribers.keys().cloned().collect()
    }

    /// Number of subscribers on a topic
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers.listener_count(topic)
    }
}
