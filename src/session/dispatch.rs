//! Inbound frame dispatch
//!
//! Every inbound frame is decoded, run through the built-in handler for its
//! kind (if any), fanned out to the subscribers of its topic, and finally
//! published on the event bus both as a generic message and under its kind.
//! Frames that fail to decode are logged and dropped.

use std::collections::HashMap;

use tracing::{debug, error, info, trace, warn};

use super::bus::{ClientEvent, EventName};
use super::manager::ConnectionManager;
use crate::error::Result;
use crate::protocol::{Envelope, MessageKind};
use crate::timer::Scheduler;
use crate::transport::{ConnectionId, Transport};

/// Built-in reaction to a control message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// Answer a server PING with a PONG echoing its payload
    ReplyPong,
    /// Acknowledge the outstanding heartbeat probe
    HeartbeatAck,
    /// Server confirmed the session
    ConnectConfirmed,
    /// Server confirmed a SUBSCRIBE
    SubscribeConfirmed,
    /// Server confirmed an UNSUBSCRIBE
    UnsubscribeConfirmed,
    /// Server reported an error
    ServerError,
}

/// Decoder plus the kind-to-builtin table, built once per session
#[derive(Debug)]
pub struct Dispatcher {
    builtins: HashMap<MessageKind, Builtin>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let builtins = HashMap::from([
            (MessageKind::Ping, Builtin::ReplyPong),
            (MessageKind::Pong, Builtin::HeartbeatAck),
            (MessageKind::Connect, Builtin::ConnectConfirmed),
            (MessageKind::Subscribed, Builtin::SubscribeConfirmed),
            (MessageKind::Unsubscribed, Builtin::UnsubscribeConfirmed),
            (MessageKind::Error, Builtin::ServerError),
        ]);
        Self { builtins }
    }

    /// Decode one text frame
    pub fn decode(&self, frame: &str) -> Result<Envelope> {
        Envelope::from_json(frame)
    }

    /// Built-in handler for a kind
    pub fn builtin(&self, kind: MessageKind) -> Option<Builtin> {
        self.builtins.get(&kind).copied()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport, S: Scheduler> ConnectionManager<T, S> {
    /// Transport delivered a text frame
    pub fn handle_frame(&mut self, conn: ConnectionId, frame: &str) {
        if self.live != Some(conn) {
            trace!(conn = %conn, "Ignoring frame from stale connection");
            return;
        }

        let envelope = match self.dispatcher.decode(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(conn = %conn, len = frame.len(), error = %e.format_for_log(), "Dropping malformed frame");
                return;
            }
        };
        trace!(kind = %envelope.kind, topic = ?envelope.topic, "Frame received");

        if let Some(builtin) = self.dispatcher.builtin(envelope.kind) {
            self.run_builtin(builtin, &envelope);
        }

        // An empty topic is the same as none
        if let Some(topic) = envelope.topic.as_deref().filter(|t| !t.is_empty()) {
            self.registry.dispatch(topic, &envelope);
        }

        let kind = envelope.kind;
        let event = ClientEvent::Message(envelope);
        self.bus.emit(&EventName::Message, &event);
        self.bus.emit(&EventName::Kind(kind), &event);
    }

    fn run_builtin(&mut self, builtin: Builtin, envelope: &Envelope) {
        match builtin {
            Builtin::ReplyPong => {
                let pong = Envelope::pong(envelope.payload.clone(), self.scheduler.now_millis());
                self.transmit(&pong);
            }
            Builtin::HeartbeatAck => {
                let echoed = envelope.echoed_timestamp();
                if let Some(latency) = self.heartbeat.on_ack(&mut self.scheduler, echoed) {
                    debug!(latency_ms = latency.as_millis() as u64, "Heartbeat acknowledged");
                }
            }
            Builtin::ConnectConfirmed => {
                info!(payload = %envelope.payload, "Server confirmed connection");
            }
            Builtin::SubscribeConfirmed => {
                debug!(topic = ?envelope.topic, "Subscription confirmed");
            }
            Builtin::UnsubscribeConfirmed => {
                debug!(topic = ?envelope.topic, "Unsubscription confirmed");
            }
            Builtin::ServerError => {
                error!(
                    code = envelope.error_code.as_deref().unwrap_or("-"),
                    message = envelope.error_message.as_deref().unwrap_or("-"),
                    "Server reported an error"
                );
                self.emit(ClientEvent::ServerError(envelope.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table() {
        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.builtin(MessageKind::Ping), Some(Builtin::ReplyPong));
        assert_eq!(dispatcher.builtin(MessageKind::Pong), Some(Builtin::HeartbeatAck));
        assert_eq!(dispatcher.builtin(MessageKind::Error), Some(Builtin::ServerError));
        assert_eq!(dispatcher.builtin(MessageKind::TaskStatus), None);
        assert_eq!(dispatcher.builtin(MessageKind::Subscribe), None);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let dispatcher = Dispatcher::new();
        assert!(dispatcher.decode("{{").is_err());
        assert_eq!(
            dispatcher.decode(r#"{"type":"ALERT","topic":"alert"}"#).unwrap().kind,
            MessageKind::Alert
        );
    }
}
