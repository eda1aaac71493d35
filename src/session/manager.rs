//! Connection manager
//!
//! Owns the connection state machine and every per-session component. All
//! inputs (application calls, transport events, timer firings) arrive as
//! `&mut self` method calls, so each one is handled to completion before the
//! next is looked at.
//!
//! ```text
//!  Disconnected ──connect──▶ Connecting ──open──▶ Connected
//!       ▲                     │   ▲                 │
//!       │ exhausted /         │   │ retry timer     │ abnormal close /
//!       │ no reconnect        ▼   │                 │ heartbeat timeout
//!       └──────────────── Reconnecting ◀────────────┘
//!
//!  any ──disconnect / close 1000──▶ Closed
//! ```

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, trace, warn};
use url::Url;

use super::bus::{Callback, ClientEvent, EventBus, EventName, ListenerHandle};
use super::dispatch::Dispatcher;
use super::heartbeat::{HeartbeatMonitor, HeartbeatTimer};
use super::queue::OutboundQueue;
use super::reconnect::{ReconnectDecision, ReconnectScheduler};
use super::registry::{SubscriptionHandle, SubscriptionRegistry};
use super::state::{ClientConfig, ClientSession, ConnectionState};
use crate::error::{Error, Result};
use crate::protocol::{
    CloseClass, Envelope, MessageKind, ABNORMAL_CLOSURE, HEARTBEAT_TIMEOUT, NORMAL_CLOSURE,
};
use crate::timer::{Scheduler, TimerId};
use crate::transport::{ConnectionId, Transport, TransportEvent};

/// Point-in-time view of a manager, cheap to copy out for status queries
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionStatus {
    pub state: ConnectionState,
    pub client_id: String,
    pub reconnect_attempts: u32,
    pub queued: usize,
    pub topics: Vec<String>,
    pub latency: Option<Duration>,
    pub last_heartbeat_ack: Option<i64>,
}

/// Single-owner session state machine over a transport and a scheduler
pub struct ConnectionManager<T: Transport, S: Scheduler> {
    pub(super) session: ClientSession,
    pub(super) endpoint: Url,
    pub(super) state: ConnectionState,
    pub(super) transport: T,
    pub(super) scheduler: S,
    /// Connection whose events are currently honoured
    pub(super) live: Option<ConnectionId>,
    next_connection: u64,
    pub(super) reconnect: ReconnectScheduler,
    pub(super) reconnect_timer: Option<TimerId>,
    pub(super) heartbeat: HeartbeatMonitor,
    pub(super) queue: OutboundQueue,
    pub(super) registry: SubscriptionRegistry,
    pub(super) bus: EventBus<EventName, ClientEvent>,
    pub(super) dispatcher: Dispatcher,
}

impl<T: Transport, S: Scheduler> ConnectionManager<T, S> {
    /// Create a manager with a freshly generated client id
    pub fn new(config: ClientConfig, transport: T, scheduler: S) -> Result<Self> {
        let session = ClientSession::new(config, scheduler.now_millis());
        Self::with_session(session, transport, scheduler)
    }

    /// Create a manager for an existing session identity
    pub fn with_session(session: ClientSession, transport: T, scheduler: S) -> Result<Self> {
        let endpoint = session.endpoint()?;
        let config = session.config();

        Ok(Self {
            endpoint,
            state: ConnectionState::Disconnected,
            transport,
            scheduler,
            live: None,
            next_connection: 0,
            reconnect: ReconnectScheduler::new(config.reconnect.clone()),
            reconnect_timer: None,
            heartbeat: HeartbeatMonitor::new(config.heartbeat.clone()),
            queue: OutboundQueue::new(config.queue.capacity),
            registry: SubscriptionRegistry::new(),
            bus: EventBus::new(),
            dispatcher: Dispatcher::new(),
            session,
        })
    }

    // ─── Queries ───

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn client_id(&self) -> &str {
        self.session.client_id()
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    /// Endpoint URL including the identity query parameters
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect.attempts()
    }

    pub fn heartbeat(&self) -> &HeartbeatMonitor {
        &self.heartbeat
    }

    pub fn topics(&self) -> Vec<String> {
        self.registry.topics()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Snapshot of the observable session state
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            client_id: self.client_id().to_string(),
            reconnect_attempts: self.reconnect.attempts(),
            queued: self.queue.len(),
            topics: self.registry.topics(),
            latency: self.heartbeat.latency(),
            last_heartbeat_ack: self.heartbeat.last_ack_at(),
        }
    }

    // ─── Application Operations ───

    /// Open a connection. No-op while connecting or connected.
    ///
    /// Called from `Disconnected` or `Closed` this restores the full
    /// reconnection budget.
    pub fn connect(&mut self) {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                debug!(state = %self.state, "Connect ignored");
                return;
            }
            ConnectionState::Disconnected | ConnectionState::Closed => self.reconnect.reset(),
            ConnectionState::Reconnecting => {}
        }
        self.cancel_reconnect();
        self.open_connection();
    }

    /// Close the connection for good. No automatic reconnection follows.
    pub fn disconnect(&mut self) {
        info!(client_id = %self.client_id(), "Disconnecting");
        self.heartbeat.stop(&mut self.scheduler);
        self.cancel_reconnect();

        let had_connection = match self.live.take() {
            Some(conn) => {
                self.transport.close(conn, NORMAL_CLOSURE, "Client disconnect");
                true
            }
            None => false,
        };

        self.set_state(ConnectionState::Closed);
        if had_connection {
            self.emit(ClientEvent::Close {
                code: NORMAL_CLOSURE,
                reason: "Client disconnect".to_string(),
            });
        }
    }

    /// Send a message. Returns true if it was written to the transport now;
    /// otherwise it was queued (if queuing is enabled) or dropped.
    pub fn send(&mut self, kind: MessageKind, payload: Value, topic: Option<String>) -> bool {
        let envelope = Envelope::new(kind, payload, topic, self.scheduler.now_millis());
        self.send_envelope(envelope)
    }

    /// Send a prepared envelope, see [`ConnectionManager::send`]
    pub fn send_envelope(&mut self, envelope: Envelope) -> bool {
        if self.state == ConnectionState::Connected {
            return self.transmit(&envelope);
        }

        if !self.session.config().queue.enabled {
            debug!(kind = %envelope.kind, state = %self.state, "Not connected, message dropped");
            return false;
        }

        debug!(kind = %envelope.kind, state = %self.state, "Not connected, message queued");
        if let Some(evicted) = self.queue.push(envelope) {
            warn!(
                kind = %evicted.kind,
                capacity = self.queue.capacity(),
                "Outbound queue full, dropped oldest message"
            );
        }
        false
    }

    /// Subscribe to a topic
    pub fn subscribe(&mut self, topic: &str, callback: Callback<Envelope>) -> SubscriptionHandle {
        let now = self.scheduler.now_millis();
        let (handle, request) = self.registry.subscribe(topic, callback, self.is_connected(), now);
        if let Some(request) = request {
            self.transmit(&request);
        }
        debug!(topic, "Subscribed");
        handle
    }

    /// Remove one subscription. Returns false if it was already removed.
    pub fn unsubscribe(&mut self, handle: &SubscriptionHandle) -> bool {
        let now = self.scheduler.now_millis();
        let (removed, request) = self.registry.unsubscribe(handle, self.is_connected(), now);
        if let Some(request) = request {
            self.transmit(&request);
        }
        removed
    }

    /// Remove every subscription on a topic
    pub fn unsubscribe_topic(&mut self, topic: &str) -> bool {
        let now = self.scheduler.now_millis();
        let (removed, request) = self.registry.unsubscribe_topic(topic, self.is_connected(), now);
        if let Some(request) = request {
            self.transmit(&request);
        }
        removed
    }

    /// Register an event listener
    pub fn on(&mut self, name: EventName, callback: Callback<ClientEvent>) -> ListenerHandle {
        self.bus.on(name, callback)
    }

    /// Remove an event listener. Returns false if it was already removed.
    pub fn off(&mut self, handle: &ListenerHandle) -> bool {
        self.bus.off(handle)
    }

    // ─── Transport Events ───

    /// Route one transport event to its handler
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened(conn) => self.handle_open(conn),
            TransportEvent::Frame(conn, text) => self.handle_frame(conn, &text),
            TransportEvent::Closed { conn, code, reason } => self.handle_close(conn, code, &reason),
            TransportEvent::Error { conn, message } => self.handle_error(conn, &message),
        }
    }

    /// Transport reports the connection is up
    pub fn handle_open(&mut self, conn: ConnectionId) {
        if self.live != Some(conn) || self.state != ConnectionState::Connecting {
            trace!(conn = %conn, "Ignoring open from stale connection");
            return;
        }

        info!(conn = %conn, client_id = %self.client_id(), "Connected");
        self.reconnect.reset();
        self.heartbeat.start(&mut self.scheduler);

        let now = self.scheduler.now_millis();
        for request in self.registry.resubscribe_all(now) {
            self.transmit(&request);
        }

        let queued = self.queue.drain();
        if !queued.is_empty() {
            debug!(count = queued.len(), "Flushing queued messages");
        }
        for envelope in &queued {
            self.transmit(envelope);
        }

        self.set_state(ConnectionState::Connected);
        self.emit(ClientEvent::Open);
        self.emit(ClientEvent::Connected {
            client_id: self.client_id().to_string(),
        });
    }

    /// Transport reports the connection ended
    pub fn handle_close(&mut self, conn: ConnectionId, code: u16, reason: &str) {
        if self.live != Some(conn) {
            trace!(conn = %conn, code, "Ignoring close from stale connection");
            return;
        }
        self.live = None;
        self.connection_lost(code, reason);
    }

    /// Transport reports a non-terminal error
    pub fn handle_error(&mut self, conn: ConnectionId, message: &str) {
        if self.live != Some(conn) {
            trace!(conn = %conn, "Ignoring error from stale connection");
            return;
        }
        warn!(conn = %conn, error = %message, "Transport error");
        self.emit(ClientEvent::Error {
            message: message.to_string(),
        });
    }

    /// A scheduled timer fired. Unknown ids belong to cancelled timers and
    /// are ignored.
    pub fn handle_timer(&mut self, id: TimerId) {
        if self.reconnect_timer == Some(id) {
            self.reconnect_timer = None;
            if self.state == ConnectionState::Reconnecting {
                self.open_connection();
            }
            return;
        }

        match self.heartbeat.owns(id) {
            Some(HeartbeatTimer::Interval) => {
                if let Some(ping) = self.heartbeat.on_interval(&mut self.scheduler) {
                    trace!(ts = ping.timestamp, "Sending heartbeat probe");
                    self.transmit(&ping);
                }
            }
            Some(HeartbeatTimer::Timeout) => {
                if self.heartbeat.on_timeout(id) {
                    self.heartbeat_timed_out();
                }
            }
            None => trace!(timer = %id, "Ignoring stale timer"),
        }
    }

    // ─── Internals ───

    fn open_connection(&mut self) {
        self.next_connection += 1;
        let conn = ConnectionId(self.next_connection);
        self.live = Some(conn);
        self.set_state(ConnectionState::Connecting);

        debug!(conn = %conn, url = %self.endpoint, "Opening connection");
        if let Err(e) = self.transport.open(conn, &self.endpoint) {
            warn!(conn = %conn, error = %e.format_for_log(), "Failed to open connection");
            self.emit(ClientEvent::Error {
                message: e.to_string(),
            });
            if self.live == Some(conn) {
                self.live = None;
                self.connection_lost(ABNORMAL_CLOSURE, &e.to_string());
            }
        }
    }

    /// Common path for every loss of the live connection
    fn connection_lost(&mut self, code: u16, reason: &str) {
        let was_connected = self.state == ConnectionState::Connected;
        self.heartbeat.stop(&mut self.scheduler);

        let class = CloseClass::of(code);
        if !class.may_reconnect() {
            info!(code, reason, "Connection closed normally");
            self.set_state(ConnectionState::Closed);
        } else if self.session.config().reconnect.enabled && self.state != ConnectionState::Closed {
            info!(code, reason, "Connection lost");
            self.schedule_reconnect();
        } else {
            info!(code, reason, "Connection lost, not reconnecting");
            self.set_state(ConnectionState::Disconnected);
        }

        self.emit(ClientEvent::Close {
            code,
            reason: reason.to_string(),
        });
        if was_connected {
            self.emit(ClientEvent::Disconnected {
                code,
                reason: reason.to_string(),
            });
        }
    }

    fn schedule_reconnect(&mut self) {
        match self.reconnect.next_attempt() {
            ReconnectDecision::Retry { attempt, delay } => {
                self.set_state(ConnectionState::Reconnecting);
                self.reconnect_timer = Some(self.scheduler.schedule(delay));
                info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
                self.emit(ClientEvent::Reconnecting { attempt, delay });
            }
            ReconnectDecision::Exhausted { attempts } => {
                let err = Error::ReconnectExhausted { attempts };
                warn!(error = %err.format_for_log(), "Giving up on reconnection");
                self.set_state(ConnectionState::Disconnected);
                self.emit(ClientEvent::ReconnectExhausted { attempts });
            }
        }
    }

    fn heartbeat_timed_out(&mut self) {
        let err = Error::HeartbeatTimeout {
            timeout_ms: self.heartbeat.timeout().as_millis() as u64,
        };
        warn!(error = %err.format_for_log(), "Forcing connection closed");

        if let Some(conn) = self.live.take() {
            self.transport.close(conn, HEARTBEAT_TIMEOUT, "Heartbeat timeout");
            self.connection_lost(HEARTBEAT_TIMEOUT, "Heartbeat timeout");
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(id) = self.reconnect_timer.take() {
            self.scheduler.cancel(id);
        }
    }

    /// Write to the live connection regardless of state
    pub(super) fn transmit(&mut self, envelope: &Envelope) -> bool {
        let Some(conn) = self.live else {
            return false;
        };

        let text = match envelope.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(kind = %envelope.kind, error = %e.format_for_log(), "Failed to encode message");
                return false;
            }
        };

        match self.transport.send(conn, text) {
            Ok(()) => true,
            Err(e) => {
                warn!(conn = %conn, kind = %envelope.kind, error = %e.format_for_log(), "Send failed");
                self.emit(ClientEvent::Error {
                    message: e.to_string(),
                });
                false
            }
        }
    }

    pub(super) fn set_state(&mut self, new: ConnectionState) {
        let old = self.state;
        if old == new {
            return;
        }
        self.state = new;
        debug!(old = %old, new = %new, "State change");
        self.emit(ClientEvent::StateChanged { old, new });
    }

    pub(super) fn emit(&self, event: ClientEvent) {
        self.bus.emit(&event.name(), &event);
    }
}
