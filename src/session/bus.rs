//! Listener registry keyed by event name
//!
//! Listeners are invoked in registration order. A listener that returns an
//! error or panics is logged and skipped; the remaining listeners still run.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::state::ConnectionState;
use crate::error::Error;
use crate::protocol::{Envelope, MessageKind};

/// Shared listener callback
pub type Callback<E> = Arc<dyn Fn(&E) -> anyhow::Result<()> + Send + Sync>;

/// Wrap a closure as a [`Callback`]
pub fn callback<E, F>(f: F) -> Callback<E>
where
    F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Token identifying one registration, used to remove it again
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle<K> {
    key: K,
    id: u64,
}

impl<K> Handle<K> {
    /// Key the listener was registered under
    pub fn key(&self) -> &K {
        &self.key
    }
}

/// Ordered multimap of listeners
pub struct EventBus<K, E> {
    listeners: BTreeMap<K, Vec<(u64, Callback<E>)>>,
    next_id: u64,
}

impl<K: Ord + Clone + fmt::Display, E> EventBus<K, E> {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            listeners: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Register a listener under `key`
    pub fn on(&mut self, key: K, callback: Callback<E>) -> Handle<K> {
        self.next_id += 1;
        let id = self.next_id;
        self.listeners
            .entry(key.clone())
            .or_default()
            .push((id, callback));
        Handle { key, id }
    }

    /// Remove one registration. Returns false if it was already gone.
    pub fn off(&mut self, handle: &Handle<K>) -> bool {
        let Some(entries) = self.listeners.get_mut(&handle.key) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(id, _)| *id != handle.id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.listeners.remove(&handle.key);
        }
        removed
    }

    /// Remove every listener under `key`, returning how many there were
    pub fn off_all<Q>(&mut self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.listeners.remove(key).map(|e| e.len()).unwrap_or(0)
    }

    /// Invoke every listener under `key`, returning how many completed cleanly
    pub fn emit<Q>(&self, key: &Q, event: &E) -> usize
    where
        K: Borrow<Q>,
        Q: Ord + fmt::Display + ?Sized,
    {
        let Some(entries) = self.listeners.get(key) else {
            return 0;
        };
        entries
            .iter()
            .filter(|(_, callback)| invoke_guarded(key, callback, event))
            .count()
    }

    /// Number of listeners under `key`
    pub fn listener_count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.listeners.get(key).map(|e| e.len()).unwrap_or(0)
    }

    /// Keys with at least one listener, in order
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.listeners.keys()
    }

    /// Check if no listener is registered at all
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<K: Ord + Clone + fmt::Display, E> Default for EventBus<K, E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a listener, containing errors and panics
fn invoke_guarded<Q, E>(target: &Q, callback: &Callback<E>, event: &E) -> bool
where
    Q: fmt::Display + ?Sized,
{
    match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            let err = Error::callback_failed(target.to_string(), format!("{:#}", e));
            warn!(error = %err.format_for_log(), "Listener failed");
            false
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            let err = Error::callback_failed(target.to_string(), format!("panicked: {}", message));
            warn!(error = %err.format_for_log(), "Listener panicked");
            false
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Client Events
// ─────────────────────────────────────────────────────────────────

/// Name a client event listener registers under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventName {
    StateChange,
    Open,
    Connected,
    Close,
    Disconnected,
    Reconnecting,
    ReconnectExhausted,
    Error,
    ServerError,
    /// Every decoded inbound envelope
    Message,
    /// Inbound envelopes of one kind
    Kind(MessageKind),
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventName::StateChange => "state-change",
            EventName::Open => "open",
            EventName::Connected => "connected",
            EventName::Close => "close",
            EventName::Disconnected => "disconnected",
            EventName::Reconnecting => "reconnecting",
            EventName::ReconnectExhausted => "reconnect-exhausted",
            EventName::Error => "error",
            EventName::ServerError => "server-error",
            EventName::Message => "message",
            EventName::Kind(kind) => kind.type_name(),
        };
        f.write_str(name)
    }
}

/// Lifecycle notification or inbound message delivered to listeners
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// State transition
    StateChanged {
        old: ConnectionState,
        new: ConnectionState,
    },

    /// Transport opened
    Open,

    /// Session is live
    Connected { client_id: String },

    /// Transport closed
    Close { code: u16, reason: String },

    /// A live session was lost
    Disconnected { code: u16, reason: String },

    /// Reconnection attempt scheduled
    Reconnecting { attempt: u32, delay: Duration },

    /// Reconnection budget used up
    ReconnectExhausted { attempts: u32 },

    /// Transport error
    Error { message: String },

    /// ERROR frame received from the server
    ServerError(Envelope),

    /// Inbound envelope
    Message(Envelope),
}

impl ClientEvent {
    /// Name this event is emitted under. Inbound envelopes are additionally
    /// emitted under [`EventName::Kind`].
    pub fn name(&self) -> EventName {
        match self {
            ClientEvent::StateChanged { .. } => EventName::StateChange,
            ClientEvent::Open => EventName::Open,
            ClientEvent::Connected { .. } => EventName::Connected,
            ClientEvent::Close { .. } => EventName::Close,
            ClientEvent::Disconnected { .. } => EventName::Disconnected,
            ClientEvent::Reconnecting { .. } => EventName::Reconnecting,
            ClientEvent::ReconnectExhausted { .. } => EventName::ReconnectExhausted,
            ClientEvent::Error { .. } => EventName::Error,
            ClientEvent::ServerError(_) => EventName::ServerError,
            ClientEvent::Message(_) => EventName::Message,
        }
    }

    /// Inbound envelope carried by this event
    pub fn envelope(&self) -> Option<&Envelope> {
        match self {
            ClientEvent::ServerError(envelope) | ClientEvent::Message(envelope) => Some(envelope),
            _ => None,
        }
    }
}

/// Registration on the client event bus
pub type ListenerHandle = Handle<EventName>;
