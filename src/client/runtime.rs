//! Tokio-hosted session client
//!
//! The manager lives on a single driver task. Application calls reach it as
//! commands over a channel; transport events and timer firings arrive on
//! their own channels. A shared snapshot answers state queries without a
//! round trip.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::protocol::{Envelope, MessageKind};
use crate::session::{
    Callback, ClientConfig, ClientEvent, ConnectionManager, ConnectionState, EventName,
    ListenerHandle, SessionStatus, SubscriptionHandle,
};
use crate::timer::{TimerId, TokioScheduler};
use crate::transport::{TransportEvent, WsTransport};

type Manager = ConnectionManager<WsTransport, TokioScheduler>;

// ─────────────────────────────────────────────────────────────────
// Command Channel
// ─────────────────────────────────────────────────────────────────

/// Commands processed by the driver task
pub enum ClientCommand {
    /// Open the connection
    Connect,

    /// Close the connection for good
    Disconnect,

    /// Send or queue a message
    Send {
        kind: MessageKind,
        payload: Value,
        topic: Option<String>,
        reply: oneshot::Sender<bool>,
    },

    /// Subscribe to a topic
    Subscribe {
        topic: String,
        callback: Callback<Envelope>,
        reply: oneshot::Sender<SubscriptionHandle>,
    },

    /// Remove one subscription
    Unsubscribe {
        handle: SubscriptionHandle,
        reply: oneshot::Sender<bool>,
    },

    /// Remove every subscription on a topic
    UnsubscribeTopic {
        topic: String,
        reply: oneshot::Sender<bool>,
    },

    /// Register an event listener
    On {
        name: EventName,
        callback: Callback<ClientEvent>,
        reply: oneshot::Sender<ListenerHandle>,
    },

    /// Remove an event listener
    Off {
        handle: ListenerHandle,
        reply: oneshot::Sender<bool>,
    },

    /// Disconnect and stop the driver task
    Shutdown(oneshot::Sender<()>),
}

// ─────────────────────────────────────────────────────────────────
// Pulse Client
// ─────────────────────────────────────────────────────────────────

/// Handle to a running session
#[derive(Clone)]
pub struct PulseClient {
    command_tx: mpsc::UnboundedSender<ClientCommand>,
    status: Arc<RwLock<SessionStatus>>,
    driver: Arc<parking_lot::Mutex<Option<JoinHandle<()>>>>,
}

impl PulseClient {
    /// Start the driver task. Must be called from within a tokio runtime.
    ///
    /// The session starts `Disconnected`; call [`PulseClient::connect`].
    pub fn start(config: ClientConfig) -> Result<Self> {
        let (transport, transport_rx) = WsTransport::new(config.connect_timeout);
        let (scheduler, timer_rx) = TokioScheduler::new();
        let manager = ConnectionManager::new(config, transport, scheduler)?;

        info!(client_id = %manager.client_id(), url = %manager.endpoint(), "Starting client");

        let status = Arc::new(RwLock::new(manager.status()));
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let driver = tokio::spawn(run_driver(
            manager,
            command_rx,
            transport_rx,
            timer_rx,
            status.clone(),
        ));

        Ok(Self {
            command_tx,
            status,
            driver: Arc::new(parking_lot::Mutex::new(Some(driver))),
        })
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.status.read().state
    }

    /// Check if the session is connected
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Stable client id
    pub fn client_id(&self) -> String {
        self.status.read().client_id.clone()
    }

    /// Snapshot of the session as of the last processed input
    pub fn status(&self) -> SessionStatus {
        self.status.read().clone()
    }

    /// Open the connection
    pub fn connect(&self) -> Result<()> {
        self.command(ClientCommand::Connect)
    }

    /// Close the connection for good
    pub fn disconnect(&self) -> Result<()> {
        self.command(ClientCommand::Disconnect)
    }

    /// Send a message. Resolves to true if it was written immediately.
    pub async fn send(&self, kind: MessageKind, payload: Value, topic: Option<String>) -> Result<bool> {
        self.request(|reply| ClientCommand::Send {
            kind,
            payload,
            topic,
            reply,
        })
        .await
    }

    /// Subscribe to a topic
    pub async fn subscribe(&self, topic: impl Into<String>, callback: Callback<Envelope>) -> Result<SubscriptionHandle> {
        let topic = topic.into();
        self.request(|reply| ClientCommand::Subscribe { topic, callback, reply })
            .await
    }

    /// Remove one subscription
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<bool> {
        self.request(|reply| ClientCommand::Unsubscribe { handle, reply })
            .await
    }

    /// Remove every subscription on a topic
    pub async fn unsubscribe_topic(&self, topic: impl Into<String>) -> Result<bool> {
        let topic = topic.into();
        self.request(|reply| ClientCommand::UnsubscribeTopic { topic, reply })
            .await
    }

    /// Register an event listener
    pub async fn on(&self, name: EventName, callback: Callback<ClientEvent>) -> Result<ListenerHandle> {
        self.request(|reply| ClientCommand::On { name, callback, reply })
            .await
    }

    /// Remove an event listener
    pub async fn off(&self, handle: ListenerHandle) -> Result<bool> {
        self.request(|reply| ClientCommand::Off { handle, reply })
            .await
    }

    /// Disconnect and wait for the driver task to finish
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        if self.command_tx.send(ClientCommand::Shutdown(reply)).is_ok() {
            let _ = done.await;
        }

        let driver = self.driver.lock().take();
        if let Some(driver) = driver {
            driver
                .await
                .map_err(|e| Error::Internal(format!("driver task failed: {}", e)))?;
        }
        Ok(())
    }

    fn command(&self, command: ClientCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| Error::ClientStopped("command channel closed".to_string()))
    }

    async fn request<R>(&self, build: impl FnOnce(oneshot::Sender<R>) -> ClientCommand) -> Result<R> {
        let (reply, response) = oneshot::channel();
        self.command(build(reply))?;
        response
            .await
            .map_err(|_| Error::ClientStopped("driver dropped the request".to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────
// Driver Loop
// ─────────────────────────────────────────────────────────────────

async fn run_driver(
    mut manager: Manager,
    mut command_rx: mpsc::UnboundedReceiver<ClientCommand>,
    mut transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    mut timer_rx: mpsc::UnboundedReceiver<TimerId>,
    status: Arc<RwLock<SessionStatus>>,
) {
    loop {
        tokio::select! {
            cmd = command_rx.recv() => {
                match cmd {
                    Some(ClientCommand::Shutdown(reply)) => {
                        info!("Shutdown command received");
                        manager.disconnect();
                        respond(&manager, &status, reply, ());
                        break;
                    }
                    Some(cmd) => handle_command(&mut manager, &status, cmd),
                    None => {
                        debug!("All client handles dropped");
                        manager.disconnect();
                        break;
                    }
                }
            }

            Some(event) = transport_rx.recv() => manager.handle_transport_event(event),

            Some(id) = timer_rx.recv() => manager.handle_timer(id),
        }

        *status.write() = manager.status();
    }

    *status.write() = manager.status();
    debug!("Driver stopped");
}

fn handle_command(manager: &mut Manager, status: &RwLock<SessionStatus>, command: ClientCommand) {
    match command {
        ClientCommand::Connect => manager.connect(),
        ClientCommand::Disconnect => manager.disconnect(),
        ClientCommand::Send {
            kind,
            payload,
            topic,
            reply,
        } => {
            let sent = manager.send(kind, payload, topic);
            respond(manager, status, reply, sent);
        }
        ClientCommand::Subscribe {
            topic,
            callback,
            reply,
        } => {
            let handle = manager.subscribe(&topic, callback);
            respond(manager, status, reply, handle);
        }
        ClientCommand::Unsubscribe { handle, reply } => {
            let removed = manager.unsubscribe(&handle);
            respond(manager, status, reply, removed);
        }
        ClientCommand::UnsubscribeTopic { topic, reply } => {
            let removed = manager.unsubscribe_topic(&topic);
            respond(manager, status, reply, removed);
        }
        ClientCommand::On {
            name,
            callback,
            reply,
        } => {
            let handle = manager.on(name, callback);
            respond(manager, status, reply, handle);
        }
        ClientCommand::Off { handle, reply } => {
            let removed = manager.off(&handle);
            respond(manager, status, reply, removed);
        }
        ClientCommand::Shutdown(reply) => {
            manager.disconnect();
            respond(manager, status, reply, ());
        }
    }
}

/// Publish the snapshot before answering, so callers observe their own effect
fn respond<R>(manager: &Manager, status: &RwLock<SessionStatus>, reply: oneshot::Sender<R>, value: R) {
    *status.write() = manager.status();
    let _ = reply.send(value);
}
