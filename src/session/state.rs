//! Connection state and session identity

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::heartbeat::HeartbeatPolicy;
use super::queue::QueuePolicy;
use super::reconnect::ReconnectPolicy;
use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────
// Connection State
// ─────────────────────────────────────────────────────────────────

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// Not connected and not retrying
    #[default]
    Disconnected,
    /// Transport open in progress
    Connecting,
    /// Transport open, traffic flowing
    Connected,
    /// Waiting for the next reconnection attempt
    Reconnecting,
    /// Closed on purpose, no automatic reconnection
    Closed,
}

impl ConnectionState {
    /// Get the state name as shown in logs and status output
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Reconnecting => "RECONNECTING",
            ConnectionState::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Runtime configuration of one client session
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint
    pub url: String,

    /// Client type label sent to the server
    pub client_type: String,

    /// Limit on a single transport open
    pub connect_timeout: Duration,

    /// Automatic reconnection
    pub reconnect: ReconnectPolicy,

    /// Liveness probing
    pub heartbeat: HeartbeatPolicy,

    /// Buffering of sends made while not connected
    pub queue: QueuePolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/ws/pulse-job".to_string(),
            client_type: "cli".to_string(),
            connect_timeout: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
            heartbeat: HeartbeatPolicy::default(),
            queue: QueuePolicy::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Session Identity
// ─────────────────────────────────────────────────────────────────

/// Identity and configuration of one client session
///
/// The client id is generated once and survives every reconnection.
#[derive(Debug, Clone)]
pub struct ClientSession {
    client_id: String,
    config: Arc<ClientConfig>,
}

impl ClientSession {
    /// Create a session, generating its client id from `now_millis`
    pub fn new(config: ClientConfig, now_millis: i64) -> Self {
        let client_id = generate_client_id(&config.client_type, now_millis);
        Self {
            client_id,
            config: Arc::new(config),
        }
    }

    /// Create a session with a caller-chosen client id
    pub fn with_client_id(config: ClientConfig, client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            config: Arc::new(config),
        }
    }

    /// Stable client id
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Client type label
    pub fn client_type(&self) -> &str {
        &self.config.client_type
    }

    /// Session configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Endpoint URL with the session identity appended as query parameters
    pub fn endpoint(&self) -> Result<Url> {
        let mut url = Url::parse(&self.config.url).map_err(|e| Error::InvalidEndpoint {
            url: self.config.url.clone(),
            message: e.to_string(),
        })?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(Error::InvalidEndpoint {
                    url: self.config.url.clone(),
                    message: format!("unsupported scheme '{}', expected ws or wss", other),
                })
            }
        }

        url.query_pairs_mut()
            .append_pair("clientId", &self.client_id)
            .append_pair("clientType", &self.config.client_type);
        Ok(url)
    }
}

/// Build a client id of the form `<type>_<millis>_<random>`
pub fn generate_client_id(client_type: &str, now_millis: i64) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", client_type, now_millis, &random[..9])
}
