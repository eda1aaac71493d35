//! Common test utilities and fixtures
//!
//! This module provides shared test infrastructure: fixture paths and a
//! harness that drives a connection manager over a mock transport and a
//! simulated clock.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use pulse_link::session::{ClientConfig, ClientEvent, ClientSession, ConnectionManager, EventName};
use pulse_link::timer::ManualScheduler;
use pulse_link::transport::{ConnectionId, MockTransport};
use pulse_link::{callback, Envelope};

/// Get the path to the test fixtures directory
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Get a path to a specific fixture file
pub fn fixture_path(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

/// Get the valid config fixture path
pub fn valid_config_fixture() -> PathBuf {
    fixture_path("valid_config.toml")
}

/// Get the invalid config fixture path
pub fn invalid_config_fixture() -> PathBuf {
    fixture_path("invalid_config.toml")
}

// ─────────────────────────────────────────────────────────────────
// Session Harness
// ─────────────────────────────────────────────────────────────────

pub const START_MILLIS: i64 = 1_700_000_000_000;

pub type TestManager = ConnectionManager<MockTransport, ManualScheduler>;

/// Lifecycle events that the recorder listens for
const RECORDED: [EventName; 10] = [
    EventName::StateChange,
    EventName::Open,
    EventName::Connected,
    EventName::Close,
    EventName::Disconnected,
    EventName::Reconnecting,
    EventName::ReconnectExhausted,
    EventName::Error,
    EventName::ServerError,
    EventName::Message,
];

/// Collects every event emitted by a manager, in order
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<ClientEvent>>>,
}

impl Recorder {
    pub fn attach(&self, manager: &mut TestManager) {
        for name in RECORDED {
            let events = self.events.clone();
            manager.on(
                name,
                callback(move |event: &ClientEvent| {
                    events.lock().push(event.clone());
                    Ok(())
                }),
            );
        }
    }

    pub fn all(&self) -> Vec<ClientEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn count(&self, name: EventName) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }
}

/// Manager plus handles on its transport and clock
pub struct Harness {
    pub manager: TestManager,
    pub transport: MockTransport,
    pub clock: ManualScheduler,
    pub events: Recorder,
}

impl Harness {
    pub fn new(config: ClientConfig) -> Self {
        let transport = MockTransport::new();
        let clock = ManualScheduler::new(START_MILLIS);
        let session = ClientSession::with_client_id(config, "cli_test_client");
        let mut manager = ConnectionManager::with_session(session, transport.clone(), clock.clone())
            .expect("test config has a valid endpoint");
        let events = Recorder::default();
        events.attach(&mut manager);

        Self {
            manager,
            transport,
            clock,
            events,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(test_config())
    }

    /// Connection id of the most recent open
    pub fn conn(&self) -> ConnectionId {
        self.transport
            .last_connection()
            .expect("an open has been attempted")
    }

    /// Connect and complete the open on the mock transport
    pub fn connect_and_open(&mut self) -> ConnectionId {
        self.manager.connect();
        let conn = self.conn();
        self.manager.handle_open(conn);
        conn
    }

    /// Advance the clock, delivering every due timer to the manager
    pub fn advance(&mut self, by: Duration) {
        let clock = self.clock.clone();
        let manager = &mut self.manager;
        clock.advance(by, |id| manager.handle_timer(id));
    }

    /// Fire the earliest pending timer, if any
    pub fn fire_next(&mut self) -> bool {
        match self.clock.fire_next() {
            Some(id) => {
                self.manager.handle_timer(id);
                true
            }
            None => false,
        }
    }

    /// Deliver an inbound envelope on the given connection
    pub fn receive(&mut self, conn: ConnectionId, envelope: &Envelope) {
        let text = envelope.to_json().expect("envelope encodes");
        self.manager.handle_frame(conn, &text);
    }

    /// Milliseconds on the simulated clock
    pub fn now(&self) -> i64 {
        use pulse_link::timer::Scheduler;
        self.clock.now_millis()
    }
}

/// Configuration with the documented defaults
pub fn test_config() -> ClientConfig {
    ClientConfig {
        url: "ws://localhost:8080/ws/pulse-job".to_string(),
        ..ClientConfig::default()
    }
}

/// Configuration with heartbeats switched off, for tests that advance the
/// clock a long way
pub fn quiet_config() -> ClientConfig {
    let mut config = test_config();
    config.heartbeat.enabled = false;
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_dir_exists() {
        assert!(fixtures_dir().exists(), "Fixtures directory should exist");
    }

    #[test]
    fn test_valid_config_exists() {
        assert!(
            valid_config_fixture().exists(),
            "Valid config fixture should exist"
        );
    }

    #[test]
    fn test_invalid_config_exists() {
        assert!(
            invalid_config_fixture().exists(),
            "Invalid config fixture should exist"
        );
    }
}
