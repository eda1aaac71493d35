//! pulse-link - resilient real-time session layer for PulseJob
//!
//! A client keeps one logical session to the PulseJob server alive across
//! connection losses. The [`session::ConnectionManager`] is a single-owner
//! state machine driven by transport events and timer firings; the
//! [`client::PulseClient`] hosts it on a tokio task over a real WebSocket.

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod timer;
pub mod transport;
pub mod version;

pub use client::PulseClient;
pub use config::PulseConfig;
pub use error::{Error, ErrorCode, Result};
pub use protocol::{Envelope, MessageKind};
pub use session::{
    callback, ClientConfig, ClientEvent, ConnectionManager, ConnectionState, EventName,
};
