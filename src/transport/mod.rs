//! Message transport
//!
//! The session core talks to the network through the [`Transport`] trait and
//! learns about network activity through [`TransportEvent`]s fed back to it.
//! Each opened connection is tagged with a [`ConnectionId`], so events from a
//! connection the core has already given up on can be recognised and ignored.
//!
//! Contract for implementations:
//! - after `open(conn, ..)` returns `Ok`, deliver `Opened(conn)` followed by any
//!   number of `Frame`/`Error` events and finally exactly one `Closed`, or just
//!   one `Closed` if the connection never came up
//! - after `close(conn, ..)` nothing further is required for `conn`

mod mock;
mod ws;

use std::fmt;

use url::Url;

use crate::error::Result;

pub use mock::MockTransport;
pub use ws::WsTransport;

/// Identity of one connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Outbound side of a message transport
pub trait Transport {
    /// Begin opening a connection to `url`
    fn open(&mut self, conn: ConnectionId, url: &Url) -> Result<()>;

    /// Write one text frame
    fn send(&mut self, conn: ConnectionId, text: String) -> Result<()>;

    /// Close a connection with a close code and reason
    fn close(&mut self, conn: ConnectionId, code: u16, reason: &str);
}

/// Inbound signal from a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Connection is up
    Opened(ConnectionId),

    /// Text frame received
    Frame(ConnectionId, String),

    /// Connection ended (or never came up)
    Closed {
        conn: ConnectionId,
        code: u16,
        reason: String,
    },

    /// Non-terminal transport error
    Error { conn: ConnectionId, message: String },
}

impl TransportEvent {
    /// Connection this event belongs to
    pub fn connection(&self) -> ConnectionId {
        match self {
            TransportEvent::Opened(conn) | TransportEvent::Frame(conn, _) => *conn,
            TransportEvent::Closed { conn, .. } | TransportEvent::Error { conn, .. } => *conn,
        }
    }
}
