//! Recording transport for tests

use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

use super::{ConnectionId, Transport};
use crate::error::{Error, Result};
use crate::protocol::Envelope;

/// Transport that records every call instead of touching the network
///
/// Clones share state, so a test keeps one handle and gives the other to the
/// connection manager. Network activity is simulated by feeding
/// `handle_open` / `handle_frame` / `handle_close` to the manager directly.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    opens: Vec<(ConnectionId, Url)>,
    sent: Vec<(ConnectionId, String)>,
    closes: Vec<(ConnectionId, u16, String)>,
    live: Option<ConnectionId>,
    fail_open: bool,
    fail_send: bool,
}

impl MockTransport {
    /// Create an empty mock
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `open` calls fail
    pub fn set_fail_open(&self, fail: bool) {
        self.inner.lock().fail_open = fail;
    }

    /// Make subsequent `send` calls fail
    pub fn set_fail_send(&self, fail: bool) {
        self.inner.lock().fail_send = fail;
    }

    /// Connection id passed to the most recent `open`
    pub fn last_connection(&self) -> Option<ConnectionId> {
        self.inner.lock().opens.last().map(|(conn, _)| *conn)
    }

    /// Number of `open` calls so far
    pub fn open_count(&self) -> usize {
        self.inner.lock().opens.len()
    }

    /// URLs passed to `open`, in order
    pub fn opened_urls(&self) -> Vec<Url> {
        self.inner.lock().opens.iter().map(|(_, url)| url.clone()).collect()
    }

    /// Raw text of every frame sent so far
    pub fn sent_frames(&self) -> Vec<String> {
        self.inner.lock().sent.iter().map(|(_, text)| text.clone()).collect()
    }

    /// Every frame sent so far, decoded
    pub fn sent_envelopes(&self) -> Vec<Envelope> {
        self.sent_frames()
            .iter()
            .filter_map(|text| Envelope::from_json(text).ok())
            .collect()
    }

    /// Decode and forget every frame sent so far
    pub fn take_sent(&self) -> Vec<Envelope> {
        let sent = std::mem::take(&mut self.inner.lock().sent);
        sent.iter()
            .filter_map(|(_, text)| Envelope::from_json(text).ok())
            .collect()
    }

    /// Every `close` call so far as (connection, code, reason)
    pub fn closes(&self) -> Vec<(ConnectionId, u16, String)> {
        self.inner.lock().closes.clone()
    }
}

impl Transport for MockTransport {
    fn open(&mut self, conn: ConnectionId, url: &Url) -> Result<()> {
        let mut state = self.inner.lock();
        state.opens.push((conn, url.clone()));
        if state.fail_open {
            return Err(Error::transport_open(url.as_str(), "refused by mock"));
        }
        state.live = Some(conn);
        Ok(())
    }

    fn send(&mut self, conn: ConnectionId, text: String) -> Result<()> {
        let mut state = self.inner.lock();
        if state.fail_send {
            return Err(Error::transport_send("refused by mock"));
        }
        if state.live != Some(conn) {
            return Err(Error::NotConnected { connection: conn.0 });
        }
        state.sent.push((conn, text));
        Ok(())
    }

    fn close(&mut self, conn: ConnectionId, code: u16, reason: &str) {
        let mut state = self.inner.lock();
        state.closes.push((conn, code, reason.to_string()));
        if state.live == Some(conn) {
            state.live = None;
        }
    }
}
