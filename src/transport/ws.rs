//! WebSocket transport over tokio-tungstenite

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message as WsMessage,
    },
};
use tracing::{debug, error, info, warn};
use url::Url;

use super::{ConnectionId, Transport, TransportEvent};
use crate::error::{Error, Result};
use crate::protocol::{ABNORMAL_CLOSURE, NORMAL_CLOSURE, NO_STATUS_RECEIVED};

/// Frame queued for the socket task
#[derive(Debug)]
enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// Transport running one socket task per connection
///
/// Events from every connection arrive on the receiver returned by
/// [`WsTransport::new`]. Must be used from within a tokio runtime.
pub struct WsTransport {
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    connect_timeout: Duration,
    active: Option<(ConnectionId, mpsc::UnboundedSender<Outbound>)>,
}

impl WsTransport {
    /// Create a transport and the receiver its events arrive on
    pub fn new(connect_timeout: Duration) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = Self {
            events_tx,
            connect_timeout,
            active: None,
        };
        (transport, events_rx)
    }
}

impl Transport for WsTransport {
    fn open(&mut self, conn: ConnectionId, url: &Url) -> Result<()> {
        if let Some((previous, outbound)) = self.active.take() {
            debug!(conn = %previous, "Dropping superseded connection");
            let _ = outbound.send(Outbound::Close {
                code: NORMAL_CLOSURE,
                reason: "Superseded".to_string(),
            });
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.active = Some((conn, outbound_tx));

        tokio::spawn(run_socket(
            conn,
            url.clone(),
            self.connect_timeout,
            outbound_rx,
            self.events_tx.clone(),
        ));
        Ok(())
    }

    fn send(&mut self, conn: ConnectionId, text: String) -> Result<()> {
        match &self.active {
            Some((active, outbound)) if *active == conn => outbound
                .send(Outbound::Text(text))
                .map_err(|_| Error::transport_send("socket task has stopped")),
            _ => Err(Error::NotConnected { connection: conn.0 }),
        }
    }

    fn close(&mut self, conn: ConnectionId, code: u16, reason: &str) {
        match self.active.take() {
            Some((active, outbound)) if active == conn => {
                let _ = outbound.send(Outbound::Close {
                    code,
                    reason: reason.to_string(),
                });
            }
            other => self.active = other,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Socket Task
// ─────────────────────────────────────────────────────────────────

/// Drive one WebSocket connection until it closes
async fn run_socket(
    conn: ConnectionId,
    url: Url,
    connect_timeout: Duration,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let closed = |code: u16, reason: String| TransportEvent::Closed { conn, code, reason };

    info!(conn = %conn, url = %url, "Connecting");

    let ws_stream = match tokio::time::timeout(connect_timeout, connect_async(url.as_str())).await {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            let err = Error::transport_open(url.as_str(), e.to_string());
            warn!(conn = %conn, error = %err.format_for_log(), "Connection failed");
            let _ = events.send(TransportEvent::Error {
                conn,
                message: err.to_string(),
            });
            let _ = events.send(closed(ABNORMAL_CLOSURE, err.to_string()));
            return;
        }
        Err(_) => {
            let err = Error::ConnectionTimeout {
                url: url.to_string(),
                timeout_ms: connect_timeout.as_millis() as u64,
            };
            warn!(conn = %conn, error = %err.format_for_log(), "Connection timed out");
            let _ = events.send(closed(ABNORMAL_CLOSURE, err.to_string()));
            return;
        }
    };

    debug!(conn = %conn, "WebSocket handshake complete");
    let _ = events.send(TransportEvent::Opened(conn));

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            out = outbound.recv() => {
                match out {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = write.send(WsMessage::Text(text)).await {
                            let err = Error::from(e);
                            error!(conn = %conn, error = %err.format_for_log(), "Failed to write frame");
                            let _ = events.send(TransportEvent::Error { conn, message: err.to_string() });
                            let _ = events.send(closed(ABNORMAL_CLOSURE, err.to_string()));
                            return;
                        }
                    }
                    Some(Outbound::Close { code, reason }) => {
                        debug!(conn = %conn, code, reason = %reason, "Closing connection");
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        };
                        let _ = write.send(WsMessage::Close(Some(frame))).await;
                        return;
                    }
                    None => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        return;
                    }
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        let _ = events.send(TransportEvent::Frame(conn, text));
                    }
                    Some(Ok(WsMessage::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => {
                            let _ = events.send(TransportEvent::Frame(conn, text));
                        }
                        Err(_) => warn!(conn = %conn, "Dropping non-UTF-8 binary frame"),
                    },
                    Some(Ok(WsMessage::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.into_owned()))
                            .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                        info!(conn = %conn, code, reason = %reason, "Received close frame");
                        // Deliver the queued close reply before dropping the socket
                        let _ = write.flush().await;
                        let _ = events.send(closed(code, reason));
                        return;
                    }
                    // Pings are answered by tungstenite itself
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let err = Error::from(e);
                        error!(conn = %conn, error = %err.format_for_log(), "WebSocket error");
                        let _ = events.send(TransportEvent::Error { conn, message: err.to_string() });
                        let _ = events.send(closed(ABNORMAL_CLOSURE, err.to_string()));
                        return;
                    }
                    None => {
                        info!(conn = %conn, "WebSocket stream ended");
                        let _ = events.send(closed(ABNORMAL_CLOSURE, "Stream ended".to_string()));
                        return;
                    }
                }
            }
        }
    }
}
