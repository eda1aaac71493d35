//! End-to-end tests against an in-process WebSocket server
//!
//! Tests the full flow: connect → subscribe → receive → server restart →
//! reconnect → resubscribe → shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame};
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message as WsMessage};

use pulse_link::session::{ClientConfig, ClientEvent, ConnectionState, EventName};
use pulse_link::{callback, Envelope, MessageKind, PulseClient};

/// Instruction for one server-side connection
enum ServerAction {
    Send(String),
    Close(u16),
}

/// Mock PulseJob server recording everything it receives
struct MockServer {
    addr: SocketAddr,
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// (connection index, frame text)
    received: Arc<RwLock<Vec<(usize, String)>>>,
    /// Request path and query of every accepted connection
    requests: Arc<RwLock<Vec<String>>>,
    controls: Arc<Mutex<Vec<mpsc::UnboundedSender<ServerAction>>>>,
}

impl MockServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let received = Arc::new(RwLock::new(Vec::new()));
        let requests = Arc::new(RwLock::new(Vec::new()));
        let controls = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        let requests_clone = requests.clone();
        let controls_clone = controls.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        let Ok((stream, _)) = accept_result else { continue };
                        let requests = requests_clone.clone();
                        let received = received_clone.clone();
                        let (action_tx, action_rx) = mpsc::unbounded_channel();
                        let index = {
                            let mut controls = controls_clone.lock();
                            controls.push(action_tx);
                            controls.len() - 1
                        };

                        tokio::spawn(async move {
                            let capture = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                                requests.write().push(request.uri().to_string());
                                Ok(response)
                            };
                            if let Ok(ws_stream) = accept_hdr_async(stream, capture).await {
                                handle_connection(index, ws_stream, received, action_rx).await;
                            }
                        });
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            received,
            requests,
            controls,
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws/pulse-job", self.addr)
    }

    fn connection_count(&self) -> usize {
        self.controls.lock().len()
    }

    fn requests(&self) -> Vec<String> {
        self.requests.read().clone()
    }

    /// Envelopes received on one connection
    fn received_on(&self, index: usize) -> Vec<Envelope> {
        self.received
            .read()
            .iter()
            .filter(|(i, _)| *i == index)
            .filter_map(|(_, text)| Envelope::from_json(text).ok())
            .collect()
    }

    fn subscriptions_on(&self, index: usize) -> Vec<String> {
        self.received_on(index)
            .into_iter()
            .filter(|e| e.kind == MessageKind::Subscribe)
            .filter_map(|e| e.topic)
            .collect()
    }

    fn act(&self, index: usize, action: ServerAction) {
        let controls = self.controls.lock();
        let _ = controls[index].send(action);
    }

    fn publish(&self, index: usize, envelope: &Envelope) {
        self.act(index, ServerAction::Send(envelope.to_json().unwrap()));
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
    }
}

async fn handle_connection<S>(
    index: usize,
    ws_stream: tokio_tungstenite::WebSocketStream<S>,
    received: Arc<RwLock<Vec<(usize, String)>>>,
    mut actions: mpsc::UnboundedReceiver<ServerAction>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        received.write().push((index, text.clone()));

                        // Answer liveness probes like the real server
                        if let Ok(envelope) = Envelope::from_json(&text) {
                            if envelope.kind == MessageKind::Ping {
                                let pong = Envelope::pong(envelope.payload, 0);
                                let _ = write.send(WsMessage::Text(pong.to_json().unwrap())).await;
                            }
                        }
                    }
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
            action = actions.recv() => {
                match action {
                    Some(ServerAction::Send(text)) => {
                        let _ = write.send(WsMessage::Text(text)).await;
                    }
                    Some(ServerAction::Close(code)) => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: "server closing".into(),
                        };
                        let _ = write.send(WsMessage::Close(Some(frame))).await;
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}

/// Poll until `condition` holds or the deadline passes
async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn fast_config(url: String) -> ClientConfig {
    let mut config = ClientConfig {
        url,
        client_type: "it".to_string(),
        ..ClientConfig::default()
    };
    config.connect_timeout = Duration::from_secs(2);
    config.reconnect.initial_interval = Duration::from_millis(50);
    config.reconnect.max_interval = Duration::from_millis(200);
    config.heartbeat.interval = Duration::from_millis(100);
    config.heartbeat.timeout = Duration::from_secs(2);
    config
}

fn query_value(request: &str, key: &str) -> Option<String> {
    let url = url::Url::parse(&format!("ws://localhost{}", request)).ok()?;
    let value = url
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned());
    value
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_session_survives_server_restart() {
    let server = MockServer::start().await;
    let client = PulseClient::start(fast_config(server.ws_url())).unwrap();

    let (connected_tx, mut connected_rx) = mpsc::unbounded_channel();
    client
        .on(
            EventName::Connected,
            callback(move |_: &ClientEvent| {
                let _ = connected_tx.send(());
                Ok(())
            }),
        )
        .await
        .unwrap();

    let (alert_tx, mut alert_rx) = mpsc::unbounded_channel();
    client
        .subscribe(
            "alert",
            callback(move |envelope: &Envelope| {
                let _ = alert_tx.send(envelope.clone());
                Ok(())
            }),
        )
        .await
        .unwrap();

    client.connect().unwrap();
    tokio::time::timeout(Duration::from_secs(5), connected_rx.recv())
        .await
        .expect("first connection")
        .unwrap();
    wait_for("first SUBSCRIBE", || server.subscriptions_on(0) == vec!["alert"]).await;

    // Topic message reaches the subscriber
    let alert = Envelope::new(
        MessageKind::Alert,
        json!({"level": "critical"}),
        Some("alert".to_string()),
        0,
    );
    server.publish(0, &alert);
    let delivered = tokio::time::timeout(Duration::from_secs(5), alert_rx.recv())
        .await
        .expect("alert delivery")
        .unwrap();
    assert_eq!(delivered.payload, json!({"level": "critical"}));

    // Heartbeats are answered, so latency gets measured
    wait_for("heartbeat ack", || client.status().latency.is_some()).await;

    // Abnormal close triggers reconnection and resubscription
    server.act(0, ServerAction::Close(1011));
    tokio::time::timeout(Duration::from_secs(5), connected_rx.recv())
        .await
        .expect("reconnection")
        .unwrap();
    wait_for("resubscribe", || server.subscriptions_on(1) == vec!["alert"]).await;

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    let first_id = query_value(&requests[0], "clientId").unwrap();
    assert_eq!(query_value(&requests[1], "clientId").as_deref(), Some(first_id.as_str()));
    assert_eq!(query_value(&requests[0], "clientType").as_deref(), Some("it"));
    assert_eq!(client.client_id(), first_id);

    // Sends go out on the new connection
    assert!(client
        .send(MessageKind::Notification, json!({"n": 1}), None)
        .await
        .unwrap());
    wait_for("notification", || {
        server
            .received_on(1)
            .iter()
            .any(|e| e.kind == MessageKind::Notification)
    })
    .await;

    client.shutdown().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(client.connect().is_err());
}

#[tokio::test]
async fn test_offline_sends_flush_after_connect() {
    let server = MockServer::start().await;
    let client = PulseClient::start(fast_config(server.ws_url())).unwrap();

    for n in 0..3 {
        let written = client
            .send(MessageKind::Notification, json!(n), Some("stats".to_string()))
            .await
            .unwrap();
        assert!(!written);
    }
    assert_eq!(client.status().queued, 3);

    client.connect().unwrap();
    wait_for("flushed queue", || {
        server
            .received_on(0)
            .iter()
            .filter(|e| e.kind == MessageKind::Notification)
            .count()
            == 3
    })
    .await;

    let payloads: Vec<_> = server
        .received_on(0)
        .into_iter()
        .filter(|e| e.kind == MessageKind::Notification)
        .map(|e| e.payload)
        .collect();
    assert_eq!(payloads, vec![json!(0), json!(1), json!(2)]);
    assert_eq!(client.status().queued, 0);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_normal_server_close_is_final() {
    let server = MockServer::start().await;
    let client = PulseClient::start(fast_config(server.ws_url())).unwrap();

    client.connect().unwrap();
    wait_for("connected", || client.is_connected()).await;

    server.act(0, ServerAction::Close(1000));
    wait_for("closed", || client.state() == ConnectionState::Closed).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.connection_count(), 1);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_server_keeps_retrying() {
    // Bind then drop to get a port nobody listens on
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let client = PulseClient::start(fast_config(format!("ws://{}/ws", addr))).unwrap();

    let (reconnecting_tx, mut reconnecting_rx) = mpsc::unbounded_channel();
    client
        .on(
            EventName::Reconnecting,
            callback(move |event: &ClientEvent| {
                if let ClientEvent::Reconnecting { attempt, .. } = event {
                    let _ = reconnecting_tx.send(*attempt);
                }
                Ok(())
            }),
        )
        .await
        .unwrap();

    client.connect().unwrap();
    for expected in 1..=3 {
        let attempt = tokio::time::timeout(Duration::from_secs(5), reconnecting_rx.recv())
            .await
            .expect("retry scheduled")
            .unwrap();
        assert_eq!(attempt, expected);
    }
    assert!(!client.is_connected());

    client.shutdown().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Closed);
}
