//! Envelope and message kind definitions
//!
//! Every frame exchanged with the server is a JSON object with a `type`
//! discriminator, an optional `topic`, an opaque `data` payload and a
//! millisecond `timestamp`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────
// Message Kinds
// ─────────────────────────────────────────────────────────────────

/// All message kinds understood on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    // ─── Connection lifecycle ───────────────────────────────────
    Connect,
    Disconnect,
    Error,
    Ack,

    // ─── Heartbeat ──────────────────────────────────────────────
    Ping,
    Pong,

    // ─── Subscription ───────────────────────────────────────────
    Subscribe,
    Unsubscribe,
    Subscribed,
    Unsubscribed,

    // ─── Executor status ────────────────────────────────────────
    ExecutorStatus,
    ExecutorOnline,
    ExecutorOffline,
    ExecutorHeartbeat,

    // ─── Task lifecycle ─────────────────────────────────────────
    TaskStatus,
    TaskTriggered,
    TaskCompleted,
    TaskFailed,

    // ─── Log streaming ──────────────────────────────────────────
    LogStream,
    LogAppend,
    LogEnd,

    // ─── Alerting / statistics ──────────────────────────────────
    Alert,
    StatsUpdate,

    // ─── Generic fan-out ────────────────────────────────────────
    Broadcast,
    Notification,
}

/// Coarse grouping of message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindCategory {
    Lifecycle,
    Heartbeat,
    Subscription,
    Executor,
    Task,
    Log,
    Alert,
    Stats,
    Fanout,
}

impl MessageKind {
    /// Every kind, in declaration order
    pub const ALL: [MessageKind; 25] = [
        MessageKind::Connect,
        MessageKind::Disconnect,
        MessageKind::Error,
        MessageKind::Ack,
        MessageKind::Ping,
        MessageKind::Pong,
        MessageKind::Subscribe,
        MessageKind::Unsubscribe,
        MessageKind::Subscribed,
        MessageKind::Unsubscribed,
        MessageKind::ExecutorStatus,
        MessageKind::ExecutorOnline,
        MessageKind::ExecutorOffline,
        MessageKind::ExecutorHeartbeat,
        MessageKind::TaskStatus,
        MessageKind::TaskTriggered,
        MessageKind::TaskCompleted,
        MessageKind::TaskFailed,
        MessageKind::LogStream,
        MessageKind::LogAppend,
        MessageKind::LogEnd,
        MessageKind::Alert,
        MessageKind::StatsUpdate,
        MessageKind::Broadcast,
        MessageKind::Notification,
    ];

    /// Get the wire name of this kind
    pub fn type_name(&self) -> &'static str {
        match self {
            MessageKind::Connect => "CONNECT",
            MessageKind::Disconnect => "DISCONNECT",
            MessageKind::Error => "ERROR",
            MessageKind::Ack => "ACK",
            MessageKind::Ping => "PING",
            MessageKind::Pong => "PONG",
            MessageKind::Subscribe => "SUBSCRIBE",
            MessageKind::Unsubscribe => "UNSUBSCRIBE",
            MessageKind::Subscribed => "SUBSCRIBED",
            MessageKind::Unsubscribed => "UNSUBSCRIBED",
            MessageKind::ExecutorStatus => "EXECUTOR_STATUS",
            MessageKind::ExecutorOnline => "EXECUTOR_ONLINE",
            MessageKind::ExecutorOffline => "EXECUTOR_OFFLINE",
            MessageKind::ExecutorHeartbeat => "EXECUTOR_HEARTBEAT",
            MessageKind::TaskStatus => "TASK_STATUS",
            MessageKind::TaskTriggered => "TASK_TRIGGERED",
            MessageKind::TaskCompleted => "TASK_COMPLETED",
            MessageKind::TaskFailed => "TASK_FAILED",
            MessageKind::LogStream => "LOG_STREAM",
            MessageKind::LogAppend => "LOG_APPEND",
            MessageKind::LogEnd => "LOG_END",
            MessageKind::Alert => "ALERT",
            MessageKind::StatsUpdate => "STATS_UPDATE",
            MessageKind::Broadcast => "BROADCAST",
            MessageKind::Notification => "NOTIFICATION",
        }
    }

    /// Parse a wire name
    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.type_name() == name)
    }

    /// Get the category this kind belongs to
    pub fn category(&self) -> KindCategory {
        match self {
            MessageKind::Connect
            | MessageKind::Disconnect
            | MessageKind::Error
            | MessageKind::Ack => KindCategory::Lifecycle,
            MessageKind::Ping | MessageKind::Pong => KindCategory::Heartbeat,
            MessageKind::Subscribe
            | MessageKind::Unsubscribe
            | MessageKind::Subscribed
            | MessageKind::Unsubscribed => KindCategory::Subscription,
            MessageKind::ExecutorStatus
            | MessageKind::ExecutorOnline
            | MessageKind::ExecutorOffline
            | MessageKind::ExecutorHeartbeat => KindCategory::Executor,
            MessageKind::TaskStatus
            | MessageKind::TaskTriggered
            | MessageKind::TaskCompleted
            | MessageKind::TaskFailed => KindCategory::Task,
            MessageKind::LogStream | MessageKind::LogAppend | MessageKind::LogEnd => {
                KindCategory::Log
            }
            MessageKind::Alert => KindCategory::Alert,
            MessageKind::StatsUpdate => KindCategory::Stats,
            MessageKind::Broadcast | MessageKind::Notification => KindCategory::Fanout,
        }
    }

    /// Check if this kind is session plumbing rather than platform state
    pub fn is_control(&self) -> bool {
        matches!(
            self.category(),
            KindCategory::Lifecycle | KindCategory::Heartbeat | KindCategory::Subscription
        )
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

impl std::str::FromStr for MessageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_type_name(&s.to_ascii_uppercase())
            .ok_or_else(|| Error::malformed(format!("unknown message kind '{}'", s)))
    }
}

// ─────────────────────────────────────────────────────────────────
// Envelope
// ─────────────────────────────────────────────────────────────────

/// Uniform wrapper around every wire message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Message kind
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Topic used for subscriber fan-out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    /// Opaque payload
    #[serde(rename = "data", default)]
    pub payload: Value,

    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub timestamp: i64,

    /// Server-assigned message id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    /// Error code carried by ERROR frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    /// Error description carried by ERROR frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Envelope {
    /// Create a new envelope
    pub fn new(kind: MessageKind, payload: Value, topic: Option<String>, timestamp: i64) -> Self {
        Self {
            kind,
            topic,
            payload,
            timestamp,
            message_id: None,
            error_code: None,
            error_message: None,
        }
    }

    /// Liveness probe carrying its own send time
    pub fn ping(timestamp: i64) -> Self {
        Self::new(MessageKind::Ping, Value::from(timestamp), None, timestamp)
    }

    /// Liveness acknowledgment echoing the probe payload
    pub fn pong(echo: Value, timestamp: i64) -> Self {
        Self::new(MessageKind::Pong, echo, None, timestamp)
    }

    /// Topic subscription request
    pub fn subscribe(topic: impl Into<String>, timestamp: i64) -> Self {
        Self::new(MessageKind::Subscribe, Value::Null, Some(topic.into()), timestamp)
    }

    /// Topic unsubscription request
    pub fn unsubscribe(topic: impl Into<String>, timestamp: i64) -> Self {
        Self::new(MessageKind::Unsubscribe, Value::Null, Some(topic.into()), timestamp)
    }

    /// Server error frame
    pub fn error(code: impl Into<String>, message: impl Into<String>, timestamp: i64) -> Self {
        let mut envelope = Self::new(MessageKind::Error, Value::Null, None, timestamp);
        envelope.error_code = Some(code.into());
        envelope.error_message = Some(message.into());
        envelope
    }

    /// Timestamp echoed in a PONG payload, if it carries one
    pub fn echoed_timestamp(&self) -> Option<i64> {
        match &self.payload {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::malformed(e.to_string()))
    }

    /// Deserialize from JSON bytes
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::malformed(e.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_wire_field_names() {
        let envelope = Envelope::new(
            MessageKind::TaskCompleted,
            json!({"jobId": 7}),
            Some("task.status".to_string()),
            1_700_000_000_000,
        );
        let value: Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "TASK_COMPLETED");
        assert_eq!(value["topic"], "task.status");
        assert_eq!(value["data"]["jobId"], 7);
        assert_eq!(value["timestamp"], 1_700_000_000_000i64);
        assert!(value.get("messageId").is_none());
        assert!(value.get("errorCode").is_none());
    }

    #[test]
    fn test_topic_omitted_when_absent() {
        let json = Envelope::ping(42).to_json().unwrap();
        assert!(!json.contains("topic"));
        assert!(json.contains("\"data\":42"));
    }

    #[test]
    fn test_parse_server_error_frame() {
        let frame = r#"{"type":"ERROR","errorCode":"E_TOPIC","errorMessage":"unknown topic","timestamp":5}"#;
        let envelope = Envelope::from_json(frame).unwrap();

        assert_eq!(envelope.kind, MessageKind::Error);
        assert_eq!(envelope.error_code.as_deref(), Some("E_TOPIC"));
        assert_eq!(envelope.error_message.as_deref(), Some("unknown topic"));
        assert_eq!(envelope.payload, Value::Null);
    }

    #[test]
    fn test_missing_timestamp_defaults_to_zero() {
        let envelope = Envelope::from_json(r#"{"type":"PONG","data":1000}"#).unwrap();
        assert_eq!(envelope.timestamp, 0);
        assert_eq!(envelope.echoed_timestamp(), Some(1000));
    }

    #[test]
    fn test_malformed_frames() {
        for frame in ["not json", "{}", r#"{"type":"NOT_A_KIND"}"#, r#"{"type":7}"#] {
            let err = Envelope::from_json(frame).unwrap_err();
            assert_eq!(err.code(), ErrorCode::ProtocolMalformed, "frame: {}", frame);
        }
    }

    #[test]
    fn test_type_names_match_serde() {
        for kind in MessageKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.type_name()));
            assert_eq!(MessageKind::from_type_name(kind.type_name()), Some(kind));
        }
    }

    #[test]
    fn test_kind_from_str_is_case_insensitive() {
        assert_eq!("stats_update".parse::<MessageKind>().unwrap(), MessageKind::StatsUpdate);
        assert!("nope".parse::<MessageKind>().is_err());
    }

    #[test]
    fn test_categories() {
        assert_eq!(MessageKind::Ping.category(), KindCategory::Heartbeat);
        assert_eq!(MessageKind::LogAppend.category(), KindCategory::Log);
        assert_eq!(MessageKind::ExecutorOffline.category(), KindCategory::Executor);
        assert!(MessageKind::Subscribed.is_control());
        assert!(!MessageKind::Alert.is_control());
    }

    #[test]
    fn test_echoed_timestamp_variants() {
        assert_eq!(Envelope::pong(json!("1234"), 0).echoed_timestamp(), Some(1234));
        assert_eq!(Envelope::pong(json!({"ts": 1}), 0).echoed_timestamp(), None);
    }
}
