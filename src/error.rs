//! Error types for pulse-link
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - Retry / fatality classification for the session layer
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for pulse-link operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,

    // Transport errors (3xx)
    TransportOpen = 300,
    TransportSend = 301,
    ConnectionTimeout = 302,
    NotConnected = 303,
    InvalidEndpoint = 304,
    SocketFailure = 305,

    // Protocol errors (4xx)
    ProtocolMalformed = 400,
    ProtocolEncode = 401,

    // Session errors (5xx)
    HeartbeatTimeout = 500,
    ReconnectExhausted = 501,
    CallbackFailed = 502,
    ClientStopped = 503,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            300..=399 => 30, // Transport errors
            400..=499 => 40, // Protocol errors
            500..=599 => 50, // Session errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for pulse-link
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// Read or write failure on an established socket
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    // ─────────────────────────────────────────────────────────────
    // Transport Errors
    // ─────────────────────────────────────────────────────────────

    /// The transport could not be opened
    #[error("Failed to open transport to {url}: {message}")]
    TransportOpen { url: String, message: String },

    /// A write was rejected by the transport
    #[error("Transport rejected write: {message}")]
    TransportSend { message: String },

    /// Connection timeout
    #[error("Connection to {url} timed out after {timeout_ms}ms")]
    ConnectionTimeout { url: String, timeout_ms: u64 },

    /// A write was attempted on a connection that is not live
    #[error("Connection {connection} is not live")]
    NotConnected { connection: u64 },

    /// Endpoint URL could not be built
    #[error("Invalid endpoint URL {url}: {message}")]
    InvalidEndpoint { url: String, message: String },

    // ─────────────────────────────────────────────────────────────
    // Protocol Errors
    // ─────────────────────────────────────────────────────────────

    /// Inbound frame could not be decoded as an envelope
    #[error("Malformed frame: {message}")]
    ProtocolMalformed { message: String },

    /// Outbound envelope could not be encoded
    #[error("Failed to encode envelope: {0}")]
    ProtocolEncode(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Session Errors
    // ─────────────────────────────────────────────────────────────

    /// No heartbeat acknowledgment within the timeout
    #[error("No heartbeat acknowledgment within {timeout_ms}ms")]
    HeartbeatTimeout { timeout_ms: u64 },

    /// The reconnection budget is spent
    #[error("Reconnection abandoned after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// A subscriber or listener callback failed
    #[error("Callback for {target} failed: {message}")]
    CallbackFailed { target: String, message: String },

    /// The runtime client task is gone
    #[error("Client stopped: {0}")]
    ClientStopped(String),

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,
            Error::Config(_) => ErrorCode::ConfigValidation,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::WebSocket(_) => ErrorCode::SocketFailure,

            Error::TransportOpen { .. } => ErrorCode::TransportOpen,
            Error::TransportSend { .. } => ErrorCode::TransportSend,
            Error::ConnectionTimeout { .. } => ErrorCode::ConnectionTimeout,
            Error::NotConnected { .. } => ErrorCode::NotConnected,
            Error::InvalidEndpoint { .. } => ErrorCode::InvalidEndpoint,

            Error::ProtocolMalformed { .. } => ErrorCode::ProtocolMalformed,
            Error::ProtocolEncode(_) => ErrorCode::ProtocolEncode,

            Error::HeartbeatTimeout { .. } => ErrorCode::HeartbeatTimeout,
            Error::ReconnectExhausted { .. } => ErrorCode::ReconnectExhausted,
            Error::CallbackFailed { .. } => ErrorCode::CallbackFailed,
            Error::ClientStopped(_) => ErrorCode::ClientStopped,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error should drive another connection attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::TransportOpen { .. }
                | Error::TransportSend { .. }
                | Error::ConnectionTimeout { .. }
                | Error::WebSocket(_)
                | Error::HeartbeatTimeout { .. }
                | Error::Io(_)
        )
    }

    /// Check if the error is fatal (the process should exit)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound { .. }
                | Error::ConfigParse { .. }
                | Error::ConfigValidation { .. }
                | Error::Config(_)
                | Error::InvalidEndpoint { .. }
                | Error::ClientStopped(_)
                | Error::Internal(_)
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'pulse-link config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'pulse-link config validate' to see details."
            ),
            Error::ConfigValidation { .. } | Error::Config(_) => Some(
                "Review the configuration file and fix the invalid values."
            ),
            Error::TransportOpen { .. } | Error::WebSocket(_) => Some(
                "Check your network connection and verify the server URL is correct."
            ),
            Error::ConnectionTimeout { .. } => Some(
                "The server may be down or unreachable. Check your firewall settings."
            ),
            Error::InvalidEndpoint { .. } => Some(
                "The [connection] url must be a ws:// or wss:// URL."
            ),
            Error::HeartbeatTimeout { .. } => Some(
                "The server stopped answering heartbeats. The client reconnects automatically."
            ),
            Error::ReconnectExhausted { .. } => Some(
                "Raise [reconnect] max_attempts (or set it to -1) or restart once the server is back."
            ),
            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();
        let suggestion = self.suggestion();

        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            code.as_str(),
            self
        );

        if let Some(hint) = suggestion {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound { path: path.into() }
    }

    /// Create a config parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Error::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        Error::ConfigValidation {
            message: format!("{}: {}", field, message.into()),
            field: Some(field),
        }
    }

    /// Create a transport open error
    pub fn transport_open(url: impl Into<String>, message: impl Into<String>) -> Self {
        Error::TransportOpen {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a transport send error
    pub fn transport_send(message: impl Into<String>) -> Self {
        Error::TransportSend {
            message: message.into(),
        }
    }

    /// Create a malformed frame error
    pub fn malformed(message: impl Into<String>) -> Self {
        Error::ProtocolMalformed {
            message: message.into(),
        }
    }

    /// Create a callback failure
    pub fn callback_failed(target: impl Into<String>, message: impl Into<String>) -> Self {
        Error::CallbackFailed {
            target: target.into(),
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::ConfigNotFound.as_str(), "E100");
        assert_eq!(ErrorCode::TransportOpen.as_str(), "E300");
        assert_eq!(ErrorCode::HeartbeatTimeout.as_str(), "E500");
        assert_eq!(ErrorCode::InternalError.as_str(), "E900");
    }

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(ErrorCode::ConfigNotFound.exit_code(), 10);
        assert_eq!(ErrorCode::IoRead.exit_code(), 20);
        assert_eq!(ErrorCode::TransportSend.exit_code(), 30);
        assert_eq!(ErrorCode::ProtocolMalformed.exit_code(), 40);
        assert_eq!(ErrorCode::ReconnectExhausted.exit_code(), 50);
        assert_eq!(ErrorCode::InternalError.exit_code(), 90);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::config_not_found("/test").code(), ErrorCode::ConfigNotFound);
        assert_eq!(Error::transport_open("ws://x", "refused").code(), ErrorCode::TransportOpen);
        assert_eq!(Error::malformed("not json").code(), ErrorCode::ProtocolMalformed);
        assert_eq!(
            Error::callback_failed("topic jobs", "boom").code(),
            ErrorCode::CallbackFailed
        );
    }

    #[test]
    fn test_error_retryable() {
        assert!(Error::transport_open("url", "test").is_retryable());
        assert!(Error::HeartbeatTimeout { timeout_ms: 10_000 }.is_retryable());
        assert!(!Error::malformed("x").is_retryable());
        assert!(!Error::ReconnectExhausted { attempts: 3 }.is_retryable());
    }

    #[test]
    fn test_error_fatal() {
        assert!(Error::config_not_found("/test").is_fatal());
        assert!(Error::ClientStopped("gone".into()).is_fatal());
        assert!(!Error::transport_send("closed").is_fatal());
        assert!(!Error::callback_failed("x", "y").is_fatal());
    }

    #[test]
    fn test_format_for_terminal() {
        let err = Error::config_not_found("/test/client.toml");
        let formatted = err.format_for_terminal();

        assert!(formatted.contains("E100"));
        assert!(formatted.contains("\x1b[31m"));
        assert!(formatted.contains("Hint"));
    }

    #[test]
    fn test_format_for_log() {
        let err = Error::ReconnectExhausted { attempts: 5 };
        let formatted = err.format_for_log();

        assert!(formatted.contains("[E501]"));
        assert!(formatted.contains("5 attempts"));
        assert!(!formatted.contains("\x1b["));
    }

    #[test]
    fn test_error_from_websocket() {
        let err: Error = tokio_tungstenite::tungstenite::Error::ConnectionClosed.into();

        assert_eq!(err.code(), ErrorCode::SocketFailure);
        assert_eq!(err.exit_code(), 30);
        assert!(err.is_retryable());
        assert!(err.suggestion().is_some());
        assert!(err.format_for_log().starts_with("[E305]"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        assert_eq!(err.code(), ErrorCode::IoNotFound);
    }
}
