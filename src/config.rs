//! Configuration system for pulse-link
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (PULSE_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::session::{ClientConfig, HeartbeatPolicy, QueuePolicy, ReconnectPolicy};

/// Main client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    /// Endpoint and identity
    pub connection: ConnectionSettings,

    /// Automatic reconnection
    pub reconnect: ReconnectSettings,

    /// Liveness probing
    pub heartbeat: HeartbeatSettings,

    /// Offline send buffering
    pub queue: QueueSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Endpoint and identity settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// WebSocket URL of the PulseJob server
    pub url: String,

    /// Client type label sent with every connection
    pub client_type: String,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
}

/// Reconnection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    /// Reconnect automatically after an abnormal close
    pub enabled: bool,

    /// Delay before the first attempt in milliseconds
    pub interval_ms: u64,

    /// Upper bound on the delay in milliseconds
    pub max_interval_ms: u64,

    /// Maximum attempts (-1 = unlimited)
    pub max_attempts: i64,

    /// Growth factor between consecutive delays
    pub backoff_rate: f64,
}

/// Heartbeat settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatSettings {
    /// Send PING probes while connected
    pub enabled: bool,

    /// Probe interval in milliseconds
    pub interval_ms: u64,

    /// Acknowledgment timeout in milliseconds
    pub timeout_ms: u64,
}

/// Outbound queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Buffer messages sent while disconnected
    pub enabled: bool,

    /// Maximum buffered messages (oldest dropped first)
    pub max_size: usize,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// Default implementations

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/ws/pulse-job".to_string(),
            client_type: "cli".to_string(),
            connect_timeout_ms: 30000,
        }
    }
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1000,
            max_interval_ms: 30000,
            max_attempts: -1, // Unlimited
            backoff_rate: 1.5,
        }
    }
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 25000,
            timeout_ms: 10000,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 100,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl PulseConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                source: e,
            })?;
            config = Self::from_toml(&content)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML text without validating it
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse {
            message: e.message().to_string(),
            source: Some(e),
        })
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        let search_paths = [
            // Current directory
            PathBuf::from("pulse-link.toml"),
            PathBuf::from("config.toml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("pulse-link").join("client.toml"))
                .unwrap_or_default(),
            // Home directory
            dirs::home_dir()
                .map(|p| p.join(".pulse-link").join("client.toml"))
                .unwrap_or_default(),
            // System config (Linux)
            PathBuf::from("/etc/pulse-link/client.toml"),
        ];

        for path in &search_paths {
            if !path.as_os_str().is_empty() && path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Connection settings
        if let Ok(val) = std::env::var("PULSE_URL") {
            self.connection.url = val;
        }
        if let Ok(val) = std::env::var("PULSE_CLIENT_TYPE") {
            self.connection.client_type = val;
        }
        if let Ok(val) = std::env::var("PULSE_CONNECT_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.connection.connect_timeout_ms = n;
            }
        }

        // Reconnect settings
        if let Ok(val) = std::env::var("PULSE_RECONNECT_ENABLED") {
            self.reconnect.enabled = parse_flag(&val);
        }
        if let Ok(val) = std::env::var("PULSE_RECONNECT_INTERVAL_MS") {
            if let Ok(n) = val.parse() {
                self.reconnect.interval_ms = n;
            }
        }
        if let Ok(val) = std::env::var("PULSE_RECONNECT_MAX_INTERVAL_MS") {
            if let Ok(n) = val.parse() {
                self.reconnect.max_interval_ms = n;
            }
        }
        if let Ok(val) = std::env::var("PULSE_RECONNECT_MAX_ATTEMPTS") {
            if let Ok(n) = val.parse() {
                self.reconnect.max_attempts = n;
            }
        }
        if let Ok(val) = std::env::var("PULSE_RECONNECT_BACKOFF_RATE") {
            if let Ok(n) = val.parse() {
                self.reconnect.backoff_rate = n;
            }
        }

        // Heartbeat settings
        if let Ok(val) = std::env::var("PULSE_HEARTBEAT_ENABLED") {
            self.heartbeat.enabled = parse_flag(&val);
        }
        if let Ok(val) = std::env::var("PULSE_HEARTBEAT_INTERVAL_MS") {
            if let Ok(n) = val.parse() {
                self.heartbeat.interval_ms = n;
            }
        }
        if let Ok(val) = std::env::var("PULSE_HEARTBEAT_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.heartbeat.timeout_ms = n;
            }
        }

        // Queue settings
        if let Ok(val) = std::env::var("PULSE_QUEUE_ENABLED") {
            self.queue.enabled = parse_flag(&val);
        }
        if let Ok(val) = std::env::var("PULSE_QUEUE_MAX_SIZE") {
            if let Ok(n) = val.parse() {
                self.queue.max_size = n;
            }
        }

        // Logging settings
        if let Ok(val) = std::env::var("PULSE_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("PULSE_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("PULSE_LOG_JSON") {
            self.logging.json_format = parse_flag(&val);
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let url = &self.connection.url;
        if url.is_empty() {
            return Err(Error::config_field_invalid("connection.url", "URL cannot be empty"));
        }
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            return Err(Error::config_field_invalid(
                "connection.url",
                "URL must start with ws:// or wss://",
            ));
        }
        if let Err(e) = url::Url::parse(url) {
            return Err(Error::config_field_invalid(
                "connection.url",
                format!("invalid URL '{}': {}", url, e),
            ));
        }
        if self.connection.client_type.trim().is_empty() {
            return Err(Error::config_field_invalid(
                "connection.client_type",
                "client type cannot be empty",
            ));
        }
        if self.connection.connect_timeout_ms == 0 {
            return Err(Error::config_field_invalid(
                "connection.connect_timeout_ms",
                "must be greater than 0",
            ));
        }

        if self.reconnect.interval_ms == 0 {
            return Err(Error::config_field_invalid(
                "reconnect.interval_ms",
                "must be greater than 0",
            ));
        }
        if self.reconnect.max_interval_ms < self.reconnect.interval_ms {
            return Err(Error::config_field_invalid(
                "reconnect.max_interval_ms",
                "must be at least reconnect.interval_ms",
            ));
        }
        if self.reconnect.backoff_rate.is_nan() || self.reconnect.backoff_rate < 1.0 {
            return Err(Error::config_field_invalid(
                "reconnect.backoff_rate",
                "must be at least 1.0",
            ));
        }
        if self.reconnect.max_attempts < -1 || self.reconnect.max_attempts > u32::MAX as i64 {
            return Err(Error::config_field_invalid(
                "reconnect.max_attempts",
                "must be -1 (unlimited) or a non-negative count",
            ));
        }

        if self.heartbeat.interval_ms == 0 {
            return Err(Error::config_field_invalid(
                "heartbeat.interval_ms",
                "must be greater than 0",
            ));
        }
        if self.heartbeat.timeout_ms == 0 {
            return Err(Error::config_field_invalid(
                "heartbeat.timeout_ms",
                "must be greater than 0",
            ));
        }

        if self.queue.enabled && self.queue.max_size == 0 {
            return Err(Error::config_field_invalid(
                "queue.max_size",
                "must be at least 1 when the queue is enabled",
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Freeze into the runtime session configuration
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            url: self.connection.url.clone(),
            client_type: self.connection.client_type.clone(),
            connect_timeout: Duration::from_millis(self.connection.connect_timeout_ms),
            reconnect: ReconnectPolicy {
                enabled: self.reconnect.enabled,
                initial_interval: Duration::from_millis(self.reconnect.interval_ms),
                max_interval: Duration::from_millis(self.reconnect.max_interval_ms),
                max_attempts: u32::try_from(self.reconnect.max_attempts).ok(),
                multiplier: self.reconnect.backoff_rate,
            },
            heartbeat: HeartbeatPolicy {
                enabled: self.heartbeat.enabled,
                interval: Duration::from_millis(self.heartbeat.interval_ms),
                timeout: Duration::from_millis(self.heartbeat.timeout_ms),
            },
            queue: QueuePolicy {
                enabled: self.queue.enabled,
                capacity: self.queue.max_size,
            },
        }
    }
}

fn parse_flag(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".pulse-link")
                .join("client.toml")
        });

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
pub fn generate_default_config() -> String {
    r#"# pulse-link Configuration

[connection]
# PulseJob WebSocket endpoint
url = "ws://localhost:8080/ws/pulse-job"

# Client type label (sent as the clientType query parameter)
client_type = "cli"

# Connection timeout in milliseconds
connect_timeout_ms = 30000

[reconnect]
# Reconnect automatically after an abnormal close
enabled = true

# Delay before the first attempt in milliseconds
interval_ms = 1000

# Upper bound on the delay in milliseconds
max_interval_ms = 30000

# Maximum attempts (-1 = unlimited)
max_attempts = -1

# Growth factor between consecutive delays
backoff_rate = 1.5

[heartbeat]
# Send PING probes while connected
enabled = true

# Probe interval in milliseconds
interval_ms = 25000

# Close the connection if a probe is not acknowledged within this time
timeout_ms = 10000

[queue]
# Buffer messages sent while disconnected
enabled = true

# Maximum buffered messages (oldest dropped first)
max_size = 100

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.pulse-link/logs/client.log"

# Maximum log file size in MB before rotation
max_file_size_mb = 100

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}
