//! Close signaling
//!
//! Close codes understood by the session layer. Only the normal-closure code
//! ends a session for good; everything else is eligible for reconnection.

/// Intentional shutdown by either side
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close frame carried no status code
pub const NO_STATUS_RECEIVED: u16 = 1005;

/// No close frame was received (socket dropped, open failed)
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Forced closure after an unacknowledged heartbeat probe
pub const HEARTBEAT_TIMEOUT: u16 = 4000;

/// How the connection manager treats a close signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseClass {
    /// Intentional, never reconnect automatically
    Normal,
    /// Heartbeat watchdog fired
    HeartbeatTimeout,
    /// Anything else
    Abnormal,
}

impl CloseClass {
    /// Classify a close code
    pub fn of(code: u16) -> Self {
        match code {
            NORMAL_CLOSURE => CloseClass::Normal,
            HEARTBEAT_TIMEOUT => CloseClass::HeartbeatTimeout,
            _ => CloseClass::Abnormal,
        }
    }

    /// Check if this closure may be followed by automatic reconnection
    pub fn may_reconnect(&self) -> bool {
        !matches!(self, CloseClass::Normal)
    }
}
