//! Wire protocol for the PulseJob session channel
//!
//! Defines the envelope, the closed set of message kinds, close codes and
//! the well-known topics. The protocol is JSON text frames over WebSocket.

pub mod close;
mod messages;
pub mod topics;

pub use close::{
    CloseClass, ABNORMAL_CLOSURE, HEARTBEAT_TIMEOUT, NORMAL_CLOSURE, NO_STATUS_RECEIVED,
};
pub use messages::*;
