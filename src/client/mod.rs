//! Async client runtime
//!
//! Runs a [`crate::session::ConnectionManager`] on its own tokio task over the
//! WebSocket transport and tokio timers, and exposes it through a cloneable
//! handle.

mod runtime;

pub use runtime::*;
