//! Session layer
//!
//! Everything that makes one logical client session survive the loss of
//! individual connections:
//! - [`ConnectionManager`]: the state machine tying the pieces together
//! - [`HeartbeatMonitor`]: liveness probing and dead-connection detection
//! - [`ReconnectScheduler`]: backoff and attempt budget
//! - [`OutboundQueue`]: sends made while disconnected
//! - [`SubscriptionRegistry`]: topic subscribers and server announcements
//! - [`EventBus`]: lifecycle and message listeners

mod bus;
mod dispatch;
mod heartbeat;
mod manager;
mod queue;
mod reconnect;
mod registry;
mod state;

pub use bus::{callback, Callback, ClientEvent, EventBus, EventName, Handle, ListenerHandle};
pub use dispatch::{Builtin, Dispatcher};
pub use heartbeat::{HeartbeatMonitor, HeartbeatPolicy, HeartbeatTimer};
pub use manager::{ConnectionManager, SessionStatus};
pub use queue::{OutboundQueue, QueuePolicy};
pub use reconnect::{ReconnectDecision, ReconnectPolicy, ReconnectScheduler};
pub use registry::{SubscriptionHandle, SubscriptionRegistry};
pub use state::{generate_client_id, ClientConfig, ClientSession, ConnectionState};
