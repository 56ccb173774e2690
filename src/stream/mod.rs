// Persistent streaming connection: state machine, backoff, websocket transport
pub mod backoff;
pub mod manager;
pub mod transport;

use serde::Serialize;
use thiserror::Error;

pub use backoff::BackoffPolicy;
pub use manager::{ConnectionHandle, ConnectionManager, StreamHandler};
pub use transport::{StreamConnection, Transport, WsTransport};

/// Lifecycle of the persistent streaming connection
///
/// Owned exclusively by the ConnectionManager; observers read it through the
/// handle's watch channel. `Terminated` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting,
    Terminated,
}

/// Transient-network failures surfaced by the streaming layer
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("connect attempt timed out")]
    ConnectTimeout,
    #[error("stream error: {0}")]
    Transport(String),
    #[error("reconnect attempts exhausted after {0} tries")]
    RetriesExhausted(u32),
}
