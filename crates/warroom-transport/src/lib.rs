//! Transport abstraction layer for Warroom.
//!
//! Provides the [`Transport`] and [`Connection`] traits the authoritative
//! tick loop polls. Both are non-blocking: the loop drains whatever is
//! pending on every connection once per tick and never awaits the network.
//! Implementations bridge their I/O into in-process channels on background
//! tasks, so a poll is just a channel `try_recv`.
//!
//! Every transport must deliver frames reliably and in order per
//! connection. Replication depends on it and implements no retransmission.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`
//! - `memory` (default): in-process loopback, used by tests and demos

mod channel;
mod error;
#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use channel::ChannelConnection;
pub use error::TransportError;
#[cfg(feature = "memory")]
pub use memory::{MemoryConnector, MemoryTransport, memory_transport};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketTransport, connect};

use std::fmt;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Hands out newly established connections.
pub trait Transport: Send + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;

    /// Returns the next connection that finished establishing, if any.
    ///
    /// # Errors
    /// Returns [`TransportError::Shutdown`] once the transport can no
    /// longer produce connections.
    fn try_accept(&mut self) -> Result<Option<Self::Connection>, TransportError>;
}

/// A single reliable, ordered, message-framed connection.
pub trait Connection: Send + 'static {
    /// Queues a frame for delivery to the remote peer.
    ///
    /// # Errors
    /// Returns [`TransportError::ConnectionClosed`] if the connection is gone.
    fn send(&self, data: Vec<u8>) -> Result<(), TransportError>;

    /// Returns the next received frame, or `Ok(None)` if nothing is pending.
    ///
    /// # Errors
    /// Returns [`TransportError::ConnectionClosed`] once the peer has gone
    /// away and every frame it sent has been drained.
    fn try_recv(&mut self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Closes the connection. Further sends fail; pending frames are dropped.
    fn close(&mut self);

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_orders_by_value() {
        let mut ids = vec![ConnectionId::new(3), ConnectionId::new(1), ConnectionId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![ConnectionId::new(1), ConnectionId::new(2), ConnectionId::new(3)]);
    }
}
