//! In-process loopback transport.
//!
//! ```rust
//! use warroom_transport::{memory_transport, Connection, Transport};
//!
//! let (mut transport, connector) = memory_transport();
//! let client = connector.connect().unwrap();
//! let mut server_side = transport.try_accept().unwrap().unwrap();
//! client.send(b"hi".to_vec()).unwrap();
//! assert_eq!(server_side.try_recv().unwrap(), Some(b"hi".to_vec()));
//! ```

use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::{ChannelConnection, Connection, Transport, TransportError};

/// Creates a memory transport and the connector clients dial it through.
pub fn memory_transport() -> (MemoryTransport, MemoryConnector) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MemoryTransport { incoming: rx }, MemoryConnector { tx })
}

/// Server half of the loopback.
#[derive(Debug)]
pub struct MemoryTransport {
    incoming: mpsc::UnboundedReceiver<ChannelConnection>,
}

impl Transport for MemoryTransport {
    type Connection = ChannelConnection;

    fn try_accept(&mut self) -> Result<Option<ChannelConnection>, TransportError> {
        match self.incoming.try_recv() {
            Ok(conn) => Ok(Some(conn)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Shutdown),
        }
    }
}

/// Client half of the loopback. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    tx: mpsc::UnboundedSender<ChannelConnection>,
}

impl MemoryConnector {
    /// Opens a new connection. The server sees it on its next `try_accept`.
    pub fn connect(&self) -> Result<ChannelConnection, TransportError> {
        let (client, server) = ChannelConnection::pair();
        self.tx
            .send(server)
            .map_err(|_| TransportError::Shutdown)?;
        tracing::debug!(id = %client.id(), "memory connection opened");
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_is_empty_until_connect() {
        let (mut transport, connector) = memory_transport();
        assert!(transport.try_accept().unwrap().is_none());
        let _client = connector.connect().unwrap();
        assert!(transport.try_accept().unwrap().is_some());
    }

    #[test]
    fn test_connect_after_transport_dropped_fails() {
        let (transport, connector) = memory_transport();
        drop(transport);
        assert!(matches!(connector.connect(), Err(TransportError::Shutdown)));
    }

    #[test]
    fn test_both_directions_flow() {
        let (mut transport, connector) = memory_transport();
        let mut client = connector.connect().unwrap();
        let mut server = transport.try_accept().unwrap().unwrap();
        server.send(vec![1, 2]).unwrap();
        client.send(vec![3]).unwrap();
        assert_eq!(client.try_recv().unwrap(), Some(vec![1, 2]));
        assert_eq!(server.try_recv().unwrap(), Some(vec![3]));
    }
}
