//! Channel-backed connection shared by every transport.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::{Connection, ConnectionId, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_connection_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

/// A [`Connection`] whose frames flow through unbounded in-process channels.
///
/// The other end of each channel is either another `ChannelConnection`
/// (memory transport) or a pair of pump tasks driving a real socket
/// (WebSocket transport).
#[derive(Debug)]
pub struct ChannelConnection {
    id: ConnectionId,
    outbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl ChannelConnection {
    pub(crate) fn new(
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    ) -> Self {
        Self {
            id: next_connection_id(),
            outbound: Some(outbound),
            inbound,
        }
    }

    /// Creates two connections wired to each other.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (Self::new(a_tx, a_rx), Self::new(b_tx, b_rx))
    }
}

impl Connection for ChannelConnection {
    fn send(&self, data: Vec<u8>) -> Result<(), TransportError> {
        let Some(tx) = &self.outbound else {
            return Err(TransportError::ConnectionClosed("closed locally".into()));
        };
        tx.send(data)
            .map_err(|_| TransportError::ConnectionClosed("peer dropped".into()))
    }

    fn try_recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match self.inbound.try_recv() {
            Ok(data) => Ok(Some(data)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                Err(TransportError::ConnectionClosed("peer dropped".into()))
            }
        }
    }

    fn close(&mut self) {
        self.outbound = None;
        self.inbound.close();
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_delivers_in_order() {
        let (a, mut b) = ChannelConnection::pair();
        a.send(vec![1]).unwrap();
        a.send(vec![2]).unwrap();
        assert_eq!(b.try_recv().unwrap(), Some(vec![1]));
        assert_eq!(b.try_recv().unwrap(), Some(vec![2]));
        assert_eq!(b.try_recv().unwrap(), None);
    }

    #[test]
    fn test_pair_ids_are_distinct() {
        let (a, b) = ChannelConnection::pair();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_close_is_seen_by_peer_after_drain() {
        let (mut a, mut b) = ChannelConnection::pair();
        a.send(vec![7]).unwrap();
        a.close();
        assert_eq!(b.try_recv().unwrap(), Some(vec![7]));
        assert!(matches!(
            b.try_recv(),
            Err(TransportError::ConnectionClosed(_))
        ));
    }

    #[test]
    fn test_send_after_close_fails() {
        let (mut a, _b) = ChannelConnection::pair();
        a.close();
        assert!(a.send(vec![1]).is_err());
    }
}
