//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Each socket is split into a reader task and a writer task that pump
//! frames to and from a [`ChannelConnection`], so the tick loop only ever
//! touches channels.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::{ChannelConnection, Connection, Transport, TransportError};

/// A WebSocket-based [`Transport`] that listens for incoming connections.
///
/// Accepting runs on a background task; finished handshakes queue up
/// until the tick loop calls [`Transport::try_accept`].
pub struct WebSocketTransport {
    local_addr: SocketAddr,
    incoming: mpsc::UnboundedReceiver<ChannelConnection>,
    accept_task: JoinHandle<()>,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    ///
    /// Bind to port `0` and read [`local_addr`](Self::local_addr) to get
    /// an OS-assigned port.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        let local_addr = listener
            .local_addr()
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(%local_addr, "WebSocket transport listening");

        let (tx, incoming) = mpsc::unbounded_channel();
        let accept_task = tokio::spawn(accept_loop(listener, tx));

        Ok(Self {
            local_addr,
            incoming,
            accept_task,
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

impl Transport for WebSocketTransport {
    type Connection = ChannelConnection;

    fn try_accept(&mut self) -> Result<Option<ChannelConnection>, TransportError> {
        match self.incoming.try_recv() {
            Ok(conn) => Ok(Some(conn)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Shutdown),
        }
    }
}

async fn accept_loop(listener: TcpListener, tx: mpsc::UnboundedSender<ChannelConnection>) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept failed");
                continue;
            }
        };

        let tx = tx.clone();
        // Handshake on its own task so one slow peer can't stall accepts.
        tokio::spawn(async move {
            match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => {
                    let conn = bridge(ws);
                    tracing::debug!(id = %conn.id(), %addr, "accepted WebSocket connection");
                    let _ = tx.send(conn);
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "WebSocket handshake failed");
                }
            }
        });
    }
}

/// Dials a WebSocket server, e.g. `ws://127.0.0.1:7777`.
pub async fn connect(url: &str) -> Result<ChannelConnection, TransportError> {
    let (ws, _) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
        TransportError::ConnectFailed(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            e,
        ))
    })?;
    let conn = bridge(ws);
    tracing::debug!(id = %conn.id(), url, "WebSocket connected");
    Ok(conn)
}

/// Spawns the pump tasks for one socket and returns the local end.
fn bridge<S>(ws: WebSocketStream<S>) -> ChannelConnection
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(async move {
        while let Some(data) = out_rx.recv().await {
            if let Err(e) = sink.send(Message::Binary(data.into())).await {
                tracing::debug!(error = %e, "WebSocket send failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            let data: Vec<u8> = match msg {
                Ok(Message::Binary(data)) => data.into(),
                Ok(Message::Text(text)) => text.as_bytes().to_vec(),
                Ok(Message::Close(_)) => break,
                Ok(_) => continue, // skip ping/pong/frame
                Err(e) => {
                    tracing::debug!(error = %e, "WebSocket receive failed");
                    break;
                }
            };
            if in_tx.send(data).is_err() {
                break;
            }
        }
        // Dropping `in_tx` surfaces as ConnectionClosed on the local end.
    });

    ChannelConnection::new(out_tx, in_rx)
}
