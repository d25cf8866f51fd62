//! Error types for the session layer.

use warroom_transport::ConnectionId;

/// Errors the gatekeeper returns for misuse by the server loop.
///
/// A denied handshake is not an error: it is an ordinary
/// [`HandshakeOutcome::Denied`](crate::HandshakeOutcome::Denied).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session exists for this connection. It was never registered or
    /// has already been dropped.
    #[error("no session for {0}")]
    NotFound(ConnectionId),

    /// The connection was registered twice.
    #[error("{0} is already registered")]
    AlreadyRegistered(ConnectionId),

    /// A second handshake arrived on an approved connection.
    #[error("{0} is already approved")]
    AlreadyApproved(ConnectionId),
}
