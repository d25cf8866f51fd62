//! Unified error type for the Warroom stack.

use warroom_game::GameError;
use warroom_protocol::ProtocolError;
use warroom_session::SessionError;
use warroom_transport::TransportError;
use warroom_world::WorldError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `warroom` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant generates the `From` impls, so `?` converts
/// sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum WarroomError {
    /// A transport-level error (connection, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Malformed bytes on the wire.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Registry or replication failure.
    #[error(transparent)]
    World(#[from] WorldError),

    /// The ruleset or an action broke a contract.
    #[error(transparent)]
    Game(#[from] GameError),

    /// Gatekeeper bookkeeping.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The server announced a registry shape that hashes differently
    /// from what this peer rebuilt.
    #[error("structural hash mismatch: server {expected}, local {actual}")]
    StructuralMismatch { expected: i32, actual: i32 },

    /// The client tried to act before the handshake was approved.
    #[error("not approved by the server")]
    NotApproved,
}

impl WarroomError {
    /// Whether the connection this error came from must be closed.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Protocol(_) | Self::StructuralMismatch { .. } => true,
            Self::Transport(e) => matches!(e, TransportError::ConnectionClosed(_) | TransportError::Shutdown),
            Self::World(e) => e.is_fatal(),
            Self::Game(e) => e.is_fatal(),
            Self::Session(_) | Self::NotApproved => false,
        }
    }
}
