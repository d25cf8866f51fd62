//! Error types for the world layer.

use warroom_protocol::ProtocolError;

/// Errors raised by the registries and the replication channel.
///
/// Variants split into two groups. Harmless ones ([`UnknownType`],
/// [`NotImplemented`]) are logged and the update dropped; everything else
/// means the two replicas no longer agree on structure and the connection
/// must go.
///
/// [`UnknownType`]: WorldError::UnknownType
/// [`NotImplemented`]: WorldError::NotImplemented
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// More kinds than fit in a one-byte id.
    #[error("{0} kinds registered, at most 256 fit in a byte id")]
    TooManyKinds(usize),

    /// A kind id that this peer does not know.
    #[error("unknown type id {0}")]
    UnknownType(u8),

    /// A kind that is known to the type registry but has no array.
    #[error("kind {0} has no entity array")]
    UnregisteredKind(&'static str),

    /// `register_kind` called twice for the same kind.
    #[error("kind {0} is already registered")]
    AlreadyRegistered(&'static str),

    /// An id outside the fixed capacity of its kind's array.
    #[error("id {id} out of range for {kind} (capacity {capacity})")]
    IdOutOfRange {
        kind: &'static str,
        id: i64,
        capacity: usize,
    },

    /// The entity has no handler for this custom-update sub-header.
    #[error("custom update {header} not implemented for {kind}")]
    NotImplemented { kind: &'static str, header: u8 },

    /// The routing header was neither full-state nor custom-update.
    #[error("unknown routing header {0}")]
    UnknownRouting(u8),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl WorldError {
    /// Whether the connection that produced this error must be dropped.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::UnknownType(_) | Self::NotImplemented { .. } => false,
            Self::Protocol(e) => e.is_peer_fault(),
            _ => true,
        }
    }
}
