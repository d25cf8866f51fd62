//! Error types for the game layer.

use warroom_protocol::ProtocolError;
use warroom_world::{EntityId, WorldError};

/// Errors that can occur while running the ruleset.
///
/// Validation failures are not errors: they come back as a
/// [`Rejection`](crate::Rejection) and the state is untouched. A
/// `GameError` means the state or the input broke a contract.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// The ruleset JSON could not be parsed.
    #[error("invalid ruleset: {0}")]
    Ruleset(#[from] serde_json::Error),

    #[error(transparent)]
    World(#[from] WorldError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Every unit id is in use.
    #[error("no free unit ids (capacity {0})")]
    CapacityExhausted(usize),

    /// A scenario asks for more entities than the wire can address.
    #[error("scenario has {requested} {kind}s, at most {max} are addressable")]
    ScenarioTooLarge {
        kind: &'static str,
        requested: u32,
        max: u32,
    },

    /// A unit references a unit type the ruleset does not have.
    #[error("unknown unit type {0}")]
    UnknownUnitType(i32),

    /// The match entity was never spawned.
    #[error("match entity missing")]
    NoMatch,

    /// An entity that must exist does not.
    #[error("missing {kind} {id}")]
    MissingEntity { kind: &'static str, id: EntityId },

    /// The resolver was driven in a way its caller should have prevented,
    /// e.g. dice allocated to a category with no target.
    #[error("combat contract violated: {0}")]
    CombatContract(String),

    /// A combat operation was attempted with no combat running.
    #[error("no combat in progress")]
    NoCombat,

    /// A combat was started while another one is active.
    #[error("a combat is already in progress")]
    CombatInProgress,

    /// An action was executed without passing validation first.
    #[error("action rejected: {0}")]
    Rejected(String),
}

impl GameError {
    /// Whether a peer that caused this error should be disconnected.
    ///
    /// Only malformed input from the wire qualifies. Everything else is a
    /// server-side bug that the peer had no part in.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Protocol(e) => e.is_peer_fault(),
            Self::World(e) => e.is_fatal(),
            _ => false,
        }
    }
}
