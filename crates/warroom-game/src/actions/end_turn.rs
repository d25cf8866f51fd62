use rand::RngCore;
use warroom_protocol::{ByteReader, ByteWriter, PlayerSlot, ProtocolError, WireDecode, WireEncode};

use super::{Action, ActionKind, Rejection, require_turn};
use crate::{GameError, GamePhase, GameState};

/// Passes the turn to the next faction. The last faction's pass moves the
/// match to the next phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndTurn;

impl Action for EndTurn {
    const KIND: ActionKind = ActionKind::EndTurn;

    fn validate(&self, state: &GameState, actor: PlayerSlot) -> Result<(), Rejection> {
        let phase = state.phase();
        if !matches!(phase, GamePhase::GiveCommands | GamePhase::CommitCombats) {
            return Err(Rejection::new(format!("Not allowed during {phase}")));
        }
        require_turn(state, actor)
    }

    fn execute(self, state: &mut GameState, actor: PlayerSlot, _rng: &mut dyn RngCore) -> Result<(), GameError> {
        tracing::debug!(%actor, "turn ended");
        state.end_turn()
    }
}

impl WireEncode for EndTurn {
    fn encode(&self, _w: &mut ByteWriter) -> Result<(), ProtocolError> {
        Ok(())
    }
}

impl WireDecode for EndTurn {
    fn decode(_r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self)
    }
}
