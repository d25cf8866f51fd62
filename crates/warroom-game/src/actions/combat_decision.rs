use rand::RngCore;
use warroom_protocol::{ByteReader, ByteWriter, PlayerSlot, ProtocolError, WireDecode, WireEncode};

use super::{Action, ActionKind, Rejection};
use crate::combat::{self, CombatResolver, CombatStage, DiceAllocation};
use crate::{GameError, GameState};

/// The phasing faction's dice allocation for its volley.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombatDecision {
    pub dice: DiceAllocation,
}

impl Action for CombatDecision {
    const KIND: ActionKind = ActionKind::CombatDecision;

    fn validate(&self, state: &GameState, actor: PlayerSlot) -> Result<(), Rejection> {
        combat::validate_decision(state, actor, &self.dice)
    }

    fn execute(self, state: &mut GameState, actor: PlayerSlot, rng: &mut dyn RngCore) -> Result<(), GameError> {
        let stage = CombatResolver::new(state).resolve_volley(actor, self.dice, rng)?;
        if stage == CombatStage::Ended {
            state.finish_combat()?;
        }
        Ok(())
    }
}

impl WireEncode for CombatDecision {
    fn encode(&self, w: &mut ByteWriter) -> Result<(), ProtocolError> {
        self.dice.write(w);
        Ok(())
    }
}

impl WireDecode for CombatDecision {
    fn decode(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            dice: DiceAllocation::read(r)?,
        })
    }
}
