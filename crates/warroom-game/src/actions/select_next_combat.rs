use rand::RngCore;
use warroom_protocol::{ByteReader, ByteWriter, PlayerSlot, ProtocolError, WireDecode, WireEncode};
use warroom_world::EntityId;

use super::{Action, ActionKind, Rejection, require_phase, require_turn};
use crate::combat::{CombatResolver, CombatStage};
use crate::entities::{read_id, write_id};
use crate::{GameError, GamePhase, GameState};

/// Picks which committed combat resolves next and starts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectNextCombat {
    pub tile: EntityId,
}

impl Action for SelectNextCombat {
    const KIND: ActionKind = ActionKind::SelectNextCombat;

    fn validate(&self, state: &GameState, actor: PlayerSlot) -> Result<(), Rejection> {
        require_phase(state, GamePhase::SelectNextCombat)?;
        require_turn(state, actor)?;
        let declared = state
            .match_state()
            .is_ok_and(|m| m.committed_combats.iter().any(|c| c.tile == self.tile));
        if !declared {
            return Err(Rejection::new("No combat declared there"));
        }
        Ok(())
    }

    fn execute(self, state: &mut GameState, actor: PlayerSlot, _rng: &mut dyn RngCore) -> Result<(), GameError> {
        let option = {
            let m = state.match_state_mut()?;
            let index = m
                .committed_combats
                .iter()
                .position(|c| c.tile == self.tile)
                .ok_or_else(|| GameError::Rejected("No combat declared there".into()))?;
            m.phase = GamePhase::Combat;
            m.committed_combats.remove(index)
        };
        tracing::debug!(tile = %self.tile, %actor, "combat selected");
        if CombatResolver::new(state).start(option)? == CombatStage::Ended {
            state.finish_combat()?;
        }
        Ok(())
    }
}

impl WireEncode for SelectNextCombat {
    fn encode(&self, w: &mut ByteWriter) -> Result<(), ProtocolError> {
        write_id(w, self.tile);
        Ok(())
    }
}

impl WireDecode for SelectNextCombat {
    fn decode(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self { tile: read_id(r)? })
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::combat::combat_stage;
    use crate::testing::{ATTACKER, DEFENDER, select_state};

    #[test]
    fn test_select_next_combat_starts_resolver() {
        let mut state = select_state();
        let mut rng = StdRng::seed_from_u64(0);
        let action = SelectNextCombat { tile: EntityId(0) };
        action.validate(&state, ATTACKER).unwrap();
        action.execute(&mut state, ATTACKER, &mut rng).unwrap();

        let m = state.match_state().unwrap();
        assert_eq!(m.phase, GamePhase::Combat);
        assert!(m.committed_combats.is_empty());
        assert_eq!(combat_stage(&state), CombatStage::AwaitingDiceChoice(DEFENDER));
    }

    #[test]
    fn test_select_next_combat_needs_declared_tile() {
        let state = select_state();
        let err = SelectNextCombat { tile: EntityId(3) }
            .validate(&state, ATTACKER)
            .unwrap_err();
        assert_eq!(err.reason(), "No combat declared there");
    }

    #[test]
    fn test_select_next_combat_is_turn_gated() {
        let state = select_state();
        let err = SelectNextCombat { tile: EntityId(0) }
            .validate(&state, DEFENDER)
            .unwrap_err();
        assert_eq!(err.reason(), "It is not your turn");
    }

    #[test]
    fn test_select_combat_whose_defender_left_ends_immediately() {
        let mut state = select_state();
        let mut rng = StdRng::seed_from_u64(0);
        state.kill_unit(EntityId(1)).unwrap();
        SelectNextCombat { tile: EntityId(0) }
            .execute(&mut state, ATTACKER, &mut rng)
            .unwrap();
        assert_eq!(combat_stage(&state), CombatStage::Idle);
        assert_eq!(state.phase(), GamePhase::Finished);
    }
}
