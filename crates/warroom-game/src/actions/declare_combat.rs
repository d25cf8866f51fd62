use rand::RngCore;
use warroom_protocol::{ByteReader, ByteWriter, PlayerSlot, ProtocolError, WireDecode, WireEncode};
use warroom_world::EntityId;

use super::{Action, ActionKind, Rejection, read_slot_byte, require_owned_unit, require_phase, require_turn, write_slot_byte};
use crate::entities::{CombatOption, read_id, read_ids, write_id, write_ids};
use crate::{GameError, GamePhase, GameState};

/// Commits the actor to attacking `defender` at `tile`.
///
/// The actor needs units on the tile or supporting units next to it.
/// Supporting units must be the actor's own and stand on a tile adjacent
/// to `tile`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclareCombat {
    pub tile: EntityId,
    pub defender: PlayerSlot,
    pub supporting_units: Vec<EntityId>,
}

impl Action for DeclareCombat {
    const KIND: ActionKind = ActionKind::DeclareCombat;

    fn validate(&self, state: &GameState, actor: PlayerSlot) -> Result<(), Rejection> {
        require_phase(state, GamePhase::CommitCombats)?;
        require_turn(state, actor)?;
        if self.defender == actor {
            return Err(Rejection::new("Cannot attack yourself"));
        }
        let tile = state
            .tile(self.tile)
            .ok_or_else(|| Rejection::new(format!("Tile {} does not exist", self.tile)))?;

        let present = |faction: PlayerSlot| {
            state
                .units()
                .any(|(_, u)| u.tile == Some(self.tile) && u.faction == Some(faction) && u.is_alive())
        };
        if !present(self.defender) {
            return Err(Rejection::new("Defender has no units there"));
        }
        if !present(actor) && self.supporting_units.is_empty() {
            return Err(Rejection::new("You have no units in that fight"));
        }

        for id in &self.supporting_units {
            let unit = require_owned_unit(state, actor, *id)?;
            let adjacent = unit.tile.is_some_and(|t| tile.is_adjacent(t));
            if !adjacent {
                return Err(Rejection::new(format!("Unit {id} cannot support that tile")));
            }
        }

        let duplicate = state.match_state().is_ok_and(|m| {
            m.committed_combats
                .iter()
                .any(|c| c.tile == self.tile && c.attacker == actor && c.defender == self.defender)
        });
        if duplicate {
            return Err(Rejection::new("Combat already declared"));
        }
        Ok(())
    }

    fn execute(self, state: &mut GameState, actor: PlayerSlot, _rng: &mut dyn RngCore) -> Result<(), GameError> {
        tracing::debug!(tile = %self.tile, attacker = %actor, defender = %self.defender, "combat declared");
        state.match_state_mut()?.committed_combats.push(CombatOption {
            tile: self.tile,
            attacker: actor,
            defender: self.defender,
            supporting_units: self.supporting_units,
        });
        Ok(())
    }
}

impl WireEncode for DeclareCombat {
    fn encode(&self, w: &mut ByteWriter) -> Result<(), ProtocolError> {
        write_id(w, self.tile);
        write_slot_byte(w, self.defender);
        write_ids(w, &self.supporting_units)
    }
}

impl WireDecode for DeclareCombat {
    fn decode(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            tile: read_id(r)?,
            defender: read_slot_byte(r)?,
            supporting_units: read_ids(r)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::config::standard_units;
    use crate::testing::{ATTACKER, DEFENDER, commit_state};

    fn attack(tile: u32, supporting: &[u32]) -> DeclareCombat {
        DeclareCombat {
            tile: EntityId(tile),
            defender: DEFENDER,
            supporting_units: supporting.iter().map(|u| EntityId(*u)).collect(),
        }
    }

    #[test]
    fn test_declare_combat_with_units_on_tile() {
        let mut state = commit_state();
        // Put the attacker on the defender's tile.
        state.unit_mut(EntityId(0)).unwrap().tile = Some(EntityId(1));
        assert!(attack(1, &[]).validate(&state, ATTACKER).is_ok());
    }

    #[test]
    fn test_declare_combat_with_supporting_units_only() {
        let state = commit_state();
        // Attacker's unit on tile 0 is adjacent to tile 1.
        assert!(attack(1, &[0]).validate(&state, ATTACKER).is_ok());
    }

    #[test]
    fn test_declare_combat_needs_attacker_presence() {
        let state = commit_state();
        let err = attack(1, &[]).validate(&state, ATTACKER).unwrap_err();
        assert_eq!(err.reason(), "You have no units in that fight");
    }

    #[test]
    fn test_declare_combat_needs_defender_presence() {
        let state = commit_state();
        let err = attack(0, &[]).validate(&state, ATTACKER).unwrap_err();
        assert_eq!(err.reason(), "Defender has no units there");
    }

    #[test]
    fn test_declare_combat_against_self() {
        let state = commit_state();
        let action = DeclareCombat {
            defender: ATTACKER,
            ..attack(0, &[])
        };
        let err = action.validate(&state, ATTACKER).unwrap_err();
        assert_eq!(err.reason(), "Cannot attack yourself");
    }

    #[test]
    fn test_declare_combat_support_must_be_adjacent() {
        let mut state = commit_state();
        let far = state
            .create_unit(ATTACKER, standard_units::FLEET, EntityId(2), 1)
            .unwrap();
        let err = attack(1, &[0, far.0]).validate(&state, ATTACKER).unwrap_err();
        assert_eq!(err.reason(), format!("Unit {far} cannot support that tile"));
    }

    #[test]
    fn test_declare_combat_support_must_be_owned() {
        let state = commit_state();
        let err = attack(1, &[1]).validate(&state, ATTACKER).unwrap_err();
        assert_eq!(err.reason(), "Unit #1 is not yours");
    }

    #[test]
    fn test_declare_combat_twice_is_rejected() {
        let mut state = commit_state();
        let mut rng = StdRng::seed_from_u64(0);
        attack(1, &[0]).execute(&mut state, ATTACKER, &mut rng).unwrap();

        let committed = &state.match_state().unwrap().committed_combats;
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].supporting_units, vec![EntityId(0)]);

        let err = attack(1, &[0]).validate(&state, ATTACKER).unwrap_err();
        assert_eq!(err.reason(), "Combat already declared");
    }

    #[test]
    fn test_declare_combat_wire() {
        let action = attack(5, &[1, 2]);
        assert_eq!(DeclareCombat::from_bytes(&action.to_bytes().unwrap()).unwrap(), action);
    }
}
