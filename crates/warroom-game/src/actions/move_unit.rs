use rand::RngCore;
use warroom_protocol::{ByteReader, ByteWriter, PlayerSlot, ProtocolError, WireDecode, WireEncode};
use warroom_world::EntityId;

use super::{Action, ActionKind, Rejection, require_budget, require_owned_unit, require_phase, require_turn};
use crate::entities::{read_id, read_ids, write_id, write_ids};
use crate::{GameError, GamePhase, GameState};

/// Moves one of the actor's units along a path of adjacent tiles.
///
/// Costs one command. The path excludes the starting tile and may be at
/// most the unit's (modified) movement long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveUnit {
    pub unit: EntityId,
    pub path: Vec<EntityId>,
}

impl Action for MoveUnit {
    const KIND: ActionKind = ActionKind::MoveUnit;

    fn validate(&self, state: &GameState, actor: PlayerSlot) -> Result<(), Rejection> {
        require_phase(state, GamePhase::GiveCommands)?;
        require_turn(state, actor)?;
        let unit = require_owned_unit(state, actor, self.unit)?;
        let commands = state.faction(actor).map_or(0, |f| i32::from(f.commands));
        require_budget("commands", commands, 1)?;

        if self.path.is_empty() {
            return Err(Rejection::new("Path is empty"));
        }
        let unit_type = state
            .effective_type(unit)
            .map_err(|_| Rejection::new("Unit type is unknown"))?;
        if self.path.len() > usize::from(unit_type.movement) {
            return Err(Rejection::new("Path is longer than the unit can move"));
        }

        let mut from = unit
            .tile
            .and_then(|id| state.tile(id))
            .ok_or_else(|| Rejection::new("Unit is not on the map"))?;
        for step in &self.path {
            let tile = state
                .tile(*step)
                .ok_or_else(|| Rejection::new(format!("Tile {step} does not exist")))?;
            if !from.is_adjacent(*step) {
                return Err(Rejection::new(format!("Tile {step} is not adjacent")));
            }
            if !tile.terrain.admits(unit_type.category) {
                return Err(Rejection::new(format!("Unit cannot enter tile {step}")));
            }
            from = tile;
        }
        Ok(())
    }

    fn execute(self, state: &mut GameState, actor: PlayerSlot, _rng: &mut dyn RngCore) -> Result<(), GameError> {
        state.move_unit(self.unit, &self.path)?;
        state.faction_mut(actor)?.commands -= 1;
        tracing::debug!(unit = %self.unit, %actor, steps = self.path.len(), "unit moved");
        Ok(())
    }
}

impl WireEncode for MoveUnit {
    fn encode(&self, w: &mut ByteWriter) -> Result<(), ProtocolError> {
        write_id(w, self.unit);
        write_ids(w, &self.path)
    }
}

impl WireDecode for MoveUnit {
    fn decode(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            unit: read_id(r)?,
            path: read_ids(r)?,
        })
    }
}
