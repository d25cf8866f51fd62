use warroom_protocol::{ByteReader, ByteWriter, PlayerSlot, ProtocolError};
use warroom_world::{EntityId, Inspection};

use super::{ids_json, read_id, read_ids, read_required_slot, write_id, write_ids, write_slot};
use crate::GamePhase;
use crate::combat::CombatState;

/// A declared attack waiting to be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombatOption {
    pub tile: EntityId,
    pub attacker: PlayerSlot,
    pub defender: PlayerSlot,
    /// Attacker units on adjacent tiles that join the fight.
    pub supporting_units: Vec<EntityId>,
}

impl CombatOption {
    pub(crate) fn write(&self, w: &mut ByteWriter) -> Result<(), ProtocolError> {
        write_id(w, self.tile);
        write_slot(w, Some(self.attacker));
        write_slot(w, Some(self.defender));
        write_ids(w, &self.supporting_units)
    }

    pub(crate) fn read(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            tile: read_id(r)?,
            attacker: read_required_slot(r)?,
            defender: read_required_slot(r)?,
            supporting_units: read_ids(r)?,
        })
    }
}

/// Match-wide state. There is exactly one, at id 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchState {
    pub phase: GamePhase,
    pub round: u16,
    pub turn_order: Vec<PlayerSlot>,
    pub turn_position: u8,
    pub committed_combats: Vec<CombatOption>,
    /// The single active combat, if any.
    pub combat: Option<CombatState>,
    pub next_combat_id: i32,
    pub next_roll_id: i32,
}

impl MatchState {
    /// The faction whose turn it is.
    pub fn current_turn(&self) -> Option<PlayerSlot> {
        self.turn_order.get(usize::from(self.turn_position)).copied()
    }

    pub(super) fn write_full_state(&self, w: &mut ByteWriter) -> Result<(), ProtocolError> {
        w.write_u8(self.phase.as_u8());
        w.write_u16(self.round);
        w.write_short_len(self.turn_order.len())?;
        for slot in &self.turn_order {
            w.write_u8(slot.0);
        }
        w.write_u8(self.turn_position);
        w.write_len(self.committed_combats.len())?;
        for option in &self.committed_combats {
            option.write(w)?;
        }
        match &self.combat {
            Some(combat) => {
                w.write_bool(true);
                combat.write(w)?;
            }
            None => w.write_bool(false),
        }
        w.write_i32(self.next_combat_id);
        w.write_i32(self.next_roll_id);
        Ok(())
    }

    pub(super) fn read_full_state(&mut self, r: &mut ByteReader<'_>) -> Result<(), ProtocolError> {
        let phase = r.read_u8()?;
        self.phase = GamePhase::from_u8(phase)
            .ok_or_else(|| ProtocolError::InvalidMessage(format!("phase {phase}")))?;
        self.round = r.read_u16()?;
        let n = r.read_u8()?;
        self.turn_order = (0..n).map(|_| r.read_u8().map(PlayerSlot)).collect::<Result<_, _>>()?;
        self.turn_position = r.read_u8()?;
        let n = r.read_u16()?;
        self.committed_combats = (0..n).map(|_| CombatOption::read(r)).collect::<Result<_, _>>()?;
        self.combat = if r.read_bool()? {
            Some(CombatState::read(r)?)
        } else {
            None
        };
        self.next_combat_id = r.read_i32()?;
        self.next_roll_id = r.read_i32()?;
        Ok(())
    }

    pub(super) fn inspect(&self) -> Inspection {
        let combats: Vec<serde_json::Value> = self
            .committed_combats
            .iter()
            .map(|c| {
                serde_json::json!({
                    "tile": c.tile.0,
                    "attacker": c.attacker.0,
                    "defender": c.defender.0,
                    "supporting_units": ids_json(&c.supporting_units),
                })
            })
            .collect();
        Inspection::from([
            ("phase", self.phase.to_string().into()),
            ("round", self.round.into()),
            ("turn_order", self.turn_order.iter().map(|s| s.0).collect::<Vec<_>>().into()),
            ("turn_position", self.turn_position.into()),
            ("committed_combats", combats.into()),
            (
                "combat",
                self.combat.as_ref().map_or(serde_json::Value::Null, CombatState::to_json),
            ),
        ])
    }
}
