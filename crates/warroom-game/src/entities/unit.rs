use warroom_protocol::{ByteReader, ByteWriter, PlayerSlot, ProtocolError};
use warroom_world::{EntityId, Inspection, WorldError};

use super::{read_slot, slot_json, write_slot};

/// A stack of troops of one unit type.
///
/// The type is private to the owning faction until the unit is revealed
/// (by fighting, for instance). Other players see [`Unit::HIDDEN_TYPE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    /// Index into the ruleset's unit types.
    pub unit_type: i32,
    pub strength: i16,
    pub max_strength: i16,
    pub faction: Option<PlayerSlot>,
    pub tile: Option<EntityId>,
    pub revealed: bool,
}

impl Default for Unit {
    fn default() -> Self {
        Self {
            unit_type: Self::NO_TYPE,
            strength: 0,
            max_strength: 0,
            faction: None,
            tile: None,
            revealed: false,
        }
    }
}

impl Unit {
    pub const NO_TYPE: i32 = -1;
    /// What non-owners see in place of an unrevealed unit's type.
    pub const HIDDEN_TYPE: i32 = -2;

    pub fn is_visible_to(&self, target: PlayerSlot) -> bool {
        self.revealed || self.faction == Some(target)
    }

    pub fn is_alive(&self) -> bool {
        self.strength > 0
    }

    /// The `MOVE` custom update payload for `path`.
    ///
    /// # Errors
    /// [`ProtocolError::Unencodable`] if the path is too long or a tile id
    /// does not fit in a `u16`.
    pub fn encode_move(path: &[EntityId]) -> Result<Vec<u8>, ProtocolError> {
        let mut w = ByteWriter::new();
        w.write_len(path.len())?;
        for tile in path {
            let id = u16::try_from(tile.0).map_err(|_| ProtocolError::Unencodable {
                field: "tile id",
                value: tile.0 as usize,
                max: usize::from(u16::MAX),
            })?;
            w.write_u16(id);
        }
        Ok(w.into_inner())
    }

    pub(super) fn apply_move(&mut self, r: &mut ByteReader<'_>) -> Result<(), WorldError> {
        let n = r.read_u16()?;
        let mut last = None;
        for _ in 0..n {
            last = Some(EntityId(u32::from(r.read_u16()?)));
        }
        if let Some(tile) = last {
            self.tile = Some(tile);
        }
        Ok(())
    }

    pub(super) fn write_full_state(&self, target: PlayerSlot, w: &mut ByteWriter) -> Result<(), ProtocolError> {
        write_slot(w, self.faction);
        w.write_i32(self.tile.map_or(-1, EntityId::to_wire));
        w.write_bool(self.revealed);
        if self.is_visible_to(target) {
            w.write_i32(self.unit_type);
        } else {
            w.write_i32(Self::HIDDEN_TYPE);
        }
        w.write_i16(self.strength);
        w.write_i16(self.max_strength);
        Ok(())
    }

    pub(super) fn read_full_state(&mut self, r: &mut ByteReader<'_>) -> Result<(), ProtocolError> {
        self.faction = read_slot(r)?;
        self.tile = EntityId::from_wire(r.read_i32()?);
        self.revealed = r.read_bool()?;
        self.unit_type = r.read_i32()?;
        self.strength = r.read_i16()?;
        self.max_strength = r.read_i16()?;
        Ok(())
    }

    pub(super) fn inspect(&self) -> Inspection {
        Inspection::from([
            ("unit_type", self.unit_type.into()),
            ("strength", self.strength.into()),
            ("max_strength", self.max_strength.into()),
            ("faction", slot_json(self.faction)),
            ("tile", self.tile.map_or(serde_json::Value::Null, |t| t.0.into())),
            ("revealed", self.revealed.into()),
        ])
    }
}
