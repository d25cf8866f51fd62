use warroom_protocol::{ByteReader, ByteWriter, PlayerSlot, ProtocolError};
use warroom_world::{EntityId, Inspection};

use super::{read_slot, slot_json, write_slot};
use crate::config::UnitCategory;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Terrain {
    #[default]
    Land,
    Sea,
}

impl Terrain {
    fn from_u8(b: u8) -> Result<Self, ProtocolError> {
        match b {
            0 => Ok(Self::Land),
            1 => Ok(Self::Sea),
            other => Err(ProtocolError::InvalidMessage(format!("terrain {other}"))),
        }
    }

    /// Whether units of `category` may stand here. Air goes anywhere.
    pub fn admits(self, category: UnitCategory) -> bool {
        match category {
            UnitCategory::Air => true,
            UnitCategory::Ground => self == Self::Land,
            UnitCategory::Sea | UnitCategory::Sub => self == Self::Sea,
        }
    }
}

/// A map location. Fully public.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tile {
    pub owner: Option<PlayerSlot>,
    pub terrain: Terrain,
    /// Adjacent tiles by id.
    pub neighbours: Vec<u16>,
}

impl Tile {
    pub fn is_adjacent(&self, other: EntityId) -> bool {
        u16::try_from(other.0).is_ok_and(|id| self.neighbours.contains(&id))
    }

    pub(super) fn write_full_state(&self, w: &mut ByteWriter) -> Result<(), ProtocolError> {
        write_slot(w, self.owner);
        w.write_u8(self.terrain as u8);
        w.write_len(self.neighbours.len())?;
        for n in &self.neighbours {
            w.write_u16(*n);
        }
        Ok(())
    }

    pub(super) fn read_full_state(&mut self, r: &mut ByteReader<'_>) -> Result<(), ProtocolError> {
        self.owner = read_slot(r)?;
        self.terrain = Terrain::from_u8(r.read_u8()?)?;
        let n = r.read_u16()?;
        self.neighbours = (0..n).map(|_| r.read_u16()).collect::<Result<_, _>>()?;
        Ok(())
    }

    pub(super) fn inspect(&self) -> Inspection {
        Inspection::from([
            ("owner", slot_json(self.owner)),
            ("terrain", format!("{:?}", self.terrain).into()),
            ("neighbours", self.neighbours.clone().into()),
        ])
    }
}
