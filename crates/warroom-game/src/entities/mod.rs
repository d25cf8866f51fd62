//! The ruleset's entity kinds.
//!
//! Each kind is its own struct with its own wire layout. [`Entity`] closes
//! over them so the registry can store any of them in one array type, and
//! dispatches every [`EntityModel`] call with a single match.

mod card;
mod faction;
mod match_state;
mod tile;
mod unit;

pub use card::{Card, CardType};
pub use faction::Faction;
pub use match_state::{CombatOption, MatchState};
pub use tile::{Terrain, Tile};
pub use unit::Unit;

use warroom_protocol::{ByteReader, ByteWriter, PlayerSlot, ProtocolError};
use warroom_world::{EntityId, EntityModel, Inspection, Kind, WorldError};

/// Custom update sub-headers, per kind.
pub mod custom {
    /// Unit moved. Payload: `u16` count, then that many `u16` tile ids.
    pub const UNIT_MOVE: u8 = 0;
    /// Card changed hands. Payload: new holder `u8`, `0xFF` for the deck.
    pub const CARD_HOLDER: u8 = 0;
}

/// Every kind of entity in the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Card,
    Faction,
    Match,
    Tile,
    Unit,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [Self::Card, Self::Faction, Self::Match, Self::Tile, Self::Unit];
}

impl Kind for EntityKind {
    fn name(self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Faction => "faction",
            Self::Match => "match",
            Self::Tile => "tile",
            Self::Unit => "unit",
        }
    }
}

/// Any entity in the game.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Card(Card),
    Faction(Faction),
    Match(MatchState),
    Tile(Tile),
    Unit(Unit),
}

impl EntityModel for Entity {
    type Kind = EntityKind;

    fn new(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Card => Self::Card(Card::default()),
            EntityKind::Faction => Self::Faction(Faction::default()),
            EntityKind::Match => Self::Match(MatchState::default()),
            EntityKind::Tile => Self::Tile(Tile::default()),
            EntityKind::Unit => Self::Unit(Unit::default()),
        }
    }

    fn kind(&self) -> EntityKind {
        match self {
            Self::Card(_) => EntityKind::Card,
            Self::Faction(_) => EntityKind::Faction,
            Self::Match(_) => EntityKind::Match,
            Self::Tile(_) => EntityKind::Tile,
            Self::Unit(_) => EntityKind::Unit,
        }
    }

    fn write_full_state(&self, target: PlayerSlot, w: &mut ByteWriter) -> Result<(), ProtocolError> {
        match self {
            Self::Card(e) => e.write_full_state(target, w),
            Self::Faction(e) => e.write_full_state(w),
            Self::Match(e) => e.write_full_state(w),
            Self::Tile(e) => e.write_full_state(w),
            Self::Unit(e) => e.write_full_state(target, w),
        }
    }

    fn read_full_state(&mut self, r: &mut ByteReader<'_>) -> Result<(), ProtocolError> {
        match self {
            Self::Card(e) => e.read_full_state(r),
            Self::Faction(e) => e.read_full_state(r),
            Self::Match(e) => e.read_full_state(r),
            Self::Tile(e) => e.read_full_state(r),
            Self::Unit(e) => e.read_full_state(r),
        }
    }

    fn apply_custom_update(&mut self, header: u8, r: &mut ByteReader<'_>) -> Result<(), WorldError> {
        match (self, header) {
            (Self::Unit(unit), custom::UNIT_MOVE) => unit.apply_move(r),
            (Self::Card(card), custom::CARD_HOLDER) => card.apply_holder(r),
            (other, header) => Err(WorldError::NotImplemented {
                kind: other.kind().name(),
                header,
            }),
        }
    }

    fn inspect(&self) -> Inspection {
        match self {
            Self::Card(e) => e.inspect(),
            Self::Faction(e) => e.inspect(),
            Self::Match(e) => e.inspect(),
            Self::Tile(e) => e.inspect(),
            Self::Unit(e) => e.inspect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared field encodings
// ---------------------------------------------------------------------------

/// Optional slot as `i32`, `-1` for none.
pub(crate) fn write_slot(w: &mut ByteWriter, slot: Option<PlayerSlot>) {
    w.write_i32(slot.map_or(-1, PlayerSlot::as_i32));
}

pub(crate) fn read_slot(r: &mut ByteReader<'_>) -> Result<Option<PlayerSlot>, ProtocolError> {
    match r.read_i32()? {
        -1 => Ok(None),
        raw => u8::try_from(raw)
            .map(|b| Some(PlayerSlot(b)))
            .map_err(|_| ProtocolError::InvalidMessage(format!("slot {raw} out of range"))),
    }
}

/// A slot that must be present.
pub(crate) fn read_required_slot(r: &mut ByteReader<'_>) -> Result<PlayerSlot, ProtocolError> {
    read_slot(r)?.ok_or_else(|| ProtocolError::InvalidMessage("missing slot".into()))
}

pub(crate) fn write_id(w: &mut ByteWriter, id: EntityId) {
    w.write_i32(id.to_wire());
}

pub(crate) fn read_id(r: &mut ByteReader<'_>) -> Result<EntityId, ProtocolError> {
    let raw = r.read_i32()?;
    EntityId::from_wire(raw).ok_or_else(|| ProtocolError::InvalidMessage(format!("negative entity id {raw}")))
}

/// `u16` count, then each id as `i32`.
pub(crate) fn write_ids(w: &mut ByteWriter, ids: &[EntityId]) -> Result<(), ProtocolError> {
    w.write_len(ids.len())?;
    for id in ids {
        write_id(w, *id);
    }
    Ok(())
}

pub(crate) fn read_ids(r: &mut ByteReader<'_>) -> Result<Vec<EntityId>, ProtocolError> {
    let n = r.read_u16()?;
    (0..n).map(|_| read_id(r)).collect()
}

/// Ids as a JSON array of integers, for [`EntityModel::inspect`].
pub(crate) fn ids_json(ids: &[EntityId]) -> serde_json::Value {
    ids.iter().map(|id| id.0).collect::<Vec<_>>().into()
}

pub(crate) fn slot_json(slot: Option<PlayerSlot>) -> serde_json::Value {
    slot.map_or(serde_json::Value::Null, |s| s.0.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use warroom_world::TypeRegistry;

    #[test]
    fn test_kind_ids_follow_name_order() {
        let types = TypeRegistry::assign_ids(EntityKind::ALL).unwrap();
        assert_eq!(types.id_of(EntityKind::Card).unwrap(), 0);
        assert_eq!(types.id_of(EntityKind::Faction).unwrap(), 1);
        assert_eq!(types.id_of(EntityKind::Match).unwrap(), 2);
        assert_eq!(types.id_of(EntityKind::Tile).unwrap(), 3);
        assert_eq!(types.id_of(EntityKind::Unit).unwrap(), 4);
    }

    #[test]
    fn test_new_matches_kind() {
        for kind in EntityKind::ALL {
            assert_eq!(Entity::new(kind).kind(), kind);
        }
    }

    #[test]
    fn test_unhandled_custom_update_is_not_implemented() {
        let mut tile = Entity::new(EntityKind::Tile);
        let err = tile
            .apply_custom_update(0, &mut ByteReader::new(&[]))
            .unwrap_err();
        assert!(matches!(
            err,
            WorldError::NotImplemented { kind: "tile", header: 0 }
        ));

        let mut unit = Entity::new(EntityKind::Unit);
        assert!(unit.apply_custom_update(7, &mut ByteReader::new(&[])).is_err());
    }

    #[test]
    fn test_slot_encoding() {
        let mut w = ByteWriter::new();
        write_slot(&mut w, None);
        write_slot(&mut w, Some(PlayerSlot(3)));
        let bytes = w.into_inner();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(read_slot(&mut r).unwrap(), None);
        assert_eq!(read_slot(&mut r).unwrap(), Some(PlayerSlot(3)));
    }

    #[test]
    fn test_write_ids_refuses_overlong_lists() {
        let ids = vec![EntityId(1); usize::from(u16::MAX) + 1];
        let mut w = ByteWriter::new();
        assert!(matches!(
            write_ids(&mut w, &ids),
            Err(ProtocolError::Unencodable { value: 65_536, .. })
        ));
        assert!(w.is_empty());
    }

    #[test]
    fn test_read_slot_rejects_out_of_range() {
        let bytes = 300i32.to_le_bytes();
        assert!(read_slot(&mut ByteReader::new(&bytes)).is_err());
    }
}
