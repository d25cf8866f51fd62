use warroom_protocol::{ByteReader, ByteWriter, PlayerSlot, ProtocolError};
use warroom_world::{Inspection, WorldError};

use super::slot_json;

const DECK: u8 = 0xFF;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CardType {
    #[default]
    Unknown,
    Reinforcement,
    Research,
    Sabotage,
}

impl CardType {
    fn from_u8(b: u8) -> Result<Self, ProtocolError> {
        match b {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Reinforcement),
            2 => Ok(Self::Research),
            3 => Ok(Self::Sabotage),
            other => Err(ProtocolError::InvalidMessage(format!("card type {other}"))),
        }
    }
}

/// A card in the deck or in a faction's hand.
///
/// Only the holder sees what the card is. Everyone else sees that a card
/// exists and who holds it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Card {
    /// `None` while the card is in the deck.
    pub holder: Option<PlayerSlot>,
    pub card_type: CardType,
    pub value: i16,
}

impl Card {
    pub fn is_visible_to(&self, target: PlayerSlot) -> bool {
        self.holder == Some(target)
    }

    /// The `HOLDER` custom update payload.
    pub fn encode_holder(holder: Option<PlayerSlot>) -> Vec<u8> {
        vec![holder.map_or(DECK, |s| s.0)]
    }

    /// Sets the holder. The contents are cleared: the full state that
    /// follows a transfer restores them for the new holder only.
    pub(super) fn apply_holder(&mut self, r: &mut ByteReader<'_>) -> Result<(), WorldError> {
        self.holder = match r.read_u8()? {
            DECK => None,
            b => Some(PlayerSlot(b)),
        };
        self.card_type = CardType::Unknown;
        self.value = 0;
        Ok(())
    }

    pub(super) fn write_full_state(&self, target: PlayerSlot, w: &mut ByteWriter) -> Result<(), ProtocolError> {
        w.write_u8(self.holder.map_or(DECK, |s| s.0));
        let visible = self.is_visible_to(target);
        w.write_bool(visible);
        if visible {
            w.write_u8(self.card_type as u8);
            w.write_i16(self.value);
        }
        Ok(())
    }

    pub(super) fn read_full_state(&mut self, r: &mut ByteReader<'_>) -> Result<(), ProtocolError> {
        self.holder = match r.read_u8()? {
            DECK => None,
            b => Some(PlayerSlot(b)),
        };
        if r.read_bool()? {
            self.card_type = CardType::from_u8(r.read_u8()?)?;
            self.value = r.read_i16()?;
        } else {
            self.card_type = CardType::Unknown;
            self.value = 0;
        }
        Ok(())
    }

    pub(super) fn inspect(&self) -> Inspection {
        Inspection::from([
            ("holder", slot_json(self.holder)),
            ("card_type", format!("{:?}", self.card_type).into()),
            ("value", self.value.into()),
        ])
    }
}
