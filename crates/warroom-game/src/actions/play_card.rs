use rand::RngCore;
use warroom_protocol::{ByteReader, ByteWriter, PlayerSlot, ProtocolError, WireDecode, WireEncode};
use warroom_world::EntityId;

use super::{Action, ActionKind, Rejection, require_owned_unit, require_phase, require_turn};
use crate::entities::{Card, CardType, read_id, write_id};
use crate::{GameError, GamePhase, GameState};

/// Plays a card from the actor's hand, then returns it to the deck.
///
/// Allowed on the actor's turn while giving commands. The effect follows
/// the card type:
///
/// - `Reinforcement` restores up to `value` strength to `target`, one of
///   the actor's units, never past its maximum.
/// - `Research` grants tech `value`.
/// - `Sabotage` strikes `value` commands from `target`, another faction.
///
/// Cards of unknown type cannot be played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayCard {
    pub card: EntityId,
    /// A unit for reinforcements, a faction entity for sabotage.
    pub target: Option<EntityId>,
}

impl PlayCard {
    fn held_card<'a>(&self, state: &'a GameState, actor: PlayerSlot) -> Result<&'a Card, Rejection> {
        let card = self.card;
        match state.card(card) {
            None => Err(Rejection::new(format!("Card {card} does not exist"))),
            Some(c) if c.holder != Some(actor) => Err(Rejection::new(format!("You do not hold card {card}"))),
            Some(c) => Ok(c),
        }
    }

    fn target_unit(&self) -> Result<EntityId, Rejection> {
        self.target
            .ok_or_else(|| Rejection::new("Reinforcement needs a unit to target"))
    }

    fn target_faction(&self) -> Result<PlayerSlot, Rejection> {
        let id = self
            .target
            .ok_or_else(|| Rejection::new("Sabotage needs a faction to target"))?;
        u8::try_from(id.0)
            .map(PlayerSlot)
            .map_err(|_| Rejection::new(format!("Faction {id} does not exist")))
    }
}

fn research_tech(card: &Card) -> Result<u16, Rejection> {
    u16::try_from(card.value).map_err(|_| Rejection::new(format!("Tech {} does not exist", card.value)))
}

impl Action for PlayCard {
    const KIND: ActionKind = ActionKind::PlayCard;

    fn validate(&self, state: &GameState, actor: PlayerSlot) -> Result<(), Rejection> {
        require_phase(state, GamePhase::GiveCommands)?;
        require_turn(state, actor)?;
        let card = self.held_card(state, actor)?;
        match card.card_type {
            CardType::Reinforcement => {
                let id = self.target_unit()?;
                let unit = require_owned_unit(state, actor, id)?;
                if card.value <= 0 || unit.strength >= unit.max_strength {
                    return Err(Rejection::new(format!("Unit {id} is at full strength")));
                }
            }
            CardType::Research => {
                let tech = research_tech(card)?;
                if state.faction(actor).is_some_and(|f| f.techs.contains(&tech)) {
                    return Err(Rejection::new(format!("You already have tech {tech}")));
                }
            }
            CardType::Sabotage => {
                let victim = self.target_faction()?;
                if victim == actor {
                    return Err(Rejection::new("You cannot sabotage yourself"));
                }
                if state.faction(victim).is_none() {
                    return Err(Rejection::new(format!("Faction {victim} does not exist")));
                }
                if card.value <= 0 {
                    return Err(Rejection::new(format!("Card {} has no effect", self.card)));
                }
            }
            CardType::Unknown => {
                return Err(Rejection::new(format!("Card {} cannot be played", self.card)));
            }
        }
        Ok(())
    }

    fn execute(self, state: &mut GameState, actor: PlayerSlot, _rng: &mut dyn RngCore) -> Result<(), GameError> {
        let card = self.held_card(state, actor).cloned().map_err(rejected)?;
        match card.card_type {
            CardType::Reinforcement => {
                let unit = state.unit_mut(self.target_unit().map_err(rejected)?)?;
                unit.strength = unit.strength.saturating_add(card.value).min(unit.max_strength);
            }
            CardType::Research => {
                let tech = research_tech(&card).map_err(rejected)?;
                state.faction_mut(actor)?.techs.insert(tech);
                tracing::debug!(%actor, tech, "tech researched");
            }
            CardType::Sabotage => {
                let victim = state.faction_mut(self.target_faction().map_err(rejected)?)?;
                victim.commands = victim.commands.saturating_sub(card.value).max(0);
            }
            CardType::Unknown => return Err(GameError::Rejected(format!("card {} cannot be played", self.card))),
        }
        state.transfer_card(self.card, None)?;
        tracing::debug!(card = %self.card, %actor, card_type = ?card.card_type, "card played");
        Ok(())
    }
}

fn rejected(rejection: Rejection) -> GameError {
    GameError::Rejected(rejection.into_reason())
}

impl WireEncode for PlayCard {
    fn encode(&self, w: &mut ByteWriter) -> Result<(), ProtocolError> {
        write_id(w, self.card);
        w.write_i32(self.target.map_or(-1, EntityId::to_wire));
        Ok(())
    }
}

impl WireDecode for PlayCard {
    fn decode(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            card: read_id(r)?,
            target: EntityId::from_wire(r.read_i32()?),
        })
    }
}
