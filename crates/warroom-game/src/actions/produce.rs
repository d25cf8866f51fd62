use std::collections::BTreeMap;

use rand::RngCore;
use rand::seq::IndexedRandom;
use warroom_protocol::{ByteReader, ByteWriter, PlayerSlot, ProtocolError, WireDecode, WireEncode};
use warroom_world::EntityId;

use super::{Action, ActionKind, Rejection, require_budget, require_owned_unit, require_phase, require_turn};
use crate::entities::{read_id, write_id};
use crate::{GameError, GamePhase, GameState};

/// One thing to spend a production point on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductionOrder {
    /// Raises a new unit at strength one on a tile the actor owns.
    Build { tile: EntityId, unit_type: i32 },
    /// Adds one strength to one of the actor's units, up to the ruleset's
    /// maximum.
    Reinforce { unit: EntityId },
    /// Draws a random card from the deck into the actor's hand.
    DrawCard,
}

impl ProductionOrder {
    const BUILD: u8 = 0;
    const REINFORCE: u8 = 1;
    const DRAW_CARD: u8 = 2;
}

/// Spends production points, one per order.
///
/// Allowed on the actor's turn while giving commands, and costs no
/// commands. The orders are checked as a batch: two reinforcements of one
/// unit both count toward its ceiling, and every draw needs its own card
/// in the deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Produce {
    pub orders: Vec<ProductionOrder>,
}

impl Action for Produce {
    const KIND: ActionKind = ActionKind::Produce;

    fn validate(&self, state: &GameState, actor: PlayerSlot) -> Result<(), Rejection> {
        require_phase(state, GamePhase::GiveCommands)?;
        require_turn(state, actor)?;
        if self.orders.is_empty() {
            return Err(Rejection::new("No production orders"));
        }
        let production = state.faction(actor).map_or(0, |f| i32::from(f.production));
        let requested = i32::try_from(self.orders.len()).unwrap_or(i32::MAX);
        require_budget("production", production, requested)?;

        let ceiling = i32::from(state.ruleset().max_strength);
        let mut builds = 0;
        let mut draws = 0;
        let mut reinforced: BTreeMap<EntityId, i32> = BTreeMap::new();
        for order in &self.orders {
            match *order {
                ProductionOrder::Build { tile, unit_type } => {
                    validate_build(state, actor, tile, unit_type)?;
                    builds += 1;
                }
                ProductionOrder::Reinforce { unit } => {
                    let strength = i32::from(require_owned_unit(state, actor, unit)?.strength);
                    let added = reinforced.entry(unit).or_insert(0);
                    *added += 1;
                    if strength + *added > ceiling {
                        return Err(Rejection::new(format!("Unit {unit} is at full strength")));
                    }
                }
                ProductionOrder::DrawCard => draws += 1,
            }
        }
        if builds > state.free_unit_slots() {
            return Err(Rejection::new("No room for more units"));
        }
        if draws > state.deck().len() {
            return Err(Rejection::new("Not enough cards in the deck"));
        }
        Ok(())
    }

    fn execute(self, state: &mut GameState, actor: PlayerSlot, rng: &mut dyn RngCore) -> Result<(), GameError> {
        for order in self.orders {
            match order {
                ProductionOrder::Build { tile, unit_type } => {
                    let id = state.create_unit(actor, unit_type, tile, 1)?;
                    tracing::debug!(unit = %id, %tile, %actor, "unit built");
                }
                ProductionOrder::Reinforce { unit } => {
                    let u = state.unit_mut(unit)?;
                    u.strength += 1;
                    u.max_strength = u.max_strength.max(u.strength);
                }
                ProductionOrder::DrawCard => {
                    let card = state
                        .deck()
                        .choose(rng)
                        .copied()
                        .ok_or_else(|| GameError::Rejected("the deck is empty".into()))?;
                    state.transfer_card(card, Some(actor))?;
                    tracing::debug!(%card, %actor, "card drawn");
                }
            }
            state.faction_mut(actor)?.production -= 1;
        }
        Ok(())
    }
}

fn validate_build(state: &GameState, actor: PlayerSlot, id: EntityId, unit_type: i32) -> Result<(), Rejection> {
    let tile = state
        .tile(id)
        .ok_or_else(|| Rejection::new(format!("Tile {id} does not exist")))?;
    if tile.owner != Some(actor) {
        return Err(Rejection::new(format!("Tile {id} is not yours")));
    }
    let kind = state
        .ruleset()
        .unit_type(unit_type)
        .ok_or_else(|| Rejection::new(format!("Unknown unit type {unit_type}")))?;
    if !tile.terrain.admits(kind.category) {
        return Err(Rejection::new(format!("{} cannot be built on tile {id}", kind.name)));
    }
    Ok(())
}

impl WireEncode for Produce {
    fn encode(&self, w: &mut ByteWriter) -> Result<(), ProtocolError> {
        w.write_len(self.orders.len())?;
        for order in &self.orders {
            match *order {
                ProductionOrder::Build { tile, unit_type } => {
                    w.write_u8(ProductionOrder::BUILD);
                    write_id(w, tile);
                    w.write_i32(unit_type);
                }
                ProductionOrder::Reinforce { unit } => {
                    w.write_u8(ProductionOrder::REINFORCE);
                    write_id(w, unit);
                }
                ProductionOrder::DrawCard => w.write_u8(ProductionOrder::DRAW_CARD),
            }
        }
        Ok(())
    }
}

impl WireDecode for Produce {
    fn decode(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        let n = r.read_u16()?;
        let mut orders = Vec::with_capacity(usize::from(n));
        for _ in 0..n {
            let order = match r.read_u8()? {
                ProductionOrder::BUILD => ProductionOrder::Build {
                    tile: read_id(r)?,
                    unit_type: r.read_i32()?,
                },
                ProductionOrder::REINFORCE => ProductionOrder::Reinforce { unit: read_id(r)? },
                ProductionOrder::DRAW_CARD => ProductionOrder::DrawCard,
                other => {
                    return Err(ProtocolError::InvalidMessage(format!("production order {other}")));
                }
            };
            orders.push(order);
        }
        Ok(Self { orders })
    }
}
