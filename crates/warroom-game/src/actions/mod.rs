//! Player actions.
//!
//! Every action kind is a struct with typed fields and its own wire
//! encoding. Its lifecycle is always the same:
//!
//! 1. A client builds it and sends it with a correlation token.
//! 2. The server decodes it, attaches the sender's slot as the actor, and
//!    calls [`Action::validate`]. Validation is pure, so clients run it too
//!    before sending anything.
//! 3. Only if validation passed, [`Action::execute`] mutates the state.
//! 4. Either way the client gets a reply carrying the token.
//!
//! [`PlayerAction`] closes over the kinds for the dispatcher.

mod combat_decision;
mod declare_combat;
mod end_turn;
mod move_unit;
mod play_card;
mod produce;
mod select_next_combat;

pub use combat_decision::CombatDecision;
pub use declare_combat::DeclareCombat;
pub use end_turn::EndTurn;
pub use move_unit::MoveUnit;
pub use play_card::PlayCard;
pub use produce::{Produce, ProductionOrder};
pub use select_next_combat::SelectNextCombat;

use std::fmt;

use rand::RngCore;
use warroom_protocol::{ByteReader, ByteWriter, PlayerSlot, ProtocolError, WireDecode, WireEncode};
use warroom_world::{EntityId, Kind};

use crate::entities::Unit;
use crate::{GameError, GamePhase, GameState};

// ---------------------------------------------------------------------------
// Rejection
// ---------------------------------------------------------------------------

/// Why an action failed validation. Sent back to the client verbatim.
///
/// Not an error: rejections are the expected answer to a speculative
/// check, and the state is always unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection(String);

impl Rejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    pub fn reason(&self) -> &str {
        &self.0
    }

    pub fn into_reason(self) -> String {
        self.0
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

/// Every kind of action, named for the action type registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    CombatDecision,
    DeclareCombat,
    EndTurn,
    MoveUnit,
    PlayCard,
    Produce,
    SelectNextCombat,
}

impl ActionKind {
    pub const ALL: [ActionKind; 7] = [
        Self::CombatDecision,
        Self::DeclareCombat,
        Self::EndTurn,
        Self::MoveUnit,
        Self::PlayCard,
        Self::Produce,
        Self::SelectNextCombat,
    ];

    /// Looks an action kind up by its registry name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl Kind for ActionKind {
    fn name(self) -> &'static str {
        match self {
            Self::CombatDecision => "combat_decision",
            Self::DeclareCombat => "declare_combat",
            Self::EndTurn => "end_turn",
            Self::MoveUnit => "move_unit",
            Self::PlayCard => "play_card",
            Self::Produce => "produce",
            Self::SelectNextCombat => "select_next_combat",
        }
    }
}

// ---------------------------------------------------------------------------
// Action trait
// ---------------------------------------------------------------------------

/// A validate-then-execute command.
pub trait Action: WireEncode + WireDecode + Into<PlayerAction> {
    const KIND: ActionKind;

    /// Checks the action against `state` as `actor`. Must not mutate
    /// anything; it may run any number of times.
    fn validate(&self, state: &GameState, actor: PlayerSlot) -> Result<(), Rejection>;

    /// Applies the action. Only called after [`validate`](Self::validate)
    /// passed on the same state.
    fn execute(self, state: &mut GameState, actor: PlayerSlot, rng: &mut dyn RngCore) -> Result<(), GameError>;
}

/// Any action, for dispatch by a single match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerAction {
    CombatDecision(CombatDecision),
    DeclareCombat(DeclareCombat),
    EndTurn(EndTurn),
    MoveUnit(MoveUnit),
    PlayCard(PlayCard),
    Produce(Produce),
    SelectNextCombat(SelectNextCombat),
}

impl PlayerAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::CombatDecision(_) => ActionKind::CombatDecision,
            Self::DeclareCombat(_) => ActionKind::DeclareCombat,
            Self::EndTurn(_) => ActionKind::EndTurn,
            Self::MoveUnit(_) => ActionKind::MoveUnit,
            Self::PlayCard(_) => ActionKind::PlayCard,
            Self::Produce(_) => ActionKind::Produce,
            Self::SelectNextCombat(_) => ActionKind::SelectNextCombat,
        }
    }

    pub fn validate(&self, state: &GameState, actor: PlayerSlot) -> Result<(), Rejection> {
        match self {
            Self::CombatDecision(a) => a.validate(state, actor),
            Self::DeclareCombat(a) => a.validate(state, actor),
            Self::EndTurn(a) => a.validate(state, actor),
            Self::MoveUnit(a) => a.validate(state, actor),
            Self::PlayCard(a) => a.validate(state, actor),
            Self::Produce(a) => a.validate(state, actor),
            Self::SelectNextCombat(a) => a.validate(state, actor),
        }
    }

    pub fn execute(self, state: &mut GameState, actor: PlayerSlot, rng: &mut dyn RngCore) -> Result<(), GameError> {
        match self {
            Self::CombatDecision(a) => a.execute(state, actor, rng),
            Self::DeclareCombat(a) => a.execute(state, actor, rng),
            Self::EndTurn(a) => a.execute(state, actor, rng),
            Self::MoveUnit(a) => a.execute(state, actor, rng),
            Self::PlayCard(a) => a.execute(state, actor, rng),
            Self::Produce(a) => a.execute(state, actor, rng),
            Self::SelectNextCombat(a) => a.execute(state, actor, rng),
        }
    }

    /// The action's own bytes, without the routing envelope.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Unencodable`] when a list or id outgrows its wire
    /// field.
    pub fn payload(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Self::CombatDecision(a) => a.to_bytes(),
            Self::DeclareCombat(a) => a.to_bytes(),
            Self::EndTurn(a) => a.to_bytes(),
            Self::MoveUnit(a) => a.to_bytes(),
            Self::PlayCard(a) => a.to_bytes(),
            Self::Produce(a) => a.to_bytes(),
            Self::SelectNextCombat(a) => a.to_bytes(),
        }
    }

    /// Decodes a payload of the given kind. Trailing bytes are an error.
    pub fn decode(kind: ActionKind, payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        let action = match kind {
            ActionKind::CombatDecision => CombatDecision::decode(&mut r)?.into(),
            ActionKind::DeclareCombat => DeclareCombat::decode(&mut r)?.into(),
            ActionKind::EndTurn => EndTurn::decode(&mut r)?.into(),
            ActionKind::MoveUnit => MoveUnit::decode(&mut r)?.into(),
            ActionKind::PlayCard => PlayCard::decode(&mut r)?.into(),
            ActionKind::Produce => Produce::decode(&mut r)?.into(),
            ActionKind::SelectNextCombat => SelectNextCombat::decode(&mut r)?.into(),
        };
        if !r.is_empty() {
            return Err(ProtocolError::InvalidMessage(format!(
                "{} trailing bytes after {}",
                r.remaining(),
                kind.name()
            )));
        }
        Ok(action)
    }
}

impl From<CombatDecision> for PlayerAction {
    fn from(a: CombatDecision) -> Self {
        Self::CombatDecision(a)
    }
}

impl From<DeclareCombat> for PlayerAction {
    fn from(a: DeclareCombat) -> Self {
        Self::DeclareCombat(a)
    }
}

impl From<EndTurn> for PlayerAction {
    fn from(a: EndTurn) -> Self {
        Self::EndTurn(a)
    }
}

impl From<MoveUnit> for PlayerAction {
    fn from(a: MoveUnit) -> Self {
        Self::MoveUnit(a)
    }
}

impl From<PlayCard> for PlayerAction {
    fn from(a: PlayCard) -> Self {
        Self::PlayCard(a)
    }
}

impl From<Produce> for PlayerAction {
    fn from(a: Produce) -> Self {
        Self::Produce(a)
    }
}

impl From<SelectNextCombat> for PlayerAction {
    fn from(a: SelectNextCombat) -> Self {
        Self::SelectNextCombat(a)
    }
}

// ---------------------------------------------------------------------------
// Common gates
// ---------------------------------------------------------------------------

/// Rejects unless the match is in `phase`.
pub(crate) fn require_phase(state: &GameState, phase: GamePhase) -> Result<(), Rejection> {
    let current = state.phase();
    if current != phase {
        return Err(Rejection::new(format!("Not allowed during {current}")));
    }
    Ok(())
}

/// Rejects unless it is `actor`'s turn.
pub(crate) fn require_turn(state: &GameState, actor: PlayerSlot) -> Result<(), Rejection> {
    let current = state.match_state().ok().and_then(|m| m.current_turn());
    if current != Some(actor) {
        return Err(Rejection::new("It is not your turn"));
    }
    Ok(())
}

/// The unit at `id`, if it is alive and belongs to `actor`.
pub(crate) fn require_owned_unit(state: &GameState, actor: PlayerSlot, id: EntityId) -> Result<&Unit, Rejection> {
    let unit = state
        .unit(id)
        .filter(|u| u.is_alive())
        .ok_or_else(|| Rejection::new(format!("Unit {id} does not exist")))?;
    if unit.faction != Some(actor) {
        return Err(Rejection::new(format!("Unit {id} is not yours")));
    }
    Ok(unit)
}

/// Rejects when `requested` exceeds `available`.
pub(crate) fn require_budget(what: &str, available: i32, requested: i32) -> Result<(), Rejection> {
    if requested > available {
        return Err(Rejection::new(format!(
            "Not enough {what}: {requested} needed, {available} available"
        )));
    }
    Ok(())
}

// Shared payload helpers.

pub(crate) fn write_slot_byte(w: &mut ByteWriter, slot: PlayerSlot) {
    w.write_u8(slot.0);
}

pub(crate) fn read_slot_byte(r: &mut ByteReader<'_>) -> Result<PlayerSlot, ProtocolError> {
    r.read_u8().map(PlayerSlot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use warroom_world::TypeRegistry;

    #[test]
    fn test_action_kind_names_round_trip() {
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ActionKind::from_name("surrender"), None);
    }

    #[test]
    fn test_action_kind_ids_follow_name_order() {
        let types = TypeRegistry::assign_ids(ActionKind::ALL).unwrap();
        assert_eq!(types.id_of(ActionKind::CombatDecision).unwrap(), 0);
        assert_eq!(types.id_of(ActionKind::MoveUnit).unwrap(), 3);
        assert_eq!(types.id_of(ActionKind::PlayCard).unwrap(), 4);
        assert_eq!(types.id_of(ActionKind::Produce).unwrap(), 5);
        assert_eq!(types.id_of(ActionKind::SelectNextCombat).unwrap(), 6);
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let err = PlayerAction::decode(ActionKind::EndTurn, &[1]).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessage(_)));
    }

    #[test]
    fn test_decode_dispatches_on_kind() {
        let action: PlayerAction = SelectNextCombat { tile: EntityId(3) }.into();
        let got = PlayerAction::decode(ActionKind::SelectNextCombat, &action.payload().unwrap()).unwrap();
        assert_eq!(got, action);
        assert_eq!(got.kind(), ActionKind::SelectNextCombat);
    }

    #[test]
    fn test_require_budget() {
        assert!(require_budget("commands", 1, 1).is_ok());
        let err = require_budget("commands", 0, 1).unwrap_err();
        assert_eq!(err.reason(), "Not enough commands: 1 needed, 0 available");
    }

    #[test]
    fn test_rejection_display() {
        assert_eq!(Rejection::new("nope").to_string(), "nope");
        assert_eq!(Rejection::new("nope").into_reason(), "nope");
    }
}
