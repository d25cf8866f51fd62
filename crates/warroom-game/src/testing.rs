//! Fixtures shared by the unit tests.
//!
//! Map used by every fixture:
//!
//! ```text
//! 3 (land) - 1 (land) - 0 (land) - 2 (sea)
//! ```

use std::sync::Arc;

use warroom_protocol::PlayerSlot;
use warroom_world::{EntityId, TypeRegistry};

use crate::combat::{CombatResolver, CombatStage};
use crate::config::{Ruleset, ScenarioConfig, standard_units};
use crate::entities::{CombatOption, EntityKind, Faction, Terrain, Tile};
use crate::{GamePhase, GameState};

pub const ATTACKER: PlayerSlot = PlayerSlot(0);
pub const DEFENDER: PlayerSlot = PlayerSlot(1);

pub fn new_state_with_ruleset(ruleset: Ruleset) -> GameState {
    let types = Arc::new(TypeRegistry::assign_ids(EntityKind::ALL).unwrap());
    GameState::new(types, Arc::new(ruleset), ScenarioConfig::default()).unwrap()
}

pub fn new_state() -> GameState {
    new_state_with_ruleset(Ruleset::standard())
}

fn with_map(ruleset: Ruleset) -> GameState {
    let mut state = new_state_with_ruleset(ruleset);
    for (terrain, neighbours) in [
        (Terrain::Land, vec![1, 2]),
        (Terrain::Land, vec![0, 3]),
        (Terrain::Sea, vec![0]),
        (Terrain::Land, vec![1]),
    ] {
        state
            .add_tile(Tile {
                owner: None,
                terrain,
                neighbours,
            })
            .unwrap();
    }
    for name in ["Attacker", "Defender"] {
        state
            .add_faction(Faction {
                name: name.into(),
                ..Faction::default()
            })
            .unwrap();
    }
    state
}

/// Attacker infantry (strength 3, id 0) and defender infantry (strength 2,
/// id 1) share tile 0. `setup` runs after both exist.
pub fn battle_state_on(ruleset: Ruleset, setup: impl FnOnce(&mut GameState)) -> GameState {
    let mut state = with_map(ruleset);
    state
        .create_unit(ATTACKER, standard_units::INFANTRY, EntityId(0), 3)
        .unwrap();
    state
        .create_unit(DEFENDER, standard_units::INFANTRY, EntityId(0), 2)
        .unwrap();
    state.start_game().unwrap();
    setup(&mut state);
    state
}

pub fn battle_state_with(setup: impl FnOnce(&mut GameState)) -> GameState {
    battle_state_on(Ruleset::standard(), setup)
}

pub fn battle_state() -> GameState {
    battle_state_with(|_| {})
}

/// Starts the attacker-versus-defender combat on tile 0.
pub fn start_battle(state: &mut GameState) -> CombatStage {
    CombatResolver::new(state)
        .start(CombatOption {
            tile: EntityId(0),
            attacker: ATTACKER,
            defender: DEFENDER,
            supporting_units: vec![],
        })
        .unwrap()
}

/// Attacker infantry on tile 0, defender infantry on tile 1. The attacker
/// is giving commands with a full budget.
pub fn commands_state() -> GameState {
    let mut state = with_map(Ruleset::standard());
    state
        .create_unit(ATTACKER, standard_units::INFANTRY, EntityId(0), 3)
        .unwrap();
    state
        .create_unit(DEFENDER, standard_units::INFANTRY, EntityId(1), 2)
        .unwrap();
    state.start_game().unwrap();
    state
}

/// [`commands_state`] moved on to committing combats, attacker to act.
pub fn commit_state() -> GameState {
    let mut state = commands_state();
    let m = state.match_state_mut().unwrap();
    m.phase = GamePhase::CommitCombats;
    m.turn_position = 0;
    state
}

/// [`battle_state`] with the tile 0 combat committed and waiting to be
/// selected by the attacker.
pub fn select_state() -> GameState {
    let mut state = battle_state();
    let m = state.match_state_mut().unwrap();
    m.phase = GamePhase::SelectNextCombat;
    m.turn_position = 0;
    m.committed_combats.push(CombatOption {
        tile: EntityId(0),
        attacker: ATTACKER,
        defender: DEFENDER,
        supporting_units: vec![],
    });
    state
}
