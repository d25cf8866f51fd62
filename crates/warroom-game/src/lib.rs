//! The Warroom ruleset: entities, actions and combat.
//!
//! Everything here runs synchronously on the tick thread. The server owns
//! one authoritative [`GameState`] and changes it only through
//! [`ActionDispatcher`]; clients hold replicas of the same type and run
//! the same validation speculatively.
//!
//! # Key types
//!
//! - [`Catalog`]: entity and action type tables, plus the handshake hash
//! - [`GameState`]: registry-backed state with typed accessors and a
//!   change log for replication
//! - [`PlayerAction`]: the closed set of actions, each validate-then-execute
//! - [`CombatResolver`]: initiative-level combat driven by dice decisions
//! - [`Ruleset`]: unit types, tech modifiers and the damage rule, loadable
//!   from JSON

pub mod actions;
mod catalog;
pub mod combat;
pub mod config;
mod dispatcher;
pub mod entities;
mod error;
mod phase;
mod state;

#[cfg(test)]
mod testing;

pub use actions::{Action, ActionKind, PlayerAction, Rejection};
pub use catalog::Catalog;
pub use combat::{CombatResolver, CombatStage, CombatState, DiceAllocation};
pub use config::{DamageRule, Ruleset, ScenarioConfig, UnitCategory, UnitType};
pub use dispatcher::ActionDispatcher;
pub use entities::{Entity, EntityKind};
pub use error::GameError;
pub use phase::GamePhase;
pub use state::{Change, GameState, MATCH_ID, faction_id};
