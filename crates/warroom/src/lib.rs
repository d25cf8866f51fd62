//! # Warroom
//!
//! Authoritative replication and turn resolution for tabletop strategy
//! games.
//!
//! One [`Server`] owns the game state and runs a fixed-rate tick loop. Peers
//! connect as [`Client`]s, each holding a replica scoped to what its player
//! may see. The server replicates every change, checks replicas against a
//! content hash every few seconds, and resyncs any that drifted.
//!
//! ```text
//! Server (this crate)      Client (this crate)
//!   tick loop, sync            replica, pending actions
//!       ↕                           ↕
//! warroom-game     ruleset, actions, combat
//! warroom-session  handshakes, player slots
//! warroom-world    registries, replication channel, hashes
//! warroom-protocol wire codec
//! warroom-transport WebSocket / in-memory connections
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use warroom::prelude::*;
//!
//! # fn main() -> Result<(), WarroomError> {
//! let catalog = Catalog::new()?;
//! let ruleset = Arc::new(Ruleset::standard());
//! let state = GameState::new(Arc::clone(&catalog.entities), Arc::clone(&ruleset), ScenarioConfig::default())?;
//!
//! let (transport, connector) = memory_transport();
//! let mut server = Server::new(transport, ServerConfig::default(), catalog.clone(), state);
//! let mut client = Client::connect(connector.connect()?, ClientConfig::default(), catalog, ruleset)?;
//!
//! server.tick()?;
//! assert_eq!(client.poll()?, vec![ClientEvent::Approved(PlayerSlot(0))]);
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod handler;
mod pending;
mod server;
mod sync;

pub use client::{Client, ClientEvent, ClientStatus};
pub use config::{ClientConfig, ServerConfig, SyncConfig};
pub use error::WarroomError;
pub use pending::{ActionFailure, ActionResult, PendingActions, ReplyCallback};
pub use server::Server;
pub(crate) use server::Outbox;
pub use sync::SyncSupervisor;

/// Everything a server or client program usually needs.
pub mod prelude {
    pub use crate::{
        ActionFailure, ActionResult, Client, ClientConfig, ClientEvent, ClientStatus, Server, ServerConfig,
        SyncConfig, WarroomError,
    };
    pub use warroom_game::actions::{
        CombatDecision, DeclareCombat, EndTurn, MoveUnit, PlayCard, Produce, ProductionOrder, SelectNextCombat,
    };
    pub use warroom_game::{
        Catalog, CombatStage, DiceAllocation, GamePhase, GameState, PlayerAction, Rejection, Ruleset,
        ScenarioConfig,
    };
    pub use warroom_protocol::{DenialCode, PlayerSlot, SlotRequest};
    pub use warroom_session::{GatekeeperConfig, SyncState};
    pub use warroom_tick::TickConfig;
    pub use warroom_transport::{Connection, Transport, memory_transport};
    pub use warroom_world::EntityId;
}
