//! One server and two clients in one process, fighting one battle.
//!
//! Run with `RUST_LOG=debug` to watch the replication traffic.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};
use tracing_subscriber::EnvFilter;
use warroom::prelude::*;
use warroom_game::combat::{self, combat_stage};
use warroom_game::config::standard_units;
use warroom_game::entities::{Faction, Terrain, Tile};

const RED: PlayerSlot = PlayerSlot(0);
const BLUE: PlayerSlot = PlayerSlot(1);

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// A plain and a ridge. Red holds the plain, blue the ridge.
fn scenario(catalog: &Catalog, ruleset: Arc<Ruleset>) -> Result<GameState, WarroomError> {
    let mut state = GameState::new(Arc::clone(&catalog.entities), ruleset, ScenarioConfig::default())?;
    for neighbours in [vec![1], vec![0]] {
        state.add_tile(Tile {
            owner: None,
            terrain: Terrain::Land,
            neighbours,
        })?;
    }
    for name in ["Red", "Blue"] {
        state.add_faction(Faction {
            name: name.into(),
            ..Faction::default()
        })?;
    }
    state.create_unit(RED, standard_units::INFANTRY, EntityId(0), 4)?;
    state.create_unit(BLUE, standard_units::INFANTRY, EntityId(1), 2)?;
    Ok(state)
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// The server and its clients, ticked together.
struct Table<T: Transport, C: Connection> {
    server: Server<T>,
    clients: Vec<Client<C>>,
    clock: Interval,
}

impl<T: Transport, C: Connection> Table<T, C> {
    async fn step(&mut self) -> Result<(), WarroomError> {
        self.clock.tick().await;
        self.server.tick()?;
        for client in &mut self.clients {
            for event in client.poll()? {
                tracing::info!(slot = ?client.slot(), ?event, "client event");
            }
            client.tick();
        }
        Ok(())
    }

    /// Steps until every approved client holds a synced replica.
    async fn settle(&mut self) -> Result<(), WarroomError> {
        loop {
            self.step().await?;
            let synced = self
                .server
                .gatekeeper()
                .approved()
                .all(|s| s.sync_state == SyncState::Synced);
            if synced && self.server.supervisor().active_target().is_none() {
                return Ok(());
            }
        }
    }

    /// Sends `action` for `slot` and steps until its outcome is known.
    async fn act(&mut self, slot: PlayerSlot, action: impl Into<PlayerAction>) -> Result<(), WarroomError> {
        let action = action.into();
        let label = format!("{action:?}");
        let outcome = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&outcome);
        self.client(slot)
            .send_action(action, move |result| {
                if let Ok(mut cell) = sink.lock() {
                    *cell = Some(result);
                }
            })?;
        loop {
            self.step().await?;
            let done = outcome.lock().ok().and_then(|mut o| o.take());
            if let Some(result) = done {
                match result {
                    Ok(()) => tracing::info!(%slot, action = %label, "action accepted"),
                    Err(e) => tracing::warn!(%slot, action = %label, error = %e, "action failed"),
                }
                return Ok(());
            }
        }
    }

    fn client(&mut self, slot: PlayerSlot) -> &mut Client<C> {
        &mut self.clients[usize::from(slot.0)]
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let catalog = Catalog::new()?;
    let ruleset = Arc::new(Ruleset::standard());
    let state = scenario(&catalog, Arc::clone(&ruleset))?;

    let config = ServerConfig::default().with_combat_decision_timeout(Some(90));
    let (transport, connector) = memory_transport();
    let server = Server::new(transport, config.clone(), catalog.clone(), state);

    let mut clients = Vec::new();
    for slot in [RED, BLUE] {
        let client_config = ClientConfig::default().with_slot(SlotRequest::Slot(slot));
        clients.push(Client::connect(
            connector.connect()?,
            client_config,
            catalog.clone(),
            Arc::clone(&ruleset),
        )?);
    }

    let mut clock = tokio::time::interval(Duration::from_secs(1) / config.tick.tick_rate_hz);
    clock.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut table = Table { server, clients, clock };

    table.step().await?;
    table.server.start_game()?;
    table.settle().await?;

    // Red advances onto the ridge and attacks.
    let advance = MoveUnit {
        unit: EntityId(0),
        path: vec![EntityId(1)],
    };
    table.act(RED, advance).await?;
    table.act(RED, EndTurn).await?;
    table.act(BLUE, EndTurn).await?;
    let attack = DeclareCombat {
        tile: EntityId(1),
        defender: BLUE,
        supporting_units: vec![],
    };
    table.act(RED, attack).await?;
    table.act(RED, EndTurn).await?;
    table.act(BLUE, EndTurn).await?;
    table.act(RED, SelectNextCombat { tile: EntityId(1) }).await?;

    // Each side rolls everything it has at the first thing it can hit.
    while let CombatStage::AwaitingDiceChoice(faction) = combat_stage(table.server.state()) {
        let Some((_, dice)) = combat::default_allocation(table.client(faction).state()) else {
            break;
        };
        table.act(faction, CombatDecision { dice }).await?;
    }

    let state = table.server.state();
    for (id, unit) in state.units() {
        tracing::info!(%id, faction = ?unit.faction, strength = unit.strength, "survivor");
    }
    tracing::info!(phase = %state.phase(), "battle over");

    for client in &mut table.clients {
        let synced = client.content_hash() == client.slot().and_then(|s| state.registry().content_hash(s).ok());
        tracing::info!(slot = ?client.slot(), synced, "replica check");
        client.close();
    }
    Ok(())
}
