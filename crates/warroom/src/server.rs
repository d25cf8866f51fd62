//! The authoritative server and its tick loop.
//!
//! One [`Server`] owns the game state, every connection and the
//! replication bookkeeping. Nothing is shared across tasks: each tick
//! drains all connections, advances the game, replicates what changed and
//! flushes the outbound queue, in that order.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use warroom_game::actions::CombatDecision;
use warroom_game::combat;
use warroom_game::{ActionDispatcher, Catalog, Change, EntityKind, GameState};
use warroom_protocol::{PlayerSlot, ServerMessage, WireEncode};
use warroom_session::ConnectionGatekeeper;
use warroom_tick::{Countdown, TickScheduler};
use warroom_transport::{Connection, ConnectionId, Transport, TransportError};
use warroom_world::ReplicationChannel;

use crate::{ServerConfig, SyncSupervisor, WarroomError};

/// Messages waiting for the end-of-tick flush, in send order.
pub(crate) type Outbox = Vec<(ConnectionId, ServerMessage)>;

/// Restarts whenever a new faction is asked for dice.
#[derive(Debug)]
struct DecisionTimer {
    /// `(combat_id, stage_counter)` of the decision being timed.
    watching: Option<(i32, i32)>,
    countdown: Countdown,
}

/// The authoritative peer.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use warroom::prelude::*;
///
/// # async fn demo() -> Result<(), WarroomError> {
/// let catalog = Catalog::new()?;
/// let state = GameState::new(
///     Arc::clone(&catalog.entities),
///     Arc::new(Ruleset::standard()),
///     ScenarioConfig::default(),
/// )?;
/// let (transport, _connector) = memory_transport();
/// let server = Server::new(transport, ServerConfig::default(), catalog, state);
/// let shutdown = async {
///     let _ = tokio::signal::ctrl_c().await;
/// };
/// server.run(shutdown).await?;
/// # Ok(())
/// # }
/// ```
pub struct Server<T: Transport> {
    config: ServerConfig,
    transport: T,
    accepting: bool,
    pub(crate) connections: BTreeMap<ConnectionId, T::Connection>,
    pub(crate) gatekeeper: ConnectionGatekeeper,
    catalog: Catalog,
    pub(crate) state: GameState,
    pub(crate) dispatcher: ActionDispatcher,
    channel: ReplicationChannel<EntityKind>,
    pub(crate) supervisor: SyncSupervisor,
    pub(crate) outbox: Outbox,
    decision_timer: Option<DecisionTimer>,
    ticks: u64,
}

impl<T: Transport> Server<T> {
    /// Creates a server over `transport` for the match in `state`.
    ///
    /// Peers must present `catalog`'s identity hash in their handshake.
    pub fn new(transport: T, config: ServerConfig, catalog: Catalog, state: GameState) -> Self {
        let gatekeeper = ConnectionGatekeeper::new(config.gatekeeper.clone(), catalog.identity_hash());
        let decision_timer = config.combat_decision_timeout_ticks.map(|ticks| DecisionTimer {
            watching: None,
            countdown: Countdown::one_shot(ticks),
        });
        Self {
            transport,
            accepting: true,
            connections: BTreeMap::new(),
            gatekeeper,
            dispatcher: ActionDispatcher::new(Arc::clone(&catalog.actions), config.dice_seed),
            channel: ReplicationChannel::new(Arc::clone(&catalog.entities)),
            supervisor: SyncSupervisor::new(config.sync.clone()),
            catalog,
            state,
            outbox: Outbox::new(),
            decision_timer,
            ticks: 0,
            config,
        }
    }

    // -----------------------------------------------------------------------
    // Tick loop
    // -----------------------------------------------------------------------

    /// Runs the tick loop until `shutdown` resolves, then hands the server
    /// back.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<Self, WarroomError> {
        let mut scheduler = TickScheduler::new(self.config.tick.clone());
        tokio::pin!(shutdown);
        tracing::info!(rate_hz = scheduler.tick_rate_hz(), "server running");

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = scheduler.wait_for_tick() => {
                    self.tick()?;
                    scheduler.record_tick_end();
                }
            }
        }

        tracing::info!(ticks = self.ticks, "server stopped");
        Ok(self)
    }

    /// One pass of the authoritative loop.
    ///
    /// Per-connection failures close that connection and are not returned.
    pub fn tick(&mut self) -> Result<(), WarroomError> {
        self.ticks += 1;
        self.accept_connections()?;
        self.drain_connections();
        self.step_decision_timer()?;
        self.replicate_changes()?;
        self.supervisor
            .step(&mut self.gatekeeper, &self.state, &self.channel, &mut self.outbox)?;
        self.flush();
        Ok(())
    }

    fn accept_connections(&mut self) -> Result<(), WarroomError> {
        while self.accepting {
            match self.transport.try_accept() {
                Ok(Some(conn)) => {
                    let id = conn.id();
                    self.gatekeeper.register(id)?;
                    self.connections.insert(id, conn);
                    tracing::debug!(connection = %id, "connection accepted");
                }
                Ok(None) => break,
                Err(TransportError::Shutdown) => {
                    tracing::info!("transport shut down, no longer accepting");
                    self.accepting = false;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Sends every state change recorded since the last call to each
    /// connection that receives updates.
    pub(crate) fn replicate_changes(&mut self) -> Result<(), WarroomError> {
        let changes = self.state.take_changes();
        if changes.is_empty() {
            return Ok(());
        }
        let receivers: Vec<(ConnectionId, PlayerSlot)> = self
            .gatekeeper
            .approved()
            .filter(|s| s.sync_state.receives_updates())
            .filter_map(|s| Some((s.connection, s.slot?)))
            .collect();
        if receivers.is_empty() {
            return Ok(());
        }

        for change in &changes {
            match change {
                Change::FullState { kind, id } => {
                    let Some(record) = self.state.registry().get(*kind, *id) else {
                        continue;
                    };
                    for (conn, slot) in &receivers {
                        let bytes = self.channel.encode_full_state(record, *slot)?;
                        self.outbox.push((*conn, ServerMessage::EntityUpdate(bytes)));
                    }
                }
                Change::Custom {
                    kind,
                    id,
                    sub_header,
                    payload,
                } => {
                    let bytes = self.channel.encode_custom_update(*kind, *id, *sub_header, payload)?;
                    for (conn, _) in &receivers {
                        self.outbox.push((*conn, ServerMessage::EntityUpdate(bytes.clone())));
                    }
                }
            }
        }
        tracing::trace!(changes = changes.len(), receivers = receivers.len(), "changes replicated");
        Ok(())
    }

    fn step_decision_timer(&mut self) -> Result<(), WarroomError> {
        let Some(timer) = self.decision_timer.as_mut() else {
            return Ok(());
        };
        let awaiting = self
            .state
            .match_state()
            .ok()
            .and_then(|m| m.combat.as_ref())
            .filter(|c| c.pending_dice_choice)
            .map(|c| (c.combat_id, c.stage_counter));
        if awaiting != timer.watching {
            timer.watching = awaiting;
            match awaiting {
                Some(_) => timer.countdown.start(),
                None => timer.countdown.stop(),
            }
            return Ok(());
        }
        if !timer.countdown.tick() {
            return Ok(());
        }

        let Some((faction, dice)) = combat::default_allocation(&self.state) else {
            return Ok(());
        };
        tracing::info!(%faction, ?dice, "combat decision timed out, allocating dice");
        if let Err(rejection) = self
            .dispatcher
            .submit(&mut self.state, faction, CombatDecision { dice }.into())?
        {
            tracing::warn!(%faction, reason = %rejection, "automatic dice allocation rejected");
        }
        Ok(())
    }

    fn flush(&mut self) {
        let mut failed = BTreeMap::new();
        for (id, message) in std::mem::take(&mut self.outbox) {
            let Some(conn) = self.connections.get(&id) else {
                continue;
            };
            let bytes = match message.to_bytes() {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!(connection = %id, message = message.name(), error = %e, "message not sent");
                    continue;
                }
            };
            match conn.send(bytes) {
                Ok(()) => {
                    tracing::trace!(connection = %id, message = message.name(), "sent");
                    self.supervisor.note_sent(id, &message);
                }
                Err(e) => {
                    failed.entry(id).or_insert(e);
                }
            }
        }
        for (id, e) in failed {
            self.drop_connection(id, &e.to_string());
        }
    }

    /// Sends `message` right away, bypassing the outbox.
    pub(crate) fn send_now(&mut self, id: ConnectionId, message: &ServerMessage) {
        let Some(conn) = self.connections.get(&id) else {
            return;
        };
        let bytes = match message.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(connection = %id, message = message.name(), error = %e, "message not sent");
                return;
            }
        };
        if conn.send(bytes).is_ok() {
            self.supervisor.note_sent(id, message);
        }
    }

    /// Closes a connection and forgets everything about it. The slot it
    /// held is free for the next peer.
    pub(crate) fn drop_connection(&mut self, id: ConnectionId, reason: &str) {
        if let Some(mut conn) = self.connections.remove(&id) {
            conn.close();
        }
        let slot = self.gatekeeper.disconnect(id).and_then(|s| s.slot);
        self.supervisor.disconnect(id);
        self.outbox.retain(|(to, _)| *to != id);
        tracing::info!(connection = %id, slot = ?slot, reason, "connection dropped");
    }

    // -----------------------------------------------------------------------
    // Match control
    // -----------------------------------------------------------------------

    /// Leaves setup: notifies every approved peer and queues a resync for
    /// each. Peers approved later get the same on approval.
    pub fn start_game(&mut self) -> Result<(), WarroomError> {
        self.state.start_game()?;
        let approved: Vec<ConnectionId> = self.gatekeeper.approved().map(|s| s.connection).collect();
        for id in &approved {
            self.outbox.push((*id, ServerMessage::StartGame));
            self.supervisor.enqueue(&mut self.gatekeeper, *id)?;
        }
        tracing::info!(players = approved.len(), "match started");
        Ok(())
    }

    /// Queues a full resync of the peer in `slot`. Returns `false` if there
    /// is no such peer or it is already queued.
    pub fn request_resync(&mut self, slot: PlayerSlot) -> Result<bool, WarroomError> {
        let Some(id) = self.gatekeeper.connection_of(slot) else {
            return Ok(false);
        };
        Ok(self.supervisor.enqueue(&mut self.gatekeeper, id)?)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Direct access for scenario setup. Changes made here are replicated
    /// on the next tick like any other.
    pub fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }

    pub fn gatekeeper(&self) -> &ConnectionGatekeeper {
        &self.gatekeeper
    }

    pub fn supervisor(&self) -> &SyncSupervisor {
        &self.supervisor
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Open connections, approved or not.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
