//! The client replica.
//!
//! A [`Client`] holds a player-scoped copy of the game state and keeps it
//! in step with the server: it applies resyncs and entity updates in
//! arrival order, acknowledges every state message it handles, answers
//! sync checks with its content hash, and tracks the actions it sent.

use std::sync::Arc;

use warroom_game::{ActionDispatcher, Catalog, EntityKind, GameState, PlayerAction, Rejection, Ruleset};
use warroom_protocol::{
    ClientMessage, CorrelationToken, DenialCode, Handshake, PlayerSlot, ServerMessage, WireDecode, WireEncode,
};
use warroom_session::hash_secret;
use warroom_transport::{Connection, ConnectionId};
use warroom_world::{Kind, ReplicationChannel, WorldError};

use crate::pending::{ActionResult, PendingActions};
use crate::{ClientConfig, WarroomError};

/// Where the client stands with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    /// Handshake sent, no answer yet.
    AwaitingApproval,
    Approved(PlayerSlot),
    Denied(DenialCode),
    /// The connection is gone.
    Closed,
}

/// Something a [`Client::poll`] observed, for the layer above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Approved(PlayerSlot),
    Denied(DenialCode),
    GameStarted,
    /// The replica was cleared and rebuilt to the server's shape.
    ResyncStarted,
    /// Every entity of the resync has arrived.
    ResyncComplete,
    /// A sync check was answered with this hash.
    SyncChecked { content_hash: i32 },
}

/// One peer's connection to the authoritative server.
pub struct Client<C: Connection> {
    connection: C,
    catalog: Catalog,
    channel: ReplicationChannel<EntityKind>,
    state: GameState,
    status: ClientStatus,
    game_started: bool,
    pending: PendingActions,
    next_token: i32,
}

impl<C: Connection> Client<C> {
    /// Sends the handshake over `connection`. The answer arrives on a later
    /// [`poll`](Self::poll).
    pub fn connect(
        connection: C,
        config: ClientConfig,
        catalog: Catalog,
        ruleset: Arc<Ruleset>,
    ) -> Result<Self, WarroomError> {
        let handshake = Handshake {
            type_hash: catalog.identity_hash(),
            secret_hash: hash_secret(&config.secret),
            desired_slot: config.desired_slot,
        };
        connection.send(handshake.to_bytes()?)?;
        tracing::debug!(connection = %connection.id(), desired = ?config.desired_slot, "handshake sent");

        Ok(Self {
            channel: ReplicationChannel::new(Arc::clone(&catalog.entities)),
            state: GameState::replica(Arc::clone(&catalog.entities), ruleset),
            pending: PendingActions::new(config.action_timeout_ticks),
            connection,
            catalog,
            status: ClientStatus::AwaitingApproval,
            game_started: false,
            next_token: 0,
        })
    }

    /// Handles every frame that has arrived, then acknowledges the state
    /// messages among them.
    ///
    /// # Errors
    /// A lost connection or a protocol-fatal message. The connection is
    /// closed in both cases.
    pub fn poll(&mut self) -> Result<Vec<ClientEvent>, WarroomError> {
        let mut events = Vec::new();
        if !self.is_open() {
            return Ok(events);
        }

        let mut handled: i32 = 0;
        loop {
            let frame = match self.connection.try_recv() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    self.close();
                    return Err(e.into());
                }
            };
            match self.handle_frame(&frame, &mut events) {
                Ok(true) => handled += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "closing connection");
                    self.close();
                    return Err(e);
                }
            }
            if !self.is_open() {
                return Ok(events);
            }
        }

        if handled > 0 {
            self.send(&ClientMessage::MessagesHandled { count: handled })?;
        }
        Ok(events)
    }

    /// Handles one frame. Returns whether it was state traffic.
    fn handle_frame(&mut self, frame: &[u8], events: &mut Vec<ClientEvent>) -> Result<bool, WarroomError> {
        let message = ServerMessage::from_bytes(frame)?;
        let state_traffic = message.is_state_traffic();
        tracing::trace!(message = message.name(), "received");

        match message {
            ServerMessage::Approved { slot } => {
                tracing::info!(%slot, "approved by server");
                self.status = ClientStatus::Approved(slot);
                events.push(ClientEvent::Approved(slot));
            }
            ServerMessage::Denied(code) => {
                tracing::info!(?code, "denied by server");
                self.status = ClientStatus::Denied(code);
                self.connection.close();
                events.push(ClientEvent::Denied(code));
            }
            ServerMessage::StartGame => {
                self.game_started = true;
                events.push(ClientEvent::GameStarted);
            }
            ServerMessage::ResyncAnnouncement {
                capacities,
                structural_hash,
            } => {
                let registry = self.state.registry_mut();
                registry.rebuild(&capacities);
                let actual = registry.structural_hash();
                if actual != structural_hash {
                    return Err(WarroomError::StructuralMismatch {
                        expected: structural_hash,
                        actual,
                    });
                }
                tracing::info!(kinds = capacities.len(), "resync started");
                events.push(ClientEvent::ResyncStarted);
            }
            ServerMessage::ResyncComplete => {
                tracing::info!(entities = self.state.registry().active_count(), "resync complete");
                events.push(ClientEvent::ResyncComplete);
            }
            ServerMessage::EntityUpdate(bytes) => self.apply_update(&bytes)?,
            ServerMessage::ActionReply { token, outcome } => {
                tracing::debug!(%token, ok = outcome.is_ok(), "action reply");
                self.pending.resolve(token, outcome);
            }
            ServerMessage::SyncCheck => {
                let slot = self.slot().ok_or(WarroomError::NotApproved)?;
                let content_hash = self.state.registry().content_hash(slot)?;
                self.send(&ClientMessage::SyncCheckReply { content_hash })?;
                events.push(ClientEvent::SyncChecked { content_hash });
            }
        }
        Ok(state_traffic)
    }

    fn apply_update(&mut self, bytes: &[u8]) -> Result<(), WarroomError> {
        match self.channel.apply(self.state.registry_mut(), bytes) {
            Ok(applied) => {
                tracing::trace!(kind = applied.kind.name(), id = %applied.id, "entity updated");
                Ok(())
            }
            Err(e @ WorldError::NotImplemented { .. }) => {
                tracing::error!(error = %e, "update dropped");
                Ok(())
            }
            Err(e) if !e.is_fatal() => {
                tracing::warn!(error = %e, "update dropped");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Advances the pending-action timeout by one tick. Returns how many
    /// actions were failed by it.
    pub fn tick(&mut self) -> usize {
        self.pending.tick()
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    /// Sends `action` and registers `on_reply` to run once with its
    /// outcome: the server's verdict, or a timeout.
    pub fn send_action(
        &mut self,
        action: impl Into<PlayerAction>,
        on_reply: impl FnOnce(ActionResult) + Send + 'static,
    ) -> Result<CorrelationToken, WarroomError> {
        if self.slot().is_none() {
            return Err(WarroomError::NotApproved);
        }
        let action = action.into();
        let (kind_id, payload) = ActionDispatcher::encode_request(&self.catalog.actions, &action)?;
        self.next_token = self.next_token.wrapping_add(1);
        let token = CorrelationToken(self.next_token);

        self.send(&ClientMessage::Action {
            kind_id,
            token,
            payload,
        })?;
        self.pending.insert(token, Box::new(on_reply));
        tracing::debug!(%token, action = action.kind().name(), "action sent");
        Ok(token)
    }

    /// Runs the action's validation against the replica without sending
    /// anything. The server's verdict may still differ if the replica is
    /// behind.
    pub fn validate_locally(&self, action: &PlayerAction) -> Result<(), Rejection> {
        let slot = self.slot().ok_or_else(|| Rejection::new("Not connected to a server"))?;
        action.validate(&self.state, slot)
    }

    fn send(&mut self, message: &ClientMessage) -> Result<(), WarroomError> {
        let bytes = message.to_bytes()?;
        if let Err(e) = self.connection.send(bytes) {
            self.close();
            return Err(e.into());
        }
        Ok(())
    }

    /// Closes the connection. Pending actions are left to time out.
    pub fn close(&mut self) {
        self.connection.close();
        if !matches!(self.status, ClientStatus::Denied(_)) {
            self.status = ClientStatus::Closed;
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn status(&self) -> ClientStatus {
        self.status
    }

    /// The slot the server approved us into.
    pub fn slot(&self) -> Option<PlayerSlot> {
        match self.status {
            ClientStatus::Approved(slot) => Some(slot),
            _ => None,
        }
    }

    fn is_open(&self) -> bool {
        matches!(self.status, ClientStatus::AwaitingApproval | ClientStatus::Approved(_))
    }

    /// The replica.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn is_game_started(&self) -> bool {
        self.game_started
    }

    /// Content hash of the replica as this player sees it. `None` before
    /// approval or when the replica holds state that cannot be encoded.
    pub fn content_hash(&self) -> Option<i32> {
        self.slot()
            .and_then(|slot| self.state.registry().content_hash(slot).ok())
    }

    /// Actions still waiting for a reply.
    pub fn pending_actions(&self) -> usize {
        self.pending.len()
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection.id()
    }
}
