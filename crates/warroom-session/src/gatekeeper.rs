//! The connection gatekeeper: handshakes and player slots.
//!
//! Every accepted connection is registered here first. Its first message
//! is a [`Handshake`]; the gatekeeper either approves it into a player slot
//! or denies it with a reason code. Approved sessions then carry their
//! replication state until the connection drops, at which point the slot
//! is reclaimed for the next peer.
//!
//! # Concurrency note
//!
//! `ConnectionGatekeeper` is plain data owned by the tick loop. It is never
//! shared across tasks.

use std::collections::{BTreeMap, HashMap};

use warroom_protocol::{DenialCode, Handshake, PlayerSlot, SlotRequest};
use warroom_transport::ConnectionId;

use crate::{GatekeeperConfig, Session, SessionError, SyncState};

/// What the server answers a handshake with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Approved(PlayerSlot),
    Denied(DenialCode),
}

/// Tracks every connection and which player slot it holds.
///
/// ## Lifecycle
///
/// ```text
/// register() ──→ handshake() ──→ [Approved(slot)] ──→ disconnect()
///                     │                                    │
///                     ▼                                    ▼
///               [Denied(code)]                      slot is free again
/// ```
#[derive(Debug)]
pub struct ConnectionGatekeeper {
    config: GatekeeperConfig,
    secret_hash: i32,
    /// Type hash this server was built with.
    type_hash: i32,
    sessions: HashMap<ConnectionId, Session>,
    /// Occupied slots. Kept in sync with `sessions`.
    slots: BTreeMap<PlayerSlot, ConnectionId>,
}

impl ConnectionGatekeeper {
    pub fn new(config: GatekeeperConfig, type_hash: i32) -> Self {
        Self {
            secret_hash: config.secret_hash(),
            config,
            type_hash,
            sessions: HashMap::new(),
            slots: BTreeMap::new(),
        }
    }

    /// Registers a freshly accepted connection as awaiting its handshake.
    ///
    /// # Errors
    /// [`SessionError::AlreadyRegistered`] if the id is already known.
    pub fn register(&mut self, connection: ConnectionId) -> Result<(), SessionError> {
        if self.sessions.contains_key(&connection) {
            return Err(SessionError::AlreadyRegistered(connection));
        }
        self.sessions.insert(connection, Session::pending(connection));
        tracing::debug!(%connection, "connection registered");
        Ok(())
    }

    /// Decides a handshake.
    ///
    /// Checks run in order: shared secret, type identity, then slot
    /// availability. The first failing check names the denial code. A
    /// denied connection stays registered (and unapproved); the caller
    /// closes it after sending the denial.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`]: `connection` was never registered
    /// - [`SessionError::AlreadyApproved`]: it already holds a slot
    pub fn handshake(
        &mut self,
        connection: ConnectionId,
        handshake: &Handshake,
    ) -> Result<HandshakeOutcome, SessionError> {
        let session = self
            .sessions
            .get(&connection)
            .ok_or(SessionError::NotFound(connection))?;
        if session.is_approved() {
            return Err(SessionError::AlreadyApproved(connection));
        }

        if handshake.secret_hash != self.secret_hash {
            tracing::info!(%connection, "handshake denied: wrong password");
            return Ok(HandshakeOutcome::Denied(DenialCode::WrongPassword));
        }
        if handshake.type_hash != self.type_hash {
            tracing::warn!(
                %connection,
                ours = self.type_hash,
                theirs = handshake.type_hash,
                "handshake denied: type identity mismatch"
            );
            return Ok(HandshakeOutcome::Denied(DenialCode::TypeMismatch));
        }
        let Some(slot) = self.pick_slot(handshake.desired_slot) else {
            tracing::info!(%connection, desired = ?handshake.desired_slot, "handshake denied: slot unavailable");
            return Ok(HandshakeOutcome::Denied(DenialCode::SlotUnavailable));
        };

        self.slots.insert(slot, connection);
        if let Some(session) = self.sessions.get_mut(&connection) {
            session.slot = Some(slot);
        }
        tracing::info!(%connection, %slot, "connection approved");
        Ok(HandshakeOutcome::Approved(slot))
    }

    fn pick_slot(&self, request: SlotRequest) -> Option<PlayerSlot> {
        let free = |slot: PlayerSlot| slot.0 < self.config.slots && !self.slots.contains_key(&slot);
        match request {
            SlotRequest::Slot(slot) => free(slot).then_some(slot),
            SlotRequest::Any => (0..self.config.slots).map(PlayerSlot).find(|s| free(*s)),
        }
    }

    /// Drops a connection's session and frees its slot.
    ///
    /// Returns the session that was removed, if any. Unknown ids are
    /// ignored: a connection may fail before it was ever registered.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Option<Session> {
        let session = self.sessions.remove(&connection)?;
        if let Some(slot) = session.slot {
            self.slots.remove(&slot);
            tracing::info!(%connection, %slot, "slot reclaimed");
        }
        Some(session)
    }

    // -- Queries ---------------------------------------------------------

    pub fn session(&self, connection: ConnectionId) -> Option<&Session> {
        self.sessions.get(&connection)
    }

    /// The slot `connection` was approved into.
    pub fn slot_of(&self, connection: ConnectionId) -> Option<PlayerSlot> {
        self.sessions.get(&connection).and_then(|s| s.slot)
    }

    /// The connection holding `slot`.
    pub fn connection_of(&self, slot: PlayerSlot) -> Option<ConnectionId> {
        self.slots.get(&slot).copied()
    }

    /// Approved sessions in slot order.
    pub fn approved(&self) -> impl Iterator<Item = &Session> + '_ {
        self.slots.values().filter_map(|c| self.sessions.get(c))
    }

    pub fn sync_state(&self, connection: ConnectionId) -> Option<SyncState> {
        self.sessions.get(&connection).map(|s| s.sync_state)
    }

    /// Records a replication state change.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if the connection is gone.
    pub fn set_sync_state(&mut self, connection: ConnectionId, state: SyncState) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(&connection)
            .ok_or(SessionError::NotFound(connection))?;
        if session.sync_state != state {
            tracing::debug!(%connection, from = ?session.sync_state, to = ?state, "sync state changed");
            session.sync_state = state;
        }
        Ok(())
    }

    pub fn config(&self) -> &GatekeeperConfig {
        &self.config
    }

    /// Number of registered connections, approved or not.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash_secret;

    const TYPE_HASH: i32 = 0x5EED;

    // -- Helpers ----------------------------------------------------------

    fn gatekeeper(slots: u8) -> ConnectionGatekeeper {
        ConnectionGatekeeper::new(
            GatekeeperConfig::default().with_slots(slots).with_secret("pw"),
            TYPE_HASH,
        )
    }

    fn conn(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn hello(desired_slot: SlotRequest) -> Handshake {
        Handshake {
            type_hash: TYPE_HASH,
            secret_hash: hash_secret("pw"),
            desired_slot,
        }
    }

    /// Registers `id` and runs a handshake for it.
    fn join(gk: &mut ConnectionGatekeeper, id: u64, desired_slot: SlotRequest) -> HandshakeOutcome {
        gk.register(conn(id)).unwrap();
        gk.handshake(conn(id), &hello(desired_slot)).unwrap()
    }

    // =====================================================================
    // handshake()
    // =====================================================================

    #[test]
    fn test_handshake_any_takes_lowest_free_slot() {
        let mut gk = gatekeeper(4);
        assert_eq!(join(&mut gk, 1, SlotRequest::Any), HandshakeOutcome::Approved(PlayerSlot(0)));
        assert_eq!(join(&mut gk, 2, SlotRequest::Any), HandshakeOutcome::Approved(PlayerSlot(1)));
        assert_eq!(gk.slot_of(conn(2)), Some(PlayerSlot(1)));
        assert_eq!(gk.connection_of(PlayerSlot(0)), Some(conn(1)));
    }

    #[test]
    fn test_handshake_specific_slot() {
        let mut gk = gatekeeper(4);
        assert_eq!(
            join(&mut gk, 1, SlotRequest::Slot(PlayerSlot(2))),
            HandshakeOutcome::Approved(PlayerSlot(2))
        );
        // Any skips the taken slot only.
        assert_eq!(join(&mut gk, 2, SlotRequest::Any), HandshakeOutcome::Approved(PlayerSlot(0)));
    }

    #[test]
    fn test_handshake_wrong_password_is_denied() {
        let mut gk = gatekeeper(4);
        gk.register(conn(1)).unwrap();
        let outcome = gk
            .handshake(
                conn(1),
                &Handshake {
                    secret_hash: hash_secret("nope"),
                    ..hello(SlotRequest::Any)
                },
            )
            .unwrap();
        assert_eq!(outcome, HandshakeOutcome::Denied(DenialCode::WrongPassword));
        assert!(!gk.session(conn(1)).unwrap().is_approved());
    }

    #[test]
    fn test_handshake_password_checked_before_type_hash() {
        let mut gk = gatekeeper(4);
        gk.register(conn(1)).unwrap();
        let outcome = gk
            .handshake(
                conn(1),
                &Handshake {
                    type_hash: 1,
                    secret_hash: 2,
                    desired_slot: SlotRequest::Any,
                },
            )
            .unwrap();
        assert_eq!(outcome, HandshakeOutcome::Denied(DenialCode::WrongPassword));
    }

    #[test]
    fn test_handshake_type_mismatch_is_denied() {
        let mut gk = gatekeeper(4);
        gk.register(conn(1)).unwrap();
        let outcome = gk
            .handshake(
                conn(1),
                &Handshake {
                    type_hash: TYPE_HASH + 1,
                    ..hello(SlotRequest::Any)
                },
            )
            .unwrap();
        assert_eq!(outcome, HandshakeOutcome::Denied(DenialCode::TypeMismatch));
    }

    #[test]
    fn test_handshake_taken_slot_is_unavailable() {
        let mut gk = gatekeeper(4);
        join(&mut gk, 1, SlotRequest::Slot(PlayerSlot(1)));
        assert_eq!(
            join(&mut gk, 2, SlotRequest::Slot(PlayerSlot(1))),
            HandshakeOutcome::Denied(DenialCode::SlotUnavailable)
        );
    }

    #[test]
    fn test_handshake_out_of_range_slot_is_unavailable() {
        let mut gk = gatekeeper(2);
        assert_eq!(
            join(&mut gk, 1, SlotRequest::Slot(PlayerSlot(2))),
            HandshakeOutcome::Denied(DenialCode::SlotUnavailable)
        );
    }

    #[test]
    fn test_handshake_full_server_denies_any() {
        let mut gk = gatekeeper(2);
        join(&mut gk, 1, SlotRequest::Any);
        join(&mut gk, 2, SlotRequest::Any);
        assert_eq!(
            join(&mut gk, 3, SlotRequest::Any),
            HandshakeOutcome::Denied(DenialCode::SlotUnavailable)
        );
    }

    #[test]
    fn test_handshake_unregistered_connection() {
        let mut gk = gatekeeper(2);
        let result = gk.handshake(conn(9), &hello(SlotRequest::Any));
        assert!(matches!(result, Err(SessionError::NotFound(c)) if c == conn(9)));
    }

    #[test]
    fn test_handshake_twice_is_an_error() {
        let mut gk = gatekeeper(2);
        join(&mut gk, 1, SlotRequest::Any);
        let result = gk.handshake(conn(1), &hello(SlotRequest::Any));
        assert!(matches!(result, Err(SessionError::AlreadyApproved(_))));
    }

    // =====================================================================
    // register() / disconnect()
    // =====================================================================

    #[test]
    fn test_register_twice_is_an_error() {
        let mut gk = gatekeeper(2);
        gk.register(conn(1)).unwrap();
        assert!(matches!(gk.register(conn(1)), Err(SessionError::AlreadyRegistered(_))));
    }

    #[test]
    fn test_disconnect_reclaims_slot() {
        let mut gk = gatekeeper(1);
        join(&mut gk, 1, SlotRequest::Any);
        let removed = gk.disconnect(conn(1)).unwrap();
        assert_eq!(removed.slot, Some(PlayerSlot(0)));
        assert!(gk.is_empty());

        // The next peer gets the same slot.
        assert_eq!(join(&mut gk, 2, SlotRequest::Any), HandshakeOutcome::Approved(PlayerSlot(0)));
    }

    #[test]
    fn test_disconnect_unknown_is_ignored() {
        let mut gk = gatekeeper(1);
        assert!(gk.disconnect(conn(5)).is_none());
    }

    // =====================================================================
    // sync state
    // =====================================================================

    #[test]
    fn test_set_sync_state_round_trip() {
        let mut gk = gatekeeper(2);
        join(&mut gk, 1, SlotRequest::Any);
        assert_eq!(gk.sync_state(conn(1)), Some(SyncState::NotSynced));
        gk.set_sync_state(conn(1), SyncState::QueuedForResync).unwrap();
        assert_eq!(gk.sync_state(conn(1)), Some(SyncState::QueuedForResync));
        assert!(gk.set_sync_state(conn(2), SyncState::Synced).is_err());
    }

    #[test]
    fn test_approved_lists_in_slot_order() {
        let mut gk = gatekeeper(4);
        join(&mut gk, 1, SlotRequest::Slot(PlayerSlot(3)));
        join(&mut gk, 2, SlotRequest::Slot(PlayerSlot(0)));
        gk.register(conn(3)).unwrap();

        let slots: Vec<_> = gk.approved().map(|s| s.slot).collect();
        assert_eq!(slots, vec![Some(PlayerSlot(0)), Some(PlayerSlot(3))]);
        assert_eq!(gk.len(), 3);
    }
}
