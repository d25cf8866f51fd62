//! Content-hash checks and full resyncs.
//!
//! ```text
//! Synced ──(hash mismatch)──→ QueuedForResync ──→ Resyncing ──→ Synced
//!                                    ↑                 │
//!                                    └───(deadline)────┘
//! ```
//!
//! One connection resyncs at a time, in FIFO order. A resync is an
//! announcement of the registry's shape, then every entity's full state in
//! batches, each batch sent only once the client has acknowledged every
//! state message sent to it so far, then a closing marker.
//!
//! Acknowledgments carry only a count, so the announcement waits until
//! the target has acknowledged everything sent before it. Otherwise a late
//! ack for older traffic would release the first batch early. Traffic
//! still unacknowledged after a short grace is written off as lost.

use std::collections::{HashMap, VecDeque};

use warroom_game::{EntityKind, GameState};
use warroom_protocol::{PlayerSlot, ServerMessage};
use warroom_session::{ConnectionGatekeeper, SessionError, SyncState};
use warroom_tick::Countdown;
use warroom_transport::ConnectionId;
use warroom_world::{EntityId, EntityModel, ReplicationChannel};

use crate::{Outbox, SyncConfig, WarroomError};

#[derive(Debug)]
struct ActiveResync {
    target: ConnectionId,
    slot: PlayerSlot,
    /// Filled when the announcement goes out.
    backlog: VecDeque<(EntityKind, EntityId)>,
    announced: bool,
    ack_grace: Countdown,
    deadline: Countdown,
}

/// Drives every connection's replication state after approval.
#[derive(Debug)]
pub struct SyncSupervisor {
    config: SyncConfig,
    queue: VecDeque<ConnectionId>,
    active: Option<ActiveResync>,
    check: Countdown,
    /// Content hash each checked connection should answer with.
    expected: HashMap<ConnectionId, i32>,
    /// State messages sent but not yet acknowledged, per connection.
    unacked: HashMap<ConnectionId, i64>,
}

impl SyncSupervisor {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            check: Countdown::repeating(config.check_interval_ticks),
            config,
            queue: VecDeque::new(),
            active: None,
            expected: HashMap::new(),
            unacked: HashMap::new(),
        }
    }

    /// Queues `connection` for a full resync.
    ///
    /// Returns `false` if it is already queued or resyncing.
    pub fn enqueue(
        &mut self,
        gatekeeper: &mut ConnectionGatekeeper,
        connection: ConnectionId,
    ) -> Result<bool, SessionError> {
        match gatekeeper.sync_state(connection) {
            None => return Err(SessionError::NotFound(connection)),
            Some(SyncState::QueuedForResync | SyncState::Resyncing) => return Ok(false),
            Some(_) => {}
        }
        gatekeeper.set_sync_state(connection, SyncState::QueuedForResync)?;
        self.queue.push_back(connection);
        self.expected.remove(&connection);
        tracing::debug!(%connection, queued = self.queue.len(), "resync queued");
        Ok(true)
    }

    /// Records a message actually sent to `connection`.
    pub fn note_sent(&mut self, connection: ConnectionId, message: &ServerMessage) {
        if message.is_state_traffic() {
            *self.unacked.entry(connection).or_insert(0) += 1;
        }
    }

    /// Applies a `MessagesHandled` acknowledgment.
    pub fn acknowledge(&mut self, connection: ConnectionId, count: i32) {
        let unacked = self.unacked.entry(connection).or_insert(0);
        *unacked = (*unacked - i64::from(count)).max(0);
        tracing::trace!(%connection, count, left = *unacked, "state messages acknowledged");
    }

    /// Compares a sync check answer with the hash recorded when the check
    /// went out. A mismatch queues a resync.
    pub fn check_reply(
        &mut self,
        gatekeeper: &mut ConnectionGatekeeper,
        connection: ConnectionId,
        content_hash: i32,
    ) -> Result<(), SessionError> {
        let Some(expected) = self.expected.remove(&connection) else {
            tracing::debug!(%connection, "unsolicited sync check reply, ignored");
            return Ok(());
        };
        if expected == content_hash {
            tracing::trace!(%connection, "sync check passed");
            return Ok(());
        }
        tracing::warn!(%connection, expected, actual = content_hash, "content hash mismatch");
        self.enqueue(gatekeeper, connection)?;
        Ok(())
    }

    /// Forgets a connection that went away. A resync in progress for it
    /// is abandoned and the next queued one starts on the next step.
    pub fn disconnect(&mut self, connection: ConnectionId) {
        self.queue.retain(|c| *c != connection);
        self.expected.remove(&connection);
        self.unacked.remove(&connection);
        if self.active.as_ref().is_some_and(|a| a.target == connection) {
            tracing::info!(%connection, "resync target disconnected");
            self.active = None;
        }
    }

    /// Runs one tick: sends sync checks to synced connections when the
    /// check interval elapses, then advances the resync queue.
    ///
    /// Call after the tick's changes have been replicated, so expected
    /// hashes and pushed full states reflect everything already sent.
    pub(crate) fn step(
        &mut self,
        gatekeeper: &mut ConnectionGatekeeper,
        state: &GameState,
        channel: &ReplicationChannel<EntityKind>,
        outbox: &mut Outbox,
    ) -> Result<(), WarroomError> {
        if self.check.tick() {
            self.check_synced(gatekeeper, state, outbox);
        }
        match self.active.take() {
            Some(active) => self.continue_resync(active, gatekeeper, state, channel, outbox),
            None => self.start_next(gatekeeper, state, outbox),
        }
    }

    fn check_synced(&mut self, gatekeeper: &ConnectionGatekeeper, state: &GameState, outbox: &mut Outbox) {
        let mut checked = 0;
        for session in gatekeeper.approved() {
            let Some(slot) = session.slot else { continue };
            if session.sync_state != SyncState::Synced {
                continue;
            }
            let expected = match state.registry().content_hash(slot) {
                Ok(hash) => hash,
                Err(e) => {
                    tracing::error!(connection = %session.connection, error = %e, "content hash unavailable");
                    continue;
                }
            };
            self.expected.insert(session.connection, expected);
            outbox.push((session.connection, ServerMessage::SyncCheck));
            checked += 1;
        }
        tracing::debug!(checked, "sync check sent");
    }

    fn start_next(
        &mut self,
        gatekeeper: &mut ConnectionGatekeeper,
        state: &GameState,
        outbox: &mut Outbox,
    ) -> Result<(), WarroomError> {
        while let Some(target) = self.queue.pop_front() {
            let slot = match (gatekeeper.sync_state(target), gatekeeper.slot_of(target)) {
                (Some(SyncState::QueuedForResync), Some(slot)) => slot,
                _ => continue,
            };
            gatekeeper.set_sync_state(target, SyncState::Resyncing)?;

            let mut deadline = Countdown::one_shot(self.config.resync_deadline_ticks);
            deadline.start();
            let mut ack_grace = Countdown::one_shot(self.config.resync_ack_grace_ticks);
            ack_grace.start();
            let mut active = ActiveResync {
                target,
                slot,
                backlog: VecDeque::new(),
                announced: false,
                ack_grace,
                deadline,
            };
            tracing::info!(connection = %target, %slot, "resync started");
            if self.outstanding(target) == 0 {
                self.announce(&mut active, state, outbox);
            }
            self.active = Some(active);
            break;
        }
        Ok(())
    }

    fn announce(&mut self, active: &mut ActiveResync, state: &GameState, outbox: &mut Outbox) {
        let registry = state.registry();
        outbox.push((
            active.target,
            ServerMessage::ResyncAnnouncement {
                capacities: registry.capacities(),
                structural_hash: registry.structural_hash(),
            },
        ));
        active.backlog = registry
            .records()
            .map(|(_, record)| (record.entity.kind(), record.id))
            .collect();
        active.announced = true;
        tracing::debug!(connection = %active.target, entities = active.backlog.len(), "resync announced");
    }

    fn outstanding(&self, connection: ConnectionId) -> i64 {
        self.unacked.get(&connection).copied().unwrap_or(0)
    }

    fn continue_resync(
        &mut self,
        mut active: ActiveResync,
        gatekeeper: &mut ConnectionGatekeeper,
        state: &GameState,
        channel: &ReplicationChannel<EntityKind>,
        outbox: &mut Outbox,
    ) -> Result<(), WarroomError> {
        let target = active.target;
        if active.deadline.tick() {
            tracing::warn!(
                connection = %target,
                left = active.backlog.len(),
                "resync deadline expired, requeueing"
            );
            gatekeeper.set_sync_state(target, SyncState::QueuedForResync)?;
            self.queue.push_back(target);
            return Ok(());
        }
        if !active.announced {
            if self.outstanding(target) > 0 {
                if !active.ack_grace.tick() {
                    self.active = Some(active);
                    return Ok(());
                }
                tracing::debug!(
                    connection = %target,
                    lost = self.outstanding(target),
                    "unacknowledged traffic written off"
                );
                self.unacked.insert(target, 0);
            }
            self.announce(&mut active, state, outbox);
            self.active = Some(active);
            return Ok(());
        }
        if self.outstanding(target) > 0 {
            self.active = Some(active);
            return Ok(());
        }

        let mut sent = 0;
        while sent < self.config.resync_batch_size {
            let Some((kind, id)) = active.backlog.pop_front() else { break };
            let Some(record) = state.registry().get(kind, id) else {
                continue;
            };
            let bytes = channel.encode_full_state(record, active.slot)?;
            outbox.push((target, ServerMessage::EntityUpdate(bytes)));
            sent += 1;
        }
        tracing::trace!(connection = %target, sent, left = active.backlog.len(), "resync batch");

        if active.backlog.is_empty() {
            outbox.push((target, ServerMessage::ResyncComplete));
            gatekeeper.set_sync_state(target, SyncState::Synced)?;
            tracing::info!(connection = %target, slot = %active.slot, "resync complete");
        } else {
            self.active = Some(active);
        }
        Ok(())
    }

    /// The connection being resynced right now.
    pub fn active_target(&self) -> Option<ConnectionId> {
        self.active.as_ref().map(|a| a.target)
    }

    /// Connections waiting for their turn, in order.
    pub fn queued(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.queue.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use warroom_game::entities::{Faction, Tile};
    use warroom_game::{Catalog, Ruleset, ScenarioConfig};
    use warroom_protocol::{Handshake, SlotRequest};
    use warroom_session::{GatekeeperConfig, HandshakeOutcome};

    const TYPE_HASH: i32 = 77;

    struct Fixture {
        supervisor: SyncSupervisor,
        gatekeeper: ConnectionGatekeeper,
        state: GameState,
        channel: ReplicationChannel<EntityKind>,
    }

    impl Fixture {
        /// Two approved connections over a match with one tile and two
        /// factions: four entities in all.
        fn new(config: SyncConfig) -> (Self, ConnectionId, ConnectionId) {
            let catalog = Catalog::new().unwrap();
            let mut state = GameState::new(
                Arc::clone(&catalog.entities),
                Arc::new(Ruleset::standard()),
                ScenarioConfig::default(),
            )
            .unwrap();
            state.add_tile(Tile::default()).unwrap();
            state.add_faction(Faction::default()).unwrap();
            state.add_faction(Faction::default()).unwrap();

            let gk_config = GatekeeperConfig::default();
            let mut gatekeeper = ConnectionGatekeeper::new(gk_config.clone(), TYPE_HASH);
            let a = ConnectionId::new(1);
            let b = ConnectionId::new(2);
            for conn in [a, b] {
                gatekeeper.register(conn).unwrap();
                let outcome = gatekeeper
                    .handshake(
                        conn,
                        &Handshake {
                            type_hash: TYPE_HASH,
                            secret_hash: gk_config.secret_hash(),
                            desired_slot: SlotRequest::Any,
                        },
                    )
                    .unwrap();
                assert!(matches!(outcome, HandshakeOutcome::Approved(_)));
            }
            let fixture = Self {
                supervisor: SyncSupervisor::new(config),
                gatekeeper,
                channel: ReplicationChannel::new(Arc::clone(&catalog.entities)),
                state,
            };
            (fixture, a, b)
        }

        /// One step, with everything it queued "sent".
        fn step(&mut self) -> Vec<(ConnectionId, ServerMessage)> {
            let mut outbox = Outbox::new();
            self.supervisor
                .step(&mut self.gatekeeper, &self.state, &self.channel, &mut outbox)
                .unwrap();
            for (conn, msg) in &outbox {
                self.supervisor.note_sent(*conn, msg);
            }
            outbox
        }

        fn sync_state(&self, conn: ConnectionId) -> SyncState {
            self.gatekeeper.sync_state(conn).unwrap()
        }
    }

    fn count_updates(msgs: &[(ConnectionId, ServerMessage)]) -> usize {
        msgs.iter()
            .filter(|(_, m)| matches!(m, ServerMessage::EntityUpdate(_)))
            .count()
    }

    // -----------------------------------------------------------------------
    // Queue
    // -----------------------------------------------------------------------

    #[test]
    fn test_enqueue_marks_queued_once() {
        let (mut f, a, _) = Fixture::new(SyncConfig::default());
        assert!(f.supervisor.enqueue(&mut f.gatekeeper, a).unwrap());
        assert!(!f.supervisor.enqueue(&mut f.gatekeeper, a).unwrap());
        assert_eq!(f.sync_state(a), SyncState::QueuedForResync);
        assert_eq!(f.supervisor.queued().collect::<Vec<_>>(), vec![a]);
    }

    #[test]
    fn test_enqueue_unknown_connection_fails() {
        let (mut f, _, _) = Fixture::new(SyncConfig::default());
        assert!(f
            .supervisor
            .enqueue(&mut f.gatekeeper, ConnectionId::new(99))
            .is_err());
    }

    // -----------------------------------------------------------------------
    // Resync flow
    // -----------------------------------------------------------------------

    #[test]
    fn test_resync_announces_then_waits_for_ack() {
        let (mut f, a, _) = Fixture::new(SyncConfig::default());
        f.supervisor.enqueue(&mut f.gatekeeper, a).unwrap();

        let sent = f.step();
        assert_eq!(sent.len(), 1);
        let (to, ServerMessage::ResyncAnnouncement { structural_hash, .. }) = &sent[0] else {
            panic!("expected an announcement, got {sent:?}");
        };
        assert_eq!(*to, a);
        assert_eq!(*structural_hash, f.state.registry().structural_hash());
        assert_eq!(f.sync_state(a), SyncState::Resyncing);

        // Nothing moves until the announcement is acknowledged.
        assert!(f.step().is_empty());
        f.supervisor.acknowledge(a, 1);
        let sent = f.step();
        // match + tile + two factions, then the closing marker.
        assert_eq!(count_updates(&sent), 4);
        assert_eq!(sent.last().map(|(_, m)| m), Some(&ServerMessage::ResyncComplete));
        assert_eq!(f.sync_state(a), SyncState::Synced);
        assert_eq!(f.supervisor.active_target(), None);
    }

    #[test]
    fn test_resync_batches_are_gated_by_acks() {
        let (mut f, a, _) = Fixture::new(SyncConfig::default().with_batch_size(3));
        f.supervisor.enqueue(&mut f.gatekeeper, a).unwrap();
        f.step();
        f.supervisor.acknowledge(a, 1);

        let first = f.step();
        assert_eq!(count_updates(&first), 3);
        assert!(f.step().is_empty());

        // A partial ack is not enough.
        f.supervisor.acknowledge(a, 2);
        assert!(f.step().is_empty());
        f.supervisor.acknowledge(a, 1);
        let second = f.step();
        assert_eq!(count_updates(&second), 1);
        assert_eq!(f.sync_state(a), SyncState::Synced);
    }

    #[test]
    fn test_resyncs_run_one_at_a_time_in_order() {
        let (mut f, a, b) = Fixture::new(SyncConfig::default());
        f.supervisor.enqueue(&mut f.gatekeeper, b).unwrap();
        f.supervisor.enqueue(&mut f.gatekeeper, a).unwrap();

        f.step();
        assert_eq!(f.supervisor.active_target(), Some(b));
        assert_eq!(f.sync_state(a), SyncState::QueuedForResync);
        f.supervisor.acknowledge(b, 1);
        f.step();
        assert_eq!(f.sync_state(b), SyncState::Synced);

        let sent = f.step();
        assert_eq!(sent[0].0, a);
        assert_eq!(f.supervisor.active_target(), Some(a));
    }

    #[test]
    fn test_deadline_requeues_at_the_tail() {
        let (mut f, a, b) = Fixture::new(SyncConfig::default().with_deadline(3));
        f.supervisor.enqueue(&mut f.gatekeeper, a).unwrap();
        f.supervisor.enqueue(&mut f.gatekeeper, b).unwrap();
        f.step();
        assert_eq!(f.supervisor.active_target(), Some(a));

        // `a` never acknowledges.
        f.step();
        f.step();
        f.step();
        assert_eq!(f.sync_state(a), SyncState::QueuedForResync);
        assert_eq!(f.supervisor.queued().collect::<Vec<_>>(), vec![b, a]);

        f.step();
        assert_eq!(f.supervisor.active_target(), Some(b));
    }

    #[test]
    fn test_disconnect_mid_resync_frees_the_supervisor() {
        let (mut f, a, b) = Fixture::new(SyncConfig::default());
        f.supervisor.enqueue(&mut f.gatekeeper, a).unwrap();
        f.supervisor.enqueue(&mut f.gatekeeper, b).unwrap();
        f.step();

        f.gatekeeper.disconnect(a);
        f.supervisor.disconnect(a);
        assert_eq!(f.supervisor.active_target(), None);
        f.step();
        assert_eq!(f.supervisor.active_target(), Some(b));
    }

    #[test]
    fn test_departed_connection_is_skipped_in_queue() {
        let (mut f, a, b) = Fixture::new(SyncConfig::default());
        f.supervisor.enqueue(&mut f.gatekeeper, a).unwrap();
        f.supervisor.enqueue(&mut f.gatekeeper, b).unwrap();
        f.gatekeeper.disconnect(a);

        f.step();
        assert_eq!(f.supervisor.active_target(), Some(b));
    }

    #[test]
    fn test_late_ack_does_not_release_the_first_batch() {
        let (mut f, a, _) = Fixture::new(SyncConfig::default());
        // Two updates still in flight when the resync starts.
        for _ in 0..2 {
            f.supervisor.note_sent(a, &ServerMessage::EntityUpdate(vec![]));
        }
        f.supervisor.enqueue(&mut f.gatekeeper, a).unwrap();
        assert!(f.step().is_empty());
        assert_eq!(f.sync_state(a), SyncState::Resyncing);

        f.supervisor.acknowledge(a, 1);
        assert!(f.step().is_empty());
        f.supervisor.acknowledge(a, 1);
        let sent = f.step();
        assert!(matches!(
            sent.as_slice(),
            [(_, ServerMessage::ResyncAnnouncement { .. })]
        ));

        // Only the announcement's own ack moves the backlog.
        assert!(f.step().is_empty());
        f.supervisor.acknowledge(a, 1);
        assert_eq!(count_updates(&f.step()), 4);
        assert_eq!(f.sync_state(a), SyncState::Synced);
    }

    #[test]
    fn test_lost_traffic_is_written_off_after_grace() {
        let (mut f, a, _) = Fixture::new(SyncConfig::default().with_ack_grace(2));
        f.supervisor.note_sent(a, &ServerMessage::EntityUpdate(vec![]));
        f.supervisor.enqueue(&mut f.gatekeeper, a).unwrap();

        assert!(f.step().is_empty());
        assert!(f.step().is_empty());
        let sent = f.step();
        assert!(matches!(
            sent.as_slice(),
            [(_, ServerMessage::ResyncAnnouncement { .. })]
        ));
        f.supervisor.acknowledge(a, 1);
        assert_eq!(count_updates(&f.step()), 4);
        assert_eq!(f.sync_state(a), SyncState::Synced);
    }

    // -----------------------------------------------------------------------
    // Sync checks
    // -----------------------------------------------------------------------

    fn synced_fixture(interval: u64) -> (Fixture, ConnectionId, ConnectionId) {
        let (mut f, a, b) = Fixture::new(SyncConfig::default().with_check_interval(interval));
        f.gatekeeper.set_sync_state(a, SyncState::Synced).unwrap();
        (f, a, b)
    }

    #[test]
    fn test_sync_check_goes_only_to_synced_connections() {
        let (mut f, a, _) = synced_fixture(2);
        assert!(f.step().is_empty());
        let sent = f.step();
        assert_eq!(sent, vec![(a, ServerMessage::SyncCheck)]);
    }

    #[test]
    fn test_matching_reply_keeps_synced() {
        let (mut f, a, _) = synced_fixture(1);
        f.step();
        let hash = f.state.registry().content_hash(PlayerSlot(0)).unwrap();
        f.supervisor.check_reply(&mut f.gatekeeper, a, hash).unwrap();
        assert_eq!(f.sync_state(a), SyncState::Synced);
    }

    #[test]
    fn test_mismatched_reply_queues_resync() {
        let (mut f, a, _) = synced_fixture(1);
        f.step();
        let hash = f.state.registry().content_hash(PlayerSlot(0)).unwrap();
        f.supervisor
            .check_reply(&mut f.gatekeeper, a, hash.wrapping_add(1))
            .unwrap();
        assert_eq!(f.sync_state(a), SyncState::QueuedForResync);
    }

    #[test]
    fn test_unsolicited_reply_is_ignored() {
        let (mut f, a, _) = synced_fixture(100);
        f.supervisor.check_reply(&mut f.gatekeeper, a, 12345).unwrap();
        assert_eq!(f.sync_state(a), SyncState::Synced);
    }
}
