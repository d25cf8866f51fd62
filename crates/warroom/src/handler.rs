//! Inbound message routing for the server.
//!
//! Every frame from a connection lands here once per tick:
//!   1. Unapproved connection → the frame is a handshake
//!   2. Approved connection → action, acknowledgment or sync-check reply
//!
//! Anything that fails to decode is protocol-fatal and closes the
//! connection.

use warroom_game::GamePhase;
use warroom_protocol::{ClientMessage, CorrelationToken, Handshake, PlayerSlot, ServerMessage, WireDecode};
use warroom_session::HandshakeOutcome;
use warroom_transport::{Connection, ConnectionId, Transport};

use crate::{Server, WarroomError};

impl<T: Transport> Server<T> {
    /// Handles everything that arrived on every connection since the last
    /// tick.
    pub(crate) fn drain_connections(&mut self) {
        let ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        for id in ids {
            loop {
                let Some(conn) = self.connections.get_mut(&id) else {
                    break;
                };
                let frame = match conn.try_recv() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break,
                    Err(e) => {
                        self.drop_connection(id, &e.to_string());
                        break;
                    }
                };
                if let Err(e) = self.handle_frame(id, &frame) {
                    if e.is_fatal() {
                        tracing::warn!(connection = %id, error = %e, "protocol error");
                        self.drop_connection(id, "protocol error");
                        break;
                    }
                    tracing::error!(connection = %id, error = %e, "failed to handle message");
                }
            }
        }
    }

    fn handle_frame(&mut self, id: ConnectionId, frame: &[u8]) -> Result<(), WarroomError> {
        let Some(slot) = self.gatekeeper.slot_of(id) else {
            return self.handle_handshake(id, frame);
        };
        match ClientMessage::from_bytes(frame)? {
            ClientMessage::Action {
                kind_id,
                token,
                payload,
            } => self.handle_action(id, slot, kind_id, token, &payload)?,
            ClientMessage::MessagesHandled { count } => self.supervisor.acknowledge(id, count),
            ClientMessage::SyncCheckReply { content_hash } => {
                self.supervisor
                    .check_reply(&mut self.gatekeeper, id, content_hash)?;
            }
        }
        Ok(())
    }

    fn handle_handshake(&mut self, id: ConnectionId, frame: &[u8]) -> Result<(), WarroomError> {
        let handshake = Handshake::from_bytes(frame)?;
        match self.gatekeeper.handshake(id, &handshake)? {
            HandshakeOutcome::Approved(slot) => {
                self.outbox.push((id, ServerMessage::Approved { slot }));
                if self.state.phase() != GamePhase::Setup {
                    self.outbox.push((id, ServerMessage::StartGame));
                    self.supervisor.enqueue(&mut self.gatekeeper, id)?;
                }
            }
            HandshakeOutcome::Denied(code) => {
                self.send_now(id, &ServerMessage::Denied(code));
                self.drop_connection(id, "handshake denied");
            }
        }
        Ok(())
    }

    fn handle_action(
        &mut self,
        id: ConnectionId,
        actor: PlayerSlot,
        kind_id: u8,
        token: CorrelationToken,
        payload: &[u8],
    ) -> Result<(), WarroomError> {
        let reply = match self
            .dispatcher
            .dispatch(&mut self.state, actor, kind_id, token, payload)
        {
            Ok(reply) => reply,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                tracing::error!(connection = %id, %token, error = %e, "action failed after validation");
                ServerMessage::ActionReply {
                    token,
                    outcome: Err("Internal server error".into()),
                }
            }
        };
        // Peers see an action's effects before its reply.
        self.replicate_changes()?;
        self.outbox.push((id, reply));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use warroom_game::{Catalog, GameState, Ruleset, ScenarioConfig};
    use warroom_protocol::{DenialCode, SlotRequest, WireEncode};
    use warroom_session::{GatekeeperConfig, SyncState, hash_secret};
    use warroom_transport::{ChannelConnection, MemoryConnector, MemoryTransport, memory_transport};

    use super::*;
    use crate::ServerConfig;

    fn server() -> (Server<MemoryTransport>, MemoryConnector, i32) {
        let catalog = Catalog::new().unwrap();
        let type_hash = catalog.identity_hash();
        let state = GameState::new(
            Arc::clone(&catalog.entities),
            Arc::new(Ruleset::standard()),
            ScenarioConfig::default(),
        )
        .unwrap();
        let (transport, connector) = memory_transport();
        let config = ServerConfig::default().with_gatekeeper(GatekeeperConfig::default().with_secret("pw"));
        (Server::new(transport, config, catalog, state), connector, type_hash)
    }

    fn handshake(conn: &ChannelConnection, type_hash: i32, secret: &str) {
        let hs = Handshake {
            type_hash,
            secret_hash: hash_secret(secret),
            desired_slot: SlotRequest::Any,
        };
        conn.send(hs.to_bytes().unwrap()).unwrap();
    }

    fn received(conn: &mut ChannelConnection) -> Vec<ServerMessage> {
        std::iter::from_fn(|| conn.try_recv().ok().flatten())
            .map(|frame| ServerMessage::from_bytes(&frame).unwrap())
            .collect()
    }

    #[test]
    fn test_handshake_approves_into_lowest_slot() {
        let (mut server, connector, type_hash) = server();
        let mut client = connector.connect().unwrap();
        handshake(&client, type_hash, "pw");
        server.tick().unwrap();

        assert_eq!(
            received(&mut client),
            vec![ServerMessage::Approved { slot: PlayerSlot(0) }]
        );
        assert_eq!(server.gatekeeper().approved().count(), 1);
    }

    #[test]
    fn test_wrong_secret_is_denied_and_closed() {
        let (mut server, connector, type_hash) = server();
        let mut client = connector.connect().unwrap();
        handshake(&client, type_hash, "guess");
        server.tick().unwrap();

        assert_eq!(
            received(&mut client),
            vec![ServerMessage::Denied(DenialCode::WrongPassword)]
        );
        assert_eq!(server.connection_count(), 0);
        assert!(server.gatekeeper().is_empty());
    }

    #[test]
    fn test_type_mismatch_is_denied() {
        let (mut server, connector, type_hash) = server();
        let mut client = connector.connect().unwrap();
        handshake(&client, type_hash.wrapping_add(1), "pw");
        server.tick().unwrap();

        assert_eq!(
            received(&mut client),
            vec![ServerMessage::Denied(DenialCode::TypeMismatch)]
        );
    }

    #[test]
    fn test_garbled_handshake_closes_connection() {
        let (mut server, connector, _) = server();
        let client = connector.connect().unwrap();
        client.send(vec![1, 2]).unwrap();
        server.tick().unwrap();
        assert_eq!(server.connection_count(), 0);
    }

    #[test]
    fn test_approval_after_start_sends_start_and_resync() {
        let (mut server, connector, type_hash) = server();
        server.start_game().unwrap();
        let mut client = connector.connect().unwrap();
        handshake(&client, type_hash, "pw");
        server.tick().unwrap();

        let msgs = received(&mut client);
        assert_eq!(msgs[0], ServerMessage::Approved { slot: PlayerSlot(0) });
        assert_eq!(msgs[1], ServerMessage::StartGame);
        assert!(matches!(msgs[2], ServerMessage::ResyncAnnouncement { .. }));
        let id = server.gatekeeper().connection_of(PlayerSlot(0)).unwrap();
        assert_eq!(server.gatekeeper().sync_state(id), Some(SyncState::Resyncing));
    }

    #[test]
    fn test_disconnect_reclaims_slot() {
        let (mut server, connector, type_hash) = server();
        let client = connector.connect().unwrap();
        handshake(&client, type_hash, "pw");
        server.tick().unwrap();
        drop(client);
        server.tick().unwrap();

        assert_eq!(server.connection_count(), 0);
        assert_eq!(server.gatekeeper().connection_of(PlayerSlot(0)), None);
    }
}
