//! Encoding and routing of registry-targeted updates.
//!
//! Every update names its target and then says what kind of payload
//! follows:
//!
//! ```text
//! [entity_kind_id: u8][entity_id: i32][routing: u8][payload...]
//!
//! routing 0 (FullState):    [active: u8][kind-specific full state]
//! routing 1 (CustomUpdate): [sub_header: u8][kind-specific delta]
//! ```

use std::sync::Arc;

use warroom_protocol::{ByteReader, ByteWriter, PlayerSlot};

use crate::{EntityId, EntityModel, EntityRegistry, Kind, Record, TypeRegistry, WorldError};

/// Routing header values.
pub mod routing {
    pub const FULL_STATE: u8 = 0;
    pub const CUSTOM_UPDATE: u8 = 1;
}

/// What an inbound update did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    FullState,
    Custom(u8),
}

/// The entity an inbound update landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedUpdate<K> {
    pub kind: K,
    pub id: EntityId,
    pub update: UpdateKind,
}

/// Serializes outbound updates and routes inbound ones.
#[derive(Debug, Clone)]
pub struct ReplicationChannel<K: Kind> {
    types: Arc<TypeRegistry<K>>,
}

impl<K: Kind> ReplicationChannel<K> {
    pub fn new(types: Arc<TypeRegistry<K>>) -> Self {
        Self { types }
    }

    fn write_target(&self, w: &mut ByteWriter, kind: K, id: EntityId) -> Result<(), WorldError> {
        w.write_u8(self.types.id_of(kind)?);
        w.write_i32(id.to_wire());
        Ok(())
    }

    /// `record`'s full state as `target` is allowed to see it.
    pub fn encode_full_state<E>(&self, record: &Record<E>, target: PlayerSlot) -> Result<Vec<u8>, WorldError>
    where
        E: EntityModel<Kind = K>,
    {
        let mut w = ByteWriter::new();
        self.write_target(&mut w, record.entity.kind(), record.id)?;
        w.write_u8(routing::FULL_STATE);
        w.write_bool(record.active);
        record.entity.write_full_state(target, &mut w)?;
        Ok(w.into_inner())
    }

    /// A custom update carrying an already-encoded delta.
    pub fn encode_custom_update(
        &self,
        kind: K,
        id: EntityId,
        sub_header: u8,
        payload: &[u8],
    ) -> Result<Vec<u8>, WorldError> {
        let mut w = ByteWriter::new();
        self.write_target(&mut w, kind, id)?;
        w.write_u8(routing::CUSTOM_UPDATE);
        w.write_u8(sub_header);
        w.write_bytes(payload);
        Ok(w.into_inner())
    }

    /// Applies one inbound update to `registry`, creating the target entity
    /// if its slot is empty.
    ///
    /// # Errors
    /// - [`WorldError::UnknownType`]: unrecognized kind id; drop the update.
    /// - [`WorldError::NotImplemented`]: the entity has no handler for the
    ///   custom sub-header; drop the update, but it is a bug.
    /// - anything else is protocol-fatal.
    pub fn apply<E>(&self, registry: &mut EntityRegistry<E>, bytes: &[u8]) -> Result<AppliedUpdate<K>, WorldError>
    where
        E: EntityModel<Kind = K>,
    {
        let mut r = ByteReader::new(bytes);
        let kind = self.types.kind_of(r.read_u8()?)?;
        let raw_id = r.read_i32()?;
        let id = EntityId::from_wire(raw_id).ok_or(WorldError::IdOutOfRange {
            kind: kind.name(),
            id: i64::from(raw_id),
            capacity: registry.capacity(kind).unwrap_or(0),
        })?;
        let record = registry.get_or_create(kind, id)?;

        let update = match r.read_u8()? {
            routing::FULL_STATE => {
                record.active = r.read_bool()?;
                record.entity.read_full_state(&mut r)?;
                UpdateKind::FullState
            }
            routing::CUSTOM_UPDATE => {
                let sub_header = r.read_u8()?;
                record.entity.apply_custom_update(sub_header, &mut r)?;
                UpdateKind::Custom(sub_header)
            }
            other => return Err(WorldError::UnknownRouting(other)),
        };

        tracing::trace!(kind = kind.name(), %id, ?update, "update applied");
        Ok(AppliedUpdate { kind, id, update })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestEntity, TestKind, ALL, SHIFT};

    fn setup() -> (ReplicationChannel<TestKind>, EntityRegistry<TestEntity>, EntityRegistry<TestEntity>) {
        let types = Arc::new(TypeRegistry::assign_ids(ALL).unwrap());
        let mut server = EntityRegistry::new(Arc::clone(&types));
        let mut client = EntityRegistry::new(Arc::clone(&types));
        for reg in [&mut server, &mut client] {
            reg.register_kind(TestKind::Card, 4).unwrap();
            reg.register_kind(TestKind::Marker, 4).unwrap();
        }
        (ReplicationChannel::new(types), server, client)
    }

    #[test]
    fn test_full_state_layout() {
        let (chan, mut server, _) = setup();
        let rec = server
            .spawn(
                EntityId(2),
                TestEntity {
                    kind: TestKind::Marker,
                    owner: 0,
                    value: 1,
                    secret: 0,
                },
            )
            .unwrap()
            .clone();
        let bytes = chan.encode_full_state(&rec, PlayerSlot(1)).unwrap();
        // kind id 1 (marker), id 2, FullState, active
        assert_eq!(&bytes[..7], &[1, 2, 0, 0, 0, routing::FULL_STATE, 1]);
    }

    #[test]
    fn test_full_state_reconstructs_for_permitted_viewer() {
        let (chan, mut server, mut client) = setup();
        let card = TestEntity {
            kind: TestKind::Card,
            owner: 1,
            value: 7,
            secret: 42,
        };
        server.spawn(EntityId(0), card.clone()).unwrap();

        let rec = server.get(TestKind::Card, EntityId(0)).unwrap();
        let bytes = chan.encode_full_state(rec, PlayerSlot(1)).unwrap();
        let applied = chan.apply(&mut client, &bytes).unwrap();

        assert_eq!(applied.update, UpdateKind::FullState);
        let got = client.get(TestKind::Card, EntityId(0)).unwrap();
        assert!(got.active);
        assert_eq!(got.entity, card);
        assert_eq!(
            client.content_hash(PlayerSlot(1)).unwrap(),
            server.content_hash(PlayerSlot(1)).unwrap()
        );
    }

    #[test]
    fn test_full_state_hides_fields_from_other_viewers() {
        let (chan, mut server, mut client) = setup();
        server
            .spawn(
                EntityId(0),
                TestEntity {
                    kind: TestKind::Card,
                    owner: 1,
                    value: 7,
                    secret: 42,
                },
            )
            .unwrap();

        let rec = server.get(TestKind::Card, EntityId(0)).unwrap();
        let bytes = chan.encode_full_state(rec, PlayerSlot(0)).unwrap();
        chan.apply(&mut client, &bytes).unwrap();

        assert_eq!(client.get(TestKind::Card, EntityId(0)).unwrap().entity.secret, 0);
        assert_eq!(
            client.content_hash(PlayerSlot(0)).unwrap(),
            server.content_hash(PlayerSlot(0)).unwrap()
        );
    }

    #[test]
    fn test_custom_update_routes_to_entity() {
        let (chan, _, mut client) = setup();
        let mut payload = ByteWriter::new();
        payload.write_i32(5);
        let bytes = chan
            .encode_custom_update(TestKind::Marker, EntityId(3), SHIFT, payload.as_slice())
            .unwrap();
        let applied = chan.apply(&mut client, &bytes).unwrap();
        assert_eq!(applied.update, UpdateKind::Custom(SHIFT));
        assert_eq!(client.get(TestKind::Marker, EntityId(3)).unwrap().entity.value, 5);
    }

    #[test]
    fn test_unimplemented_custom_update_fails_loudly() {
        let (chan, _, mut client) = setup();
        let bytes = chan
            .encode_custom_update(TestKind::Card, EntityId(0), 9, &[])
            .unwrap();
        let err = chan.apply(&mut client, &bytes).unwrap_err();
        assert!(matches!(err, WorldError::NotImplemented { kind: "card", header: 9 }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_unknown_kind_id_is_harmless() {
        let (chan, _, mut client) = setup();
        let err = chan.apply(&mut client, &[77, 0, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, WorldError::UnknownType(77)));
        assert!(!err.is_fatal());
        assert_eq!(client.records().count(), 0);
    }

    #[test]
    fn test_negative_id_is_fatal() {
        let (chan, _, mut client) = setup();
        let err = chan
            .apply(&mut client, &[0, 0xFF, 0xFF, 0xFF, 0xFF, 0, 1])
            .unwrap_err();
        assert!(matches!(err, WorldError::IdOutOfRange { id: -1, .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unknown_routing_is_fatal() {
        let (chan, _, mut client) = setup();
        let err = chan.apply(&mut client, &[0, 0, 0, 0, 0, 9]).unwrap_err();
        assert!(matches!(err, WorldError::UnknownRouting(9)));
    }

    #[test]
    fn test_truncated_full_state_is_fatal() {
        let (chan, _, mut client) = setup();
        let err = chan
            .apply(&mut client, &[0, 0, 0, 0, 0, routing::FULL_STATE, 1, 3])
            .unwrap_err();
        assert!(matches!(err, WorldError::Protocol(_)));
        assert!(err.is_fatal());
    }
}
