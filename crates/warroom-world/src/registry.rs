//! Fixed-capacity entity arrays keyed by kind.

use std::sync::Arc;

use warroom_protocol::{ByteWriter, KindCapacity, PlayerSlot};

use crate::{EntityId, EntityModel, Kind, StateDigest, TypeRegistry, WorldError};

/// An entity in its slot, with its id and active flag.
///
/// Entities are never removed from their array. Deactivating one clears
/// `active`; it keeps its slot and its id.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<E> {
    pub id: EntityId,
    pub active: bool,
    pub entity: E,
}

/// Per-kind array. `None` means the slot was never created.
type Slots<E> = Vec<Option<Record<E>>>;

/// One replica's entities: a fixed-capacity array per registered kind.
///
/// Arrays are indexed by kind id from the shared [`TypeRegistry`], so
/// iteration is always in kind-id then entity-id order. That order is
/// what makes the structural and content hashes comparable across peers.
#[derive(Debug)]
pub struct EntityRegistry<E: EntityModel> {
    types: Arc<TypeRegistry<E::Kind>>,
    arrays: Vec<Option<Slots<E>>>,
}

impl<E: EntityModel> EntityRegistry<E> {
    /// An empty registry with no kinds registered.
    pub fn new(types: Arc<TypeRegistry<E::Kind>>) -> Self {
        let arrays = (0..types.len()).map(|_| None).collect();
        Self { types, arrays }
    }

    pub fn types(&self) -> &Arc<TypeRegistry<E::Kind>> {
        &self.types
    }

    /// Creates the array for `kind` with room for `capacity` entities.
    ///
    /// Setup-time only: capacities come from scenario data and must match
    /// on every peer before any entity traffic flows.
    ///
    /// # Errors
    /// [`WorldError::AlreadyRegistered`] on a second call for the same kind;
    /// [`WorldError::UnregisteredKind`] if the type registry lacks `kind`.
    pub fn register_kind(&mut self, kind: E::Kind, capacity: u32) -> Result<(), WorldError> {
        let id = self.types.id_of(kind)?;
        let slot = &mut self.arrays[usize::from(id)];
        if slot.is_some() {
            return Err(WorldError::AlreadyRegistered(kind.name()));
        }
        *slot = Some(empty_slots(capacity.min(i32::MAX as u32) as usize));
        tracing::debug!(kind = kind.name(), capacity, "entity kind registered");
        Ok(())
    }

    pub fn is_registered(&self, kind: E::Kind) -> bool {
        self.slots(kind).is_ok()
    }

    /// Capacity of `kind`'s array, if registered.
    pub fn capacity(&self, kind: E::Kind) -> Option<usize> {
        self.slots(kind).ok().map(Vec::len)
    }

    fn slots(&self, kind: E::Kind) -> Result<&Slots<E>, WorldError> {
        let id = self.types.id_of(kind)?;
        self.arrays[usize::from(id)]
            .as_ref()
            .ok_or(WorldError::UnregisteredKind(kind.name()))
    }

    fn slots_mut(&mut self, kind: E::Kind) -> Result<&mut Slots<E>, WorldError> {
        let id = self.types.id_of(kind)?;
        self.arrays[usize::from(id)]
            .as_mut()
            .ok_or(WorldError::UnregisteredKind(kind.name()))
    }

    pub fn get(&self, kind: E::Kind, id: EntityId) -> Option<&Record<E>> {
        self.slots(kind).ok()?.get(id.index())?.as_ref()
    }

    pub fn get_mut(&mut self, kind: E::Kind, id: EntityId) -> Option<&mut Record<E>> {
        self.slots_mut(kind).ok()?.get_mut(id.index())?.as_mut()
    }

    /// The entity at `id`, default-constructing it in place if the slot is
    /// empty. New entities start inactive.
    ///
    /// # Errors
    /// [`WorldError::IdOutOfRange`] if `id` is past the array's capacity.
    /// Capacities never change after setup, so this means the peers
    /// disagree on structure.
    pub fn get_or_create(&mut self, kind: E::Kind, id: EntityId) -> Result<&mut Record<E>, WorldError> {
        let slots = self.slots_mut(kind)?;
        let capacity = slots.len();
        let slot = slots.get_mut(id.index()).ok_or(WorldError::IdOutOfRange {
            kind: kind.name(),
            id: i64::from(id.0),
            capacity,
        })?;
        Ok(slot.get_or_insert_with(|| Record {
            id,
            active: false,
            entity: E::new(kind),
        }))
    }

    /// Creates (or overwrites) the entity at `id` and marks it active.
    pub fn spawn(&mut self, id: EntityId, entity: E) -> Result<&mut Record<E>, WorldError> {
        let record = self.get_or_create(entity.kind(), id)?;
        record.entity = entity;
        record.active = true;
        Ok(record)
    }

    /// `(kind, capacity)` for every registered kind, in kind-id order.
    pub fn capacities(&self) -> Vec<KindCapacity> {
        self.arrays
            .iter()
            .enumerate()
            .filter_map(|(i, slots)| {
                slots.as_ref().map(|s| KindCapacity {
                    kind_id: i as u8,
                    capacity: s.len() as i32,
                })
            })
            .collect()
    }

    /// Drops every array and rebuilds empty ones with the announced
    /// capacities. Records naming kinds this peer does not know are
    /// skipped; the structural hash check afterwards catches any real
    /// disagreement.
    pub fn rebuild(&mut self, capacities: &[KindCapacity]) {
        self.arrays.iter_mut().for_each(|a| *a = None);
        for entry in capacities {
            let Some(array) = self.arrays.get_mut(usize::from(entry.kind_id)) else {
                tracing::warn!(kind_id = entry.kind_id, "resync announced unknown kind");
                continue;
            };
            let capacity = usize::try_from(entry.capacity).unwrap_or(0);
            *array = Some(empty_slots(capacity));
        }
    }

    /// Hash over the registry's shape: which kinds exist and how big their
    /// arrays are. Says nothing about entity contents.
    pub fn structural_hash(&self) -> i32 {
        let mut digest = StateDigest::new();
        for entry in self.capacities() {
            digest.write_u8(entry.kind_id);
            digest.write_i32(entry.capacity);
        }
        digest.finish()
    }

    /// Hash over everything `as_player` can see.
    ///
    /// Covers every active entity's player-scoped full state, in kind-id
    /// then entity-id order. Server and client compute it identically, so
    /// equal hashes mean the client's view matches the server's.
    ///
    /// # Errors
    /// Fails only if an entity's state cannot be encoded at all.
    pub fn content_hash(&self, as_player: PlayerSlot) -> Result<i32, WorldError> {
        let mut digest = StateDigest::new();
        for (kind_id, record) in self.records() {
            if !record.active {
                continue;
            }
            let mut state = ByteWriter::new();
            record.entity.write_full_state(as_player, &mut state)?;
            digest.write_u8(kind_id);
            digest.write_i32(record.id.to_wire());
            digest.update(state.as_slice());
        }
        Ok(digest.finish())
    }

    /// Every created record, with its kind id, in kind-id then entity-id
    /// order.
    pub fn records(&self) -> impl Iterator<Item = (u8, &Record<E>)> + '_ {
        self.arrays.iter().enumerate().flat_map(|(i, slots)| {
            slots
                .iter()
                .flatten()
                .filter_map(Option::as_ref)
                .map(move |r| (i as u8, r))
        })
    }

    /// Every created record of `kind`, in id order.
    pub fn records_of(&self, kind: E::Kind) -> impl Iterator<Item = &Record<E>> + '_ {
        self.slots(kind)
            .ok()
            .into_iter()
            .flatten()
            .filter_map(Option::as_ref)
    }

    /// Mutable iteration over every created record of `kind`.
    pub fn records_of_mut(&mut self, kind: E::Kind) -> impl Iterator<Item = &mut Record<E>> + '_ {
        self.slots_mut(kind)
            .ok()
            .into_iter()
            .flatten()
            .filter_map(Option::as_mut)
    }

    /// Number of active entities across all kinds.
    pub fn active_count(&self) -> usize {
        self.records().filter(|(_, r)| r.active).count()
    }
}

fn empty_slots<E>(capacity: usize) -> Slots<E> {
    (0..capacity).map(|_| None).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestEntity, TestKind, ALL};

    fn registry() -> EntityRegistry<TestEntity> {
        let types = Arc::new(TypeRegistry::assign_ids(ALL).unwrap());
        let mut reg = EntityRegistry::new(types);
        reg.register_kind(TestKind::Card, 4).unwrap();
        reg.register_kind(TestKind::Tile, 8).unwrap();
        reg
    }

    fn entity(kind: TestKind, owner: i32, value: i32, secret: i32) -> TestEntity {
        TestEntity {
            kind,
            owner,
            value,
            secret,
        }
    }

    #[test]
    fn test_register_kind_twice_fails() {
        let mut reg = registry();
        assert!(matches!(
            reg.register_kind(TestKind::Card, 4),
            Err(WorldError::AlreadyRegistered("card"))
        ));
    }

    #[test]
    fn test_get_or_create_default_constructs_inactive() {
        let mut reg = registry();
        let rec = reg.get_or_create(TestKind::Tile, EntityId(3)).unwrap();
        assert_eq!(rec.id, EntityId(3));
        assert!(!rec.active);
        assert_eq!(rec.entity, TestEntity::new(TestKind::Tile));
    }

    #[test]
    fn test_get_or_create_returns_existing() {
        let mut reg = registry();
        reg.spawn(EntityId(1), entity(TestKind::Tile, 0, 5, 0)).unwrap();
        let rec = reg.get_or_create(TestKind::Tile, EntityId(1)).unwrap();
        assert!(rec.active);
        assert_eq!(rec.entity.value, 5);
    }

    #[test]
    fn test_get_or_create_out_of_range() {
        let mut reg = registry();
        let err = reg.get_or_create(TestKind::Card, EntityId(4)).unwrap_err();
        assert!(matches!(
            err,
            WorldError::IdOutOfRange { kind: "card", id: 4, capacity: 4 }
        ));
    }

    #[test]
    fn test_get_or_create_unregistered_kind() {
        let mut reg = registry();
        assert!(matches!(
            reg.get_or_create(TestKind::Marker, EntityId(0)),
            Err(WorldError::UnregisteredKind("marker"))
        ));
    }

    #[test]
    fn test_capacities_are_in_kind_id_order() {
        let reg = registry();
        let caps = reg.capacities();
        assert_eq!(
            caps,
            vec![
                KindCapacity { kind_id: 0, capacity: 4 },
                KindCapacity { kind_id: 2, capacity: 8 },
            ]
        );
    }

    #[test]
    fn test_structural_hash_ignores_contents() {
        let mut a = registry();
        let b = registry();
        a.spawn(EntityId(0), entity(TestKind::Card, 1, 1, 1)).unwrap();
        assert_eq!(a.structural_hash(), b.structural_hash());
    }

    #[test]
    fn test_structural_hash_tracks_capacity() {
        let a = registry();
        let types = Arc::clone(a.types());
        let mut b = EntityRegistry::<TestEntity>::new(types);
        b.register_kind(TestKind::Card, 4).unwrap();
        b.register_kind(TestKind::Tile, 9).unwrap();
        assert_ne!(a.structural_hash(), b.structural_hash());
    }

    #[test]
    fn test_rebuild_reproduces_structure_and_clears_entities() {
        let mut server = registry();
        server.spawn(EntityId(0), entity(TestKind::Card, 1, 1, 1)).unwrap();

        let mut client = EntityRegistry::<TestEntity>::new(Arc::clone(server.types()));
        client.register_kind(TestKind::Marker, 2).unwrap();
        client.spawn(EntityId(1), entity(TestKind::Marker, 0, 0, 0)).unwrap();

        client.rebuild(&server.capacities());
        assert_eq!(client.structural_hash(), server.structural_hash());
        assert_eq!(client.records().count(), 0);
        assert!(!client.is_registered(TestKind::Marker));
    }

    #[test]
    fn test_rebuild_skips_unknown_kind_ids() {
        let mut reg = registry();
        reg.rebuild(&[
            KindCapacity { kind_id: 0, capacity: 2 },
            KindCapacity { kind_id: 200, capacity: 2 },
        ]);
        assert_eq!(reg.capacities().len(), 1);
    }

    #[test]
    fn test_content_hash_is_player_scoped() {
        let mut reg = registry();
        reg.spawn(EntityId(0), entity(TestKind::Card, 1, 10, 99)).unwrap();
        let owner_view = reg.content_hash(PlayerSlot(1)).unwrap();
        let other_view = reg.content_hash(PlayerSlot(0)).unwrap();
        assert_ne!(owner_view, other_view);

        // Changing the hidden field is invisible to the non-owner.
        reg.get_mut(TestKind::Card, EntityId(0)).unwrap().entity.secret = 5;
        assert_eq!(reg.content_hash(PlayerSlot(0)).unwrap(), other_view);
        assert_ne!(reg.content_hash(PlayerSlot(1)).unwrap(), owner_view);
    }

    #[test]
    fn test_content_hash_skips_inactive() {
        let mut reg = registry();
        let empty = reg.content_hash(PlayerSlot(0)).unwrap();
        reg.spawn(EntityId(2), entity(TestKind::Tile, 0, 1, 0)).unwrap();
        assert_ne!(reg.content_hash(PlayerSlot(0)).unwrap(), empty);
        reg.get_mut(TestKind::Tile, EntityId(2)).unwrap().active = false;
        assert_eq!(reg.content_hash(PlayerSlot(0)).unwrap(), empty);
    }

    #[test]
    fn test_records_iterate_in_kind_then_id_order() {
        let mut reg = registry();
        reg.spawn(EntityId(5), entity(TestKind::Tile, 0, 0, 0)).unwrap();
        reg.spawn(EntityId(1), entity(TestKind::Tile, 0, 0, 0)).unwrap();
        reg.spawn(EntityId(3), entity(TestKind::Card, 0, 0, 0)).unwrap();
        let order: Vec<(u8, u32)> = reg.records().map(|(k, r)| (k, r.id.0)).collect();
        assert_eq!(order, vec![(0, 3), (2, 1), (2, 5)]);
        assert_eq!(reg.active_count(), 3);
    }
}
