//! Deterministic kind ↔ byte id mapping.

use std::collections::HashMap;

use crate::{Kind, StateDigest, WorldError};

/// Bidirectional mapping between kinds and compact byte ids.
///
/// Ids are assigned by sorting kind names lexicographically, so every
/// peer built from the same kind set derives the same table without ever
/// sending it. The combined hash lets the handshake detect peers built
/// from a different set.
///
/// Built once at startup and shared by reference (usually behind an
/// `Arc`) with everything that encodes or decodes kinds.
#[derive(Debug, Clone)]
pub struct TypeRegistry<K: Kind> {
    kinds: Vec<K>,
    ids: HashMap<K, u8>,
    combined_hash: i32,
}

impl<K: Kind> TypeRegistry<K> {
    /// Assigns ids to `kinds` in canonical name order.
    ///
    /// Input order and duplicates do not affect the result.
    ///
    /// # Errors
    /// [`WorldError::TooManyKinds`] if more than 256 distinct kinds are given.
    pub fn assign_ids(kinds: impl IntoIterator<Item = K>) -> Result<Self, WorldError> {
        let mut kinds: Vec<K> = kinds.into_iter().collect();
        kinds.sort_by(|a, b| a.name().cmp(b.name()));
        kinds.dedup();

        if kinds.len() > usize::from(u8::MAX) + 1 {
            return Err(WorldError::TooManyKinds(kinds.len()));
        }

        let mut digest = StateDigest::new();
        let mut ids = HashMap::with_capacity(kinds.len());
        for (i, kind) in kinds.iter().enumerate() {
            // Bounded by the check above.
            ids.insert(*kind, i as u8);
            digest.update(kind.name().as_bytes());
            digest.write_u8(0);
        }

        Ok(Self {
            kinds,
            ids,
            combined_hash: digest.finish(),
        })
    }

    /// The byte id of `kind`.
    ///
    /// # Errors
    /// [`WorldError::UnregisteredKind`] if `kind` was not in the input set.
    pub fn id_of(&self, kind: K) -> Result<u8, WorldError> {
        self.ids
            .get(&kind)
            .copied()
            .ok_or(WorldError::UnregisteredKind(kind.name()))
    }

    /// The kind with byte id `id`.
    ///
    /// # Errors
    /// [`WorldError::UnknownType`] for ids this peer does not know. Callers
    /// drop the offending update and keep the connection.
    pub fn kind_of(&self, id: u8) -> Result<K, WorldError> {
        self.kinds
            .get(usize::from(id))
            .copied()
            .ok_or(WorldError::UnknownType(id))
    }

    /// Hash of the canonical kind-name list.
    pub fn combined_hash(&self) -> i32 {
        self.combined_hash
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// `(id, kind)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, K)> + '_ {
        self.kinds.iter().enumerate().map(|(i, k)| (i as u8, *k))
    }
}
