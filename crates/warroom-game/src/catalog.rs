//! The type tables every peer derives at startup.

use std::sync::Arc;

use warroom_world::{StateDigest, TypeRegistry};

use crate::actions::ActionKind;
use crate::entities::EntityKind;
use crate::GameError;

/// Entity and action type registries for this ruleset version.
///
/// Built once per process and shared by `Arc` with the server, the client
/// replica and the replication channel. Two peers with equal
/// [`identity_hash`](Self::identity_hash) agree on every kind id.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub entities: Arc<TypeRegistry<EntityKind>>,
    pub actions: Arc<TypeRegistry<ActionKind>>,
}

impl Catalog {
    pub fn new() -> Result<Self, GameError> {
        Ok(Self {
            entities: Arc::new(TypeRegistry::assign_ids(EntityKind::ALL)?),
            actions: Arc::new(TypeRegistry::assign_ids(ActionKind::ALL)?),
        })
    }

    /// The type hash sent in the handshake.
    pub fn identity_hash(&self) -> i32 {
        let mut digest = StateDigest::new();
        digest.write_i32(self.entities.combined_hash());
        digest.write_i32(self.actions.combined_hash());
        digest.finish()
    }
}
