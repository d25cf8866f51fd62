//! Entity registry, type identity, and replication for Warroom.
//!
//! This crate is the replication core, independent of any particular
//! ruleset:
//!
//! - [`TypeRegistry`]: deterministic `kind ↔ byte` mapping plus a
//!   combined hash peers compare at handshake.
//! - [`EntityRegistry`]: fixed-capacity, id-indexed arrays of entities,
//!   one per registered kind, with structural and content hashes.
//! - [`ReplicationChannel`]: full-state and custom-update encoding, and
//!   routing of inbound updates to the right entity.
//! - [`IdPool`]: arena free list for kinds whose ids are recycled.
//!
//! A ruleset plugs in by implementing [`Kind`] for its kind enum and
//! [`EntityModel`] for its entity enum.

mod entity;
mod error;
mod hash;
mod pool;
mod registry;
mod replication;
mod types;

#[cfg(test)]
mod testing;

pub use entity::{EntityId, EntityModel, Inspection, Kind};
pub use error::WorldError;
pub use hash::StateDigest;
pub use pool::IdPool;
pub use registry::{EntityRegistry, Record};
pub use replication::{routing, AppliedUpdate, ReplicationChannel, UpdateKind};
pub use types::TypeRegistry;
