//! The traits a ruleset implements to plug into the registry.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;

use warroom_protocol::{ByteReader, ByteWriter, PlayerSlot, ProtocolError};

use crate::WorldError;

/// Index of an entity inside its kind's array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u32);

impl EntityId {
    /// Converts a wire id, rejecting negatives.
    pub fn from_wire(raw: i32) -> Option<Self> {
        u32::try_from(raw).ok().map(Self)
    }

    pub fn to_wire(self) -> i32 {
        // Capacities are bounded by i32::MAX at registration.
        self.0 as i32
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A named kind of entity or action.
///
/// The name is what [`TypeRegistry`](crate::TypeRegistry) sorts by, so
/// two peers with the same set of names derive the same byte ids.
pub trait Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    fn name(self) -> &'static str;
}

/// A field-name → value dump of one entity, for debugging and tooling.
pub type Inspection = BTreeMap<&'static str, serde_json::Value>;

/// A replicated entity.
///
/// Rulesets implement this for a closed enum over their entity structs;
/// the registry never needs to know the concrete types.
pub trait EntityModel: Sized + Send + 'static {
    type Kind: Kind;

    /// A default-constructed entity of `kind`.
    fn new(kind: Self::Kind) -> Self;

    fn kind(&self) -> Self::Kind;

    /// Writes every field `target` is allowed to see.
    ///
    /// Must be total: reading these bytes back into a fresh entity yields
    /// the state `target` should observe. Hidden fields are written as
    /// their sentinel so the bytes never leak them.
    ///
    /// # Errors
    /// [`ProtocolError::Unencodable`] when a field has outgrown its wire
    /// width. The entity cannot be replicated until it shrinks again.
    fn write_full_state(&self, target: PlayerSlot, w: &mut ByteWriter) -> Result<(), ProtocolError>;

    /// Overwrites this entity from bytes produced by
    /// [`write_full_state`](Self::write_full_state).
    fn read_full_state(&mut self, r: &mut ByteReader<'_>) -> Result<(), ProtocolError>;

    /// Applies an entity-defined delta.
    ///
    /// Kinds without a handler for `header` must return
    /// [`WorldError::NotImplemented`] rather than ignore it.
    fn apply_custom_update(&mut self, header: u8, r: &mut ByteReader<'_>) -> Result<(), WorldError> {
        let _ = r;
        Err(WorldError::NotImplemented {
            kind: self.kind().name(),
            header,
        })
    }

    fn inspect(&self) -> Inspection;
}
