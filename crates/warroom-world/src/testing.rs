//! Minimal ruleset used by this crate's unit tests.

use warroom_protocol::{ByteReader, ByteWriter, PlayerSlot, ProtocolError};

use crate::{EntityModel, Inspection, Kind, WorldError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestKind {
    Card,
    Marker,
    Tile,
}

impl Kind for TestKind {
    fn name(self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Marker => "marker",
            Self::Tile => "tile",
        }
    }
}

pub const ALL: [TestKind; 3] = [TestKind::Card, TestKind::Marker, TestKind::Tile];

/// `secret` is only visible to the owner slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestEntity {
    pub kind: TestKind,
    pub owner: i32,
    pub value: i32,
    pub secret: i32,
}

pub const SHIFT: u8 = 0;

impl EntityModel for TestEntity {
    type Kind = TestKind;

    fn new(kind: TestKind) -> Self {
        Self {
            kind,
            owner: -1,
            value: 0,
            secret: 0,
        }
    }

    fn kind(&self) -> TestKind {
        self.kind
    }

    fn write_full_state(&self, target: PlayerSlot, w: &mut ByteWriter) -> Result<(), ProtocolError> {
        w.write_i32(self.owner);
        w.write_i32(self.value);
        if self.owner == target.as_i32() {
            w.write_i32(self.secret);
        } else {
            w.write_i32(0);
        }
        Ok(())
    }

    fn read_full_state(&mut self, r: &mut ByteReader<'_>) -> Result<(), ProtocolError> {
        self.owner = r.read_i32()?;
        self.value = r.read_i32()?;
        self.secret = r.read_i32()?;
        Ok(())
    }

    fn apply_custom_update(&mut self, header: u8, r: &mut ByteReader<'_>) -> Result<(), WorldError> {
        match (self.kind, header) {
            (TestKind::Marker, SHIFT) => {
                self.value += r.read_i32()?;
                Ok(())
            }
            _ => Err(WorldError::NotImplemented {
                kind: self.kind.name(),
                header,
            }),
        }
    }

    fn inspect(&self) -> Inspection {
        Inspection::from([
            ("owner", self.owner.into()),
            ("value", self.value.into()),
            ("secret", self.secret.into()),
        ])
    }
}
