use std::collections::BTreeSet;

use warroom_protocol::{ByteReader, ByteWriter, ProtocolError};
use warroom_world::Inspection;

/// A player's side. Faction `n` is played by slot `n`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Faction {
    pub name: String,
    /// Commands left this round. Moving a unit spends one.
    pub commands: i16,
    /// Production points granted each round.
    pub industry: i16,
    /// Production points left this round. Every production order spends one.
    pub production: i16,
    pub techs: BTreeSet<u16>,
}

impl Faction {
    pub(super) fn write_full_state(&self, w: &mut ByteWriter) -> Result<(), ProtocolError> {
        w.write_string(&self.name)?;
        w.write_i16(self.commands);
        w.write_i16(self.industry);
        w.write_i16(self.production);
        w.write_len(self.techs.len())?;
        for tech in &self.techs {
            w.write_u16(*tech);
        }
        Ok(())
    }

    pub(super) fn read_full_state(&mut self, r: &mut ByteReader<'_>) -> Result<(), ProtocolError> {
        self.name = r.read_string()?;
        self.commands = r.read_i16()?;
        self.industry = r.read_i16()?;
        self.production = r.read_i16()?;
        let n = r.read_u16()?;
        self.techs = (0..n).map(|_| r.read_u16()).collect::<Result<_, _>>()?;
        Ok(())
    }

    pub(super) fn inspect(&self) -> Inspection {
        Inspection::from([
            ("name", self.name.clone().into()),
            ("commands", self.commands.into()),
            ("industry", self.industry.into()),
            ("production", self.production.into()),
            ("techs", self.techs.iter().copied().collect::<Vec<_>>().into()),
        ])
    }
}
