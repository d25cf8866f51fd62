//! Match phase state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The phase a match is in.
///
/// A round cycles through the middle phases until one faction is left:
///
/// ```text
/// Setup → GiveCommands → CommitCombats ─┬→ SelectNextCombat → Combat ─┐
///              ↑                        │          ↑                  │
///              └────────────────────────┴──────────┴──────────────────┘
///                                                          … → Finished
/// ```
///
/// - **Setup**: entities are being placed; no player actions accepted.
/// - **GiveCommands**: factions take turns moving units, spending commands.
/// - **CommitCombats**: factions take turns declaring attacks on tiles.
/// - **SelectNextCombat**: the faction on turn picks which committed combat
///   resolves next.
/// - **Combat**: the resolver is running and waits for dice decisions.
/// - **Finished**: one faction remains. Nothing more happens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GamePhase {
    #[default]
    Setup,
    GiveCommands,
    CommitCombats,
    SelectNextCombat,
    Combat,
    Finished,
}

impl GamePhase {
    const ALL: [GamePhase; 6] = [
        Self::Setup,
        Self::GiveCommands,
        Self::CommitCombats,
        Self::SelectNextCombat,
        Self::Combat,
        Self::Finished,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(b: u8) -> Option<Self> {
        Self::ALL.get(usize::from(b)).copied()
    }

    /// Returns `true` if players take turns in this phase.
    pub fn is_turn_based(&self) -> bool {
        matches!(self, Self::GiveCommands | Self::CommitCombats | Self::SelectNextCombat)
    }

    /// Returns `true` once the match has started and not yet finished.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Setup | Self::Finished)
    }

    /// Phase after the last faction ends its turn in `self`.
    ///
    /// `combats_pending` says whether any declared combat is still
    /// unresolved. Returns `None` from phases that are not left by ending
    /// turns.
    pub fn after_round(self, combats_pending: bool) -> Option<Self> {
        match self {
            Self::GiveCommands => Some(Self::CommitCombats),
            Self::CommitCombats | Self::Combat if combats_pending => Some(Self::SelectNextCombat),
            Self::CommitCombats | Self::Combat => Some(Self::GiveCommands),
            _ => None,
        }
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup => write!(f, "Setup"),
            Self::GiveCommands => write!(f, "GiveCommands"),
            Self::CommitCombats => write!(f, "CommitCombats"),
            Self::SelectNextCombat => write!(f, "SelectNextCombat"),
            Self::Combat => write!(f, "Combat"),
            Self::Finished => write!(f, "Finished"),
        }
    }
}
