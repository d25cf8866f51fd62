//! Connection gatekeeping for Warroom.
//!
//! This crate owns everything the server knows about a connection before
//! and after the game cares about it:
//!
//! 1. **Handshake**: shared-secret and type-identity checks, slot
//!    assignment ([`ConnectionGatekeeper`])
//! 2. **Slots**: which connection plays which faction, and reclaiming the
//!    slot when it drops
//! 3. **Sync state**: where each approved connection is in the
//!    replication cycle ([`SyncState`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)  ← asks who a connection is and whether it is synced
//!     ↕
//! Session Layer (this crate)  ← approves or denies peers, tracks slots
//!     ↕
//! Protocol / Transport (below)  ← Handshake, DenialCode, ConnectionId
//! ```

mod auth;
mod error;
mod gatekeeper;
mod session;

pub use auth::hash_secret;
pub use error::SessionError;
pub use gatekeeper::{ConnectionGatekeeper, HandshakeOutcome};
pub use session::{GatekeeperConfig, Session, SyncState};
