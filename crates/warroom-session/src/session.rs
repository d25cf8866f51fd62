//! Session types: the server's record of one connection.
//!
//! A session tracks:
//! - WHICH connection it belongs to (`ConnectionId`)
//! - WHETHER the handshake approved it, and with which player slot
//! - HOW far along replication is for it (`SyncState`)

use serde::{Deserialize, Serialize};
use warroom_protocol::PlayerSlot;
use warroom_transport::ConnectionId;

use crate::hash_secret;

// ---------------------------------------------------------------------------
// GatekeeperConfig
// ---------------------------------------------------------------------------

/// Handshake settings.
///
/// ```rust
/// use warroom_session::GatekeeperConfig;
///
/// let config = GatekeeperConfig::default().with_slots(2).with_secret("hunter2");
/// assert_eq!(config.slots, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatekeeperConfig {
    /// Number of player slots. Slots are `0..slots`.
    ///
    /// Default: 4.
    pub slots: u8,

    /// The shared secret (lobby password). Empty means "no password", but
    /// clients still send the hash of the empty string.
    pub secret: String,
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            slots: 4,
            secret: String::new(),
        }
    }
}

impl GatekeeperConfig {
    pub fn with_slots(mut self, slots: u8) -> Self {
        self.slots = slots;
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    /// The hash approved peers must present.
    pub fn secret_hash(&self) -> i32 {
        hash_secret(&self.secret)
    }
}

// ---------------------------------------------------------------------------
// SyncState
// ---------------------------------------------------------------------------

/// Replication progress of an approved connection.
///
/// ```text
///   NotSynced ──(game start / approval mid-game)──→ QueuedForResync
///       QueuedForResync ──(supervisor picks it)──→ Resyncing
///       Resyncing ──(closing marker sent)──→ Synced
///       Resyncing ──(deadline)──→ QueuedForResync
///       Synced ──(content hash mismatch)──→ QueuedForResync
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// Approved, but the match has not started; nothing to replicate yet.
    #[default]
    NotSynced,
    QueuedForResync,
    Resyncing,
    Synced,
}

impl SyncState {
    /// Whether incremental updates should be sent. A connection that is
    /// about to be resynced gets everything in the resync anyway.
    pub fn receives_updates(self) -> bool {
        matches!(self, Self::Resyncing | Self::Synced)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One connection as the gatekeeper sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub connection: ConnectionId,

    /// The player slot, once the handshake approved the connection.
    /// `None` means the connection is still waiting for its handshake.
    pub slot: Option<PlayerSlot>,

    pub sync_state: SyncState,
}

impl Session {
    pub(crate) fn pending(connection: ConnectionId) -> Self {
        Self {
            connection,
            slot: None,
            sync_state: SyncState::NotSynced,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.slot.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = GatekeeperConfig::default();
        assert_eq!(config.slots, 4);
        assert_eq!(config.secret_hash(), hash_secret(""));
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: GatekeeperConfig = serde_json::from_str(r#"{"secret": "pw"}"#).unwrap();
        assert_eq!(config.slots, 4);
        assert_eq!(config.secret, "pw");
    }

    #[test]
    fn test_sync_state_receives_updates() {
        assert!(!SyncState::NotSynced.receives_updates());
        assert!(!SyncState::QueuedForResync.receives_updates());
        assert!(SyncState::Resyncing.receives_updates());
        assert!(SyncState::Synced.receives_updates());
    }

    #[test]
    fn test_pending_session_is_not_approved() {
        let session = Session::pending(ConnectionId::new(1));
        assert!(!session.is_approved());
        assert_eq!(session.sync_state, SyncState::NotSynced);
    }
}
