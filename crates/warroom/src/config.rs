//! Server and client settings.
//!
//! Every time-based setting counts ticks, not wall-clock time.

use serde::{Deserialize, Serialize};
use warroom_protocol::SlotRequest;
use warroom_session::GatekeeperConfig;
use warroom_tick::TickConfig;

/// Replication supervision settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Ticks between content-hash checks. Default: 300.
    pub check_interval_ticks: u64,
    /// Entities pushed per acknowledged round-trip during a resync.
    /// Default: 25.
    pub resync_batch_size: usize,
    /// Ticks a resync may take before the target goes back to the tail of
    /// the queue. Default: 900.
    pub resync_deadline_ticks: u64,
    /// Ticks a starting resync waits for the target to acknowledge traffic
    /// sent before it. Whatever is still unacknowledged afterwards counts as
    /// lost. Default: 10.
    pub resync_ack_grace_ticks: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            check_interval_ticks: 300,
            resync_batch_size: 25,
            resync_deadline_ticks: 900,
            resync_ack_grace_ticks: 10,
        }
    }
}

impl SyncConfig {
    pub fn with_check_interval(mut self, ticks: u64) -> Self {
        self.check_interval_ticks = ticks;
        self
    }

    pub fn with_batch_size(mut self, entities: usize) -> Self {
        self.resync_batch_size = entities.max(1);
        self
    }

    pub fn with_deadline(mut self, ticks: u64) -> Self {
        self.resync_deadline_ticks = ticks;
        self
    }

    pub fn with_ack_grace(mut self, ticks: u64) -> Self {
        self.resync_ack_grace_ticks = ticks;
        self
    }
}

/// Everything the authoritative server needs besides its transport and
/// game state.
///
/// ```rust
/// use warroom::{ServerConfig, SyncConfig};
///
/// let config = ServerConfig::default()
///     .with_sync(SyncConfig::default().with_check_interval(60))
///     .with_combat_decision_timeout(Some(450));
/// assert_eq!(config.sync.check_interval_ticks, 60);
/// assert_eq!(config.tick.tick_rate_hz, 30);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub tick: TickConfig,
    pub gatekeeper: GatekeeperConfig,
    pub sync: SyncConfig,
    /// Ticks a phasing faction gets to allocate its dice before the server
    /// allocates for it. `None` waits forever. Default: `None`.
    pub combat_decision_timeout_ticks: Option<u64>,
    /// Seed for the dice. `None` seeds from the OS.
    pub dice_seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick: TickConfig::default(),
            gatekeeper: GatekeeperConfig::default(),
            sync: SyncConfig::default(),
            combat_decision_timeout_ticks: None,
            dice_seed: None,
        }
    }
}

impl ServerConfig {
    pub fn with_tick(mut self, tick: TickConfig) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_gatekeeper(mut self, gatekeeper: GatekeeperConfig) -> Self {
        self.gatekeeper = gatekeeper;
        self
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_combat_decision_timeout(mut self, ticks: Option<u64>) -> Self {
        self.combat_decision_timeout_ticks = ticks;
        self
    }

    pub fn with_dice_seed(mut self, seed: u64) -> Self {
        self.dice_seed = Some(seed);
        self
    }
}

/// Client replica settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Shared secret, hashed before it goes on the wire.
    pub secret: String,
    pub desired_slot: SlotRequest,
    /// Ticks without a reply before every pending action fails.
    /// Default: 500.
    pub action_timeout_ticks: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            desired_slot: SlotRequest::Any,
            action_timeout_ticks: 500,
        }
    }
}

impl ClientConfig {
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    pub fn with_slot(mut self, slot: SlotRequest) -> Self {
        self.desired_slot = slot;
        self
    }

    pub fn with_action_timeout(mut self, ticks: u64) -> Self {
        self.action_timeout_ticks = ticks;
        self
    }
}
