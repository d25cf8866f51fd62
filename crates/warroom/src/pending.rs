//! Client-side bookkeeping of actions awaiting a server reply.

use std::collections::HashMap;
use std::fmt;

use warroom_protocol::CorrelationToken;
use warroom_tick::Countdown;

/// Why an action did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionFailure {
    /// The server validated the action and refused it.
    #[error("rejected: {0}")]
    Rejected(String),
    /// No reply arrived before the pending-action timeout.
    #[error("no reply before timeout")]
    TimedOut,
}

/// What a reply callback receives.
pub type ActionResult = Result<(), ActionFailure>;

/// Completion callback for one sent action.
pub type ReplyCallback = Box<dyn FnOnce(ActionResult) + Send>;

/// Callbacks keyed by correlation token, plus one shared timeout.
///
/// The timeout starts when the first action goes pending and stops when
/// the map empties. When it fires, every outstanding callback is called
/// with [`ActionFailure::TimedOut`] and dropped. Each callback runs exactly
/// once.
pub struct PendingActions {
    callbacks: HashMap<CorrelationToken, ReplyCallback>,
    timeout: Countdown,
}

impl PendingActions {
    pub fn new(timeout_ticks: u64) -> Self {
        Self {
            callbacks: HashMap::new(),
            timeout: Countdown::one_shot(timeout_ticks),
        }
    }

    pub fn insert(&mut self, token: CorrelationToken, callback: ReplyCallback) {
        if self.callbacks.insert(token, callback).is_some() {
            tracing::warn!(%token, "correlation token reused, previous callback dropped");
        }
        self.timeout.start_if_stopped();
    }

    /// Completes the action `token` with the server's outcome.
    ///
    /// Returns `false` for tokens with nothing pending: the reply raced a
    /// timeout, or was never ours. Those are logged, not errors.
    pub fn resolve(&mut self, token: CorrelationToken, outcome: Result<(), String>) -> bool {
        let Some(callback) = self.callbacks.remove(&token) else {
            tracing::warn!(%token, "reply for unknown correlation token");
            return false;
        };
        if self.callbacks.is_empty() {
            self.timeout.stop();
        }
        callback(outcome.map_err(ActionFailure::Rejected));
        true
    }

    /// Advances the shared timeout. Returns how many callbacks were failed.
    pub fn tick(&mut self) -> usize {
        if !self.timeout.tick() {
            return 0;
        }
        let expired: Vec<_> = self.callbacks.drain().collect();
        let count = expired.len();
        tracing::warn!(count, "pending actions timed out");
        for (_, callback) in expired {
            callback(Err(ActionFailure::TimedOut));
        }
        count
    }

    pub fn contains(&self, token: CorrelationToken) -> bool {
        self.callbacks.contains_key(&token)
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl fmt::Debug for PendingActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingActions")
            .field("pending", &self.callbacks.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}
