//! Tick-counted timers.

/// A timer measured in ticks rather than wall-clock time.
///
/// Everything time-based in the protocol (sync-check cadence, action reply
/// timeout, resync deadline, combat decision timeout) counts ticks, so it
/// behaves the same at any tick rate and in tests that drive ticks by hand.
///
/// ```rust
/// use warroom_tick::Countdown;
///
/// let mut every_third = Countdown::repeating(3);
/// let fired: Vec<bool> = (0..6).map(|_| every_third.tick()).collect();
/// assert_eq!(fired, [false, false, true, false, false, true]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    period: u64,
    remaining: Option<u64>,
    repeat: bool,
}

impl Countdown {
    /// A stopped timer that fires once, `period` ticks after
    /// [`start`](Self::start).
    pub fn one_shot(period: u64) -> Self {
        Self {
            period: period.max(1),
            remaining: None,
            repeat: false,
        }
    }

    /// A running timer that fires every `period` ticks.
    pub fn repeating(period: u64) -> Self {
        let period = period.max(1);
        Self {
            period,
            remaining: Some(period),
            repeat: true,
        }
    }

    /// (Re)arms the timer for a full period.
    pub fn start(&mut self) {
        self.remaining = Some(self.period);
    }

    /// Arms the timer unless it is already running.
    pub fn start_if_stopped(&mut self) {
        if self.remaining.is_none() {
            self.start();
        }
    }

    pub fn stop(&mut self) {
        self.remaining = None;
    }

    pub fn is_running(&self) -> bool {
        self.remaining.is_some()
    }

    /// Ticks left before the timer fires, if running.
    pub fn remaining(&self) -> Option<u64> {
        self.remaining
    }

    pub fn period(&self) -> u64 {
        self.period
    }

    /// Advances one tick. Returns `true` on the tick the timer fires.
    ///
    /// A one-shot timer stops after firing; a repeating one re-arms.
    pub fn tick(&mut self) -> bool {
        let Some(remaining) = self.remaining.as_mut() else {
            return false;
        };
        *remaining -= 1;
        if *remaining > 0 {
            return false;
        }
        self.remaining = self.repeat.then_some(self.period);
        true
    }
}
