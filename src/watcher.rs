//! Local special-attack readout watcher.
//!
//! The host reports every change of the local readout, possibly several times
//! within one tick (an energy transfer and a spend can land together). The
//! watcher folds those into at most one outbound update per tick:
//!
//! - the latest value wins,
//! - the "used special" flag is OR-ed across every change since the last send,
//! - a net decrease between two consecutive readouts counts as a spend.
//!
//! Readouts taken during transient client states (login, loading, world hop)
//! are dropped; the client reports a fake zero there.

use tracing::trace;

use crate::{GameState, SpecialPercent};

/// What the watcher made of one raw readout.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The client was in a transient state; nothing changed.
    IgnoredTransient,
    /// The raw value was outside `0..=1000`; nothing changed.
    InvalidReadout,
    /// The value went down: the local player spent special attack energy.
    Spent {
        /// Value before the change.
        previous: SpecialPercent,
        /// Value after the change.
        current: SpecialPercent,
    },
    /// The value went up, stayed equal, or is the first readout.
    Updated {
        /// Value after the change.
        current: SpecialPercent,
    },
}

/// An update ready to be broadcast.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    /// Latest observed value.
    pub special: SpecialPercent,
    /// Whether any spend happened since the last broadcast.
    pub used_special: bool,
}

/// Tracks the local readout and decides when an update is due.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalStateWatcher {
    last_known: Option<SpecialPercent>,
    used_special: bool,
    update_due: bool,
}

impl LocalStateWatcher {
    /// Creates a watcher with no known value and nothing due.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the last known value (e.g. read once at startup) and marks an
    /// update due so the party learns it.
    pub fn prime(&mut self, initial: Option<SpecialPercent>) {
        self.last_known = initial;
        self.used_special = false;
        self.update_due = true;
    }

    /// Feeds one raw readout (tenths of a percent).
    ///
    /// # Examples
    ///
    /// ```
    /// use party_special_sync::{GameState, LocalStateWatcher, Observation, SpecialPercent};
    ///
    /// let mut watcher = LocalStateWatcher::new();
    /// watcher.prime(SpecialPercent::new(50));
    ///
    /// for raw in [400, 350, 300] {
    ///     watcher.observe(raw, GameState::LoggedIn);
    /// }
    ///
    /// let update = watcher.take_pending().unwrap();
    /// assert_eq!(update.special.get(), 30);
    /// assert!(update.used_special);
    /// assert!(watcher.take_pending().is_none());
    /// ```
    pub fn observe(&mut self, raw: i32, game_state: GameState) -> Observation {
        if game_state.is_transient() {
            trace!(raw, ?game_state, "Ignoring readout during transient game state");
            return Observation::IgnoredTransient;
        }

        let Some(current) = SpecialPercent::from_raw(raw) else {
            return Observation::InvalidReadout;
        };

        let observation = match self.last_known {
            Some(previous) if current < previous => {
                self.used_special = true;
                Observation::Spent { previous, current }
            },
            _ => Observation::Updated { current },
        };
        self.last_known = Some(current);
        self.update_due = true;
        observation
    }

    /// Requests a re-announce on the next tick without a value change (a
    /// member joined, the local identity changed, tracking was re-enabled).
    pub fn mark_due(&mut self) {
        self.update_due = true;
    }

    /// Forgets any spend seen since the last broadcast, keeping the value.
    ///
    /// Used when the pending update is discarded instead of sent, so a later
    /// announce does not present an old spend as fresh.
    pub fn clear_spend(&mut self) {
        self.used_special = false;
    }

    /// Returns `true` if an update is waiting to be sent.
    #[must_use]
    pub fn is_due(&self) -> bool {
        self.update_due
    }

    /// Last accepted value, if any.
    #[must_use]
    pub fn last_known(&self) -> Option<SpecialPercent> {
        self.last_known
    }

    /// The update that would be sent right now, without consuming it.
    #[must_use]
    pub fn pending(&self) -> Option<PendingUpdate> {
        if !self.update_due {
            return None;
        }
        self.last_known.map(|special| PendingUpdate {
            special,
            used_special: self.used_special,
        })
    }

    /// Consumes the pending update, clearing the due flag and the spend flag.
    /// Returns `None` (and keeps state untouched) if nothing is due or no
    /// value is known yet.
    pub fn take_pending(&mut self) -> Option<PendingUpdate> {
        let update = self.pending()?;
        self.update_due = false;
        self.used_special = false;
        Some(update)
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pct(value: u8) -> SpecialPercent {
        SpecialPercent::new(value).unwrap()
    }

    #[test]
    fn first_readout_is_not_a_spend() {
        let mut watcher = LocalStateWatcher::new();
        assert_eq!(
            watcher.observe(300, GameState::LoggedIn),
            Observation::Updated { current: pct(30) }
        );
        assert!(!watcher.take_pending().unwrap().used_special);
    }

    #[test]
    fn decrease_within_tick_is_reported_once() {
        let mut watcher = LocalStateWatcher::new();
        watcher.prime(Some(pct(50)));
        watcher.take_pending();

        for raw in [400, 350, 300] {
            watcher.observe(raw, GameState::LoggedIn);
        }

        assert_eq!(
            watcher.take_pending(),
            Some(PendingUpdate {
                special: pct(30),
                used_special: true
            })
        );
        assert_eq!(watcher.take_pending(), None);
    }

    #[test]
    fn gain_then_spend_in_same_tick_keeps_the_spend() {
        let mut watcher = LocalStateWatcher::new();
        watcher.prime(Some(pct(40)));
        watcher.take_pending();

        watcher.observe(1000, GameState::LoggedIn);
        watcher.observe(500, GameState::LoggedIn);

        let update = watcher.take_pending().unwrap();
        assert_eq!(update.special, pct(50));
        assert!(update.used_special);
    }

    #[test]
    fn regeneration_alone_is_not_a_spend() {
        let mut watcher = LocalStateWatcher::new();
        watcher.prime(Some(pct(40)));
        watcher.take_pending();

        watcher.observe(500, GameState::LoggedIn);

        assert!(!watcher.take_pending().unwrap().used_special);
    }

    #[test]
    fn transient_zero_is_ignored() {
        let mut watcher = LocalStateWatcher::new();
        watcher.prime(Some(pct(100)));
        watcher.take_pending();

        assert_eq!(
            watcher.observe(0, GameState::Hopping),
            Observation::IgnoredTransient
        );
        assert_eq!(watcher.last_known(), Some(pct(100)));
        assert!(!watcher.is_due());
    }

    #[test]
    fn out_of_range_readout_is_rejected() {
        let mut watcher = LocalStateWatcher::new();
        assert_eq!(
            watcher.observe(1500, GameState::LoggedIn),
            Observation::InvalidReadout
        );
        assert!(watcher.last_known().is_none());
        assert!(!watcher.is_due());
    }

    #[test]
    fn cleared_spend_keeps_the_value_due() {
        let mut watcher = LocalStateWatcher::new();
        watcher.prime(Some(pct(80)));
        watcher.take_pending();

        watcher.observe(200, GameState::LoggedIn);
        watcher.clear_spend();

        assert_eq!(
            watcher.take_pending(),
            Some(PendingUpdate {
                special: pct(20),
                used_special: false
            })
        );
    }

    #[test]
    fn due_without_value_yields_nothing() {
        let mut watcher = LocalStateWatcher::new();
        watcher.mark_due();
        assert!(watcher.is_due());
        assert!(watcher.take_pending().is_none());
        assert!(watcher.is_due(), "due flag survives until a value is known");
    }

    proptest! {
        #[test]
        fn spend_flag_matches_any_decrease(
            start in 0i32..=1000,
            samples in proptest::collection::vec(0i32..=1000, 1..10),
        ) {
            let mut watcher = LocalStateWatcher::new();
            watcher.prime(SpecialPercent::from_raw(start));
            watcher.take_pending();

            let mut previous = start / 10;
            let mut expected_spend = false;
            for raw in &samples {
                let current = raw / 10;
                expected_spend |= current < previous;
                previous = current;
                watcher.observe(*raw, GameState::LoggedIn);
            }

            let update = watcher.take_pending().unwrap();
            prop_assert_eq!(i32::from(update.special.get()), samples[samples.len() - 1] / 10);
            prop_assert_eq!(update.used_special, expected_spend);
        }
    }
}
