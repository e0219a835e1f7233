//! Per-member "ticks since last spend" countdown.
//!
//! The countdown is driven only by two things: an explicit spend starts it at
//! zero, and each host tick advances it until it passes the display threshold.
//! Energy regeneration never touches it.

use serde::{Deserialize, Serialize};

/// Drain countdown state for one member.
///
/// # Examples
///
/// ```
/// use party_special_sync::DrainState;
///
/// let mut drain = DrainState::NotTracking;
/// drain.start();
/// assert_eq!(drain.ticks_elapsed(), Some(0));
///
/// // With a threshold of 2 the indicator survives two ticks...
/// drain.advance(2);
/// drain.advance(2);
/// assert_eq!(drain, DrainState::TrackingDrain { ticks_elapsed: 2 });
///
/// // ...and hides on the third.
/// assert_eq!(drain.advance(2), DrainState::NotTracking);
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DrainState {
    /// No recent spend; the indicator is hidden.
    #[default]
    NotTracking,
    /// The member spent energy `ticks_elapsed` ticks ago.
    TrackingDrain {
        /// Ticks since the spend was applied.
        ticks_elapsed: u32,
    },
}

impl DrainState {
    /// (Re)starts the countdown at zero, overriding any running one.
    #[inline]
    pub fn start(&mut self) {
        *self = DrainState::TrackingDrain { ticks_elapsed: 0 };
    }

    /// Advances a running countdown by one tick. Once the elapsed count
    /// exceeds `display_threshold` the countdown stops. Returns the new state.
    pub fn advance(&mut self, display_threshold: u32) -> DrainState {
        if let DrainState::TrackingDrain { ticks_elapsed } = *self {
            let next = ticks_elapsed.saturating_add(1);
            *self = if next > display_threshold {
                DrainState::NotTracking
            } else {
                DrainState::TrackingDrain {
                    ticks_elapsed: next,
                }
            };
        }
        *self
    }

    /// Ticks since the spend, or `None` when not tracking.
    #[inline]
    #[must_use]
    pub const fn ticks_elapsed(self) -> Option<u32> {
        match self {
            DrainState::NotTracking => None,
            DrainState::TrackingDrain { ticks_elapsed } => Some(ticks_elapsed),
        }
    }

    /// Returns `true` while the countdown is running.
    #[inline]
    #[must_use]
    pub const fn is_tracking(self) -> bool {
        matches!(self, DrainState::TrackingDrain { .. })
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

    #[test]
    fn advance_on_idle_state_is_noop() {
        let mut drain = DrainState::NotTracking;
        assert_eq!(drain.advance(5), DrainState::NotTracking);
    }

    #[test]
    fn start_overrides_running_countdown() {
        let mut drain = DrainState::TrackingDrain { ticks_elapsed: 7 };
        drain.start();
        assert_eq!(drain.ticks_elapsed(), Some(0));
    }

    #[test]
    fn zero_threshold_hides_after_first_tick() {
        let mut drain = DrainState::NotTracking;
        drain.start();
        assert_eq!(drain.advance(0), DrainState::NotTracking);
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let mut drain = DrainState::TrackingDrain {
            ticks_elapsed: u32::MAX,
        };
        assert_eq!(
            drain.advance(u32::MAX),
            DrainState::TrackingDrain {
                ticks_elapsed: u32::MAX
            }
        );
    }

    proptest! {
        #[test]
        fn survives_exactly_threshold_ticks(threshold in 0u32..200) {
            let mut drain = DrainState::NotTracking;
            drain.start();
            for _ in 0..threshold {
                drain.advance(threshold);
            }
            prop_assert_eq!(drain, DrainState::TrackingDrain { ticks_elapsed: threshold });
            prop_assert_eq!(drain.advance(threshold), DrainState::NotTracking);
        }
    }
}
