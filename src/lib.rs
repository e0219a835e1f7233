//! # Party Special Sync
//!
//! Party Special Sync keeps a shared, eventually-consistent view of every party
//! member's special-attack energy and the number of game ticks since they last
//! spent it. There is no server: each client watches its own readout, broadcasts
//! a small update to the party once per tick at most, and applies the updates it
//! hears from everyone else.
//!
//! The host game client is treated as an event source. Instead of registering
//! callbacks, the host turns its notifications into [`HostEvent`]s and feeds
//! them to [`PartyTracker::handle`]. Messages arriving on the transport's own
//! thread go through a [`PeerReceiver`], which shares the tracker's
//! [`MemberRegistry`].
//!
//! ```
//! use party_special_sync::prelude::*;
//!
//! struct Host;
//!
//! impl HostContext for Host {
//!     fn local_player_name(&self) -> Option<String> { Some("Alice".to_owned()) }
//!     fn local_member_id(&self) -> Option<MemberId> { Some(MemberId::new(1)) }
//!     fn member_display_name(&self, id: MemberId) -> Option<String> {
//!         (id == MemberId::new(1)).then(|| "Alice".to_owned())
//!     }
//! }
//!
//! #[derive(Default)]
//! struct Outbox(Vec<PartyMessage>);
//!
//! impl PartyTransport for Outbox {
//!     fn broadcast(&mut self, msg: &PartyMessage) {
//!         self.0.push(*msg);
//!     }
//! }
//!
//! let mut tracker = TrackerBuilder::new().start_tracker(Host, Outbox::default())?;
//! tracker.start(Some(1000));
//! tracker.handle(HostEvent::SpecialChanged { raw: 500, game_state: GameState::LoggedIn });
//! let sent = tracker.handle(HostEvent::Tick);
//!
//! assert!(matches!(sent, Some(PartyMessage::StateUpdate(update)) if update.used_special));
//! # Ok::<(), SyncError>(())
//! ```

#![forbid(unsafe_code)] // let us try
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use error::SyncError;
pub use member::{Member, MemberName};
pub use drain_timer::DrainState;
pub use network::messages::{PartyMessage, StateUpdate, StopTracking};
pub use overlay::{LabelStyle, OverlayLabel, OverlayView};
pub use sessions::builder::TrackerBuilder;
pub use sessions::config::{parse_player_list, RenderPolicy, TrackerConfig};
pub use sessions::lifecycle::{MembershipController, MembershipEffect, MembershipEvent};
pub use sessions::member_registry::{MemberRegistry, RegistrySnapshot};
pub use sessions::party_tracker::PartyTracker;
pub use sessions::receiver::{PeerReceiver, ReceiveOutcome};
pub use watcher::{LocalStateWatcher, Observation, PendingUpdate};

#[cfg(feature = "tokio")]
pub use network::broadcast_transport::BroadcastTransport;

pub mod drain_timer;
pub mod error;
pub mod member;
pub mod overlay;
pub mod prelude;
pub(crate) mod sync;
pub mod telemetry;
pub mod watcher;

/// Tracker construction, configuration, and the two entry points that mutate
/// the registry (tick path and receive path).
pub mod sessions {
    pub mod builder;
    pub mod config;
    pub mod lifecycle;
    pub mod member_registry;
    pub mod party_tracker;
    pub mod receiver;
}

/// Party message shapes and their byte encoding.
pub mod network {
    #[cfg(feature = "tokio")]
    pub mod broadcast_transport;
    /// Binary codec for party message serialization.
    ///
    /// Transports that carry bytes use this to turn [`PartyMessage`]s into
    /// frames and back.
    ///
    /// [`PartyMessage`]: crate::PartyMessage
    pub mod codec;
    pub mod messages;
}

// #############
// #  TYPES    #
// #############

/// Identifier the party transport assigns to a participant.
///
/// Ids are unique among the current party members but are not stable: the
/// same player may rejoin under a different id, which is why the registry is
/// keyed by [`MemberName`] and re-stamps the id on every update.
///
/// # Examples
///
/// ```
/// use party_special_sync::MemberId;
///
/// let id = MemberId::new(7);
/// assert_eq!(id.as_u64(), 7);
/// assert_eq!(id.to_string(), "7");
/// ```
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct MemberId(u64);

impl MemberId {
    /// Creates a new `MemberId` from a `u64` value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        MemberId(id)
    }

    /// Returns the underlying `u64` value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MemberId {
    #[inline]
    fn from(value: u64) -> Self {
        MemberId(value)
    }
}

/// Special-attack energy as a whole percentage, always within `0..=100`.
///
/// The only way to build one is through a checked constructor, so a live
/// registry entry can never hold a negative or overflowing value.
///
/// # Examples
///
/// ```
/// use party_special_sync::SpecialPercent;
///
/// assert_eq!(SpecialPercent::new(55).map(SpecialPercent::get), Some(55));
/// assert!(SpecialPercent::new(101).is_none());
///
/// // The host reports energy in tenths of a percent.
/// assert_eq!(SpecialPercent::from_raw(1000), Some(SpecialPercent::FULL));
/// assert_eq!(SpecialPercent::from_raw(255).map(SpecialPercent::get), Some(25));
/// assert!(SpecialPercent::from_raw(-10).is_none());
/// ```
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct SpecialPercent(u8);

impl SpecialPercent {
    /// No energy.
    pub const EMPTY: SpecialPercent = SpecialPercent(0);
    /// Full energy.
    pub const FULL: SpecialPercent = SpecialPercent(100);
    /// Largest raw readout the host reports (tenths of a percent).
    pub const MAX_RAW: i32 = 1000;

    /// Creates a percentage, or `None` if `value > 100`.
    #[inline]
    #[must_use]
    pub const fn new(value: u8) -> Option<Self> {
        if value <= 100 {
            Some(SpecialPercent(value))
        } else {
            None
        }
    }

    /// Converts the host's raw readout (tenths of a percent, `0..=1000`)
    /// into a whole percentage, rounding down.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: i32) -> Option<Self> {
        if raw < 0 || raw > Self::MAX_RAW {
            None
        } else {
            Some(SpecialPercent((raw / 10) as u8))
        }
    }

    /// Returns the percentage as a `u8`.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for SpecialPercent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for SpecialPercent {
    type Error = SyncError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        SpecialPercent::new(value).ok_or(SyncError::InvalidSpecialValue {
            raw: i64::from(value),
        })
    }
}

impl From<SpecialPercent> for u8 {
    #[inline]
    fn from(value: SpecialPercent) -> Self {
        value.0
    }
}

/// What a member reports about their energy: a value, or that they stopped
/// reporting altogether.
///
/// Older clients signalled "stop tracking me" by sending an impossible
/// `-1`. [`SpecialReading::from_legacy`] is the single place that sentinel is
/// understood; everything past it works with this enum.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SpecialReading {
    /// The member is reporting this value.
    Tracking(SpecialPercent),
    /// The member asked to be removed from everyone's overlay.
    NotTracking,
}

impl SpecialReading {
    /// Interprets a legacy integer value: negative means [`NotTracking`],
    /// `0..=100` is a value, anything larger is rejected.
    ///
    /// ```
    /// use party_special_sync::{SpecialPercent, SpecialReading};
    ///
    /// assert_eq!(SpecialReading::from_legacy(-1), Ok(SpecialReading::NotTracking));
    /// assert_eq!(
    ///     SpecialReading::from_legacy(40),
    ///     Ok(SpecialReading::Tracking(SpecialPercent::new(40).unwrap()))
    /// );
    /// assert!(SpecialReading::from_legacy(250).is_err());
    /// ```
    ///
    /// [`NotTracking`]: SpecialReading::NotTracking
    pub fn from_legacy(value: i32) -> Result<Self, SyncError> {
        if value < 0 {
            return Ok(SpecialReading::NotTracking);
        }
        u8::try_from(value)
            .ok()
            .and_then(SpecialPercent::new)
            .map(SpecialReading::Tracking)
            .ok_or(SyncError::InvalidSpecialValue {
                raw: i64::from(value),
            })
    }

    /// Returns the reported percentage, if any.
    #[inline]
    #[must_use]
    pub const fn percent(self) -> Option<SpecialPercent> {
        match self {
            SpecialReading::Tracking(value) => Some(value),
            SpecialReading::NotTracking => None,
        }
    }
}

// #############
// #   ENUMS   #
// #############

/// Lifecycle state of the host game client.
///
/// While logging in, loading or hopping worlds the client briefly reports an
/// energy of zero. Readouts taken in any state other than [`LoggedIn`] are
/// ignored by the [`LocalStateWatcher`].
///
/// [`LoggedIn`]: GameState::LoggedIn
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameState {
    /// Sitting at the login screen.
    LoginScreen,
    /// Credentials accepted, world not yet entered.
    LoggingIn,
    /// Loading a new region.
    Loading,
    /// Moving to another world.
    Hopping,
    /// Connection to the game server was lost.
    ConnectionLost,
    /// In game; readouts are real.
    LoggedIn,
}

impl GameState {
    /// Returns `true` for states whose readouts must not be trusted.
    #[inline]
    #[must_use]
    pub const fn is_transient(self) -> bool {
        !matches!(self, GameState::LoggedIn)
    }
}

/// Notifications from the host, delivered one at a time to
/// [`PartyTracker::handle`].
///
/// The host serializes these on its own thread; the tracker never sees two at
/// once. Peer messages do not travel through here; they go to a
/// [`PeerReceiver`].
///
/// # Forward Compatibility
///
/// This enum is marked `#[non_exhaustive]`. Always include a wildcard arm when
/// matching.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HostEvent {
    /// One fixed game cycle elapsed.
    Tick,
    /// The local special-attack readout changed.
    SpecialChanged {
        /// New readout in tenths of a percent (`0..=1000`).
        raw: i32,
        /// Client state at the moment of the change.
        game_state: GameState,
    },
    /// The local client joined, left, or switched party.
    PartyChanged,
    /// A member joined the current party.
    MemberJoined(MemberId),
    /// A member left the current party.
    MemberLeft(MemberId),
    /// The local player's identity or profile changed.
    ProfileChanged,
    /// The user edited the tracker settings.
    ConfigChanged(TrackerConfig),
}

// #############
// #  TRAITS   #
// #############

/// Read access to the host client's view of the local player and the party
/// roster.
///
/// Implementations are consulted from the tick path and, through
/// [`PeerReceiver`], from the transport's receive thread.
pub trait HostContext {
    /// The local player's display name as the game shows it (unsanitized), or
    /// `None` while not logged in.
    fn local_player_name(&self) -> Option<String>;

    /// The local party member id, or `None` when not in a party or the local
    /// member has not been assigned yet.
    fn local_member_id(&self) -> Option<MemberId>;

    /// Resolves a member id to the display name the party roster currently
    /// shows. `None` means the roster has not caught up yet.
    fn member_display_name(&self, id: MemberId) -> Option<String>;
}

impl<H: HostContext + ?Sized> HostContext for &H {
    fn local_player_name(&self) -> Option<String> {
        (**self).local_player_name()
    }

    fn local_member_id(&self) -> Option<MemberId> {
        (**self).local_member_id()
    }

    fn member_display_name(&self, id: MemberId) -> Option<String> {
        (**self).member_display_name(id)
    }
}

impl<H: HostContext + ?Sized> HostContext for Arc<H> {
    fn local_player_name(&self) -> Option<String> {
        (**self).local_player_name()
    }

    fn local_member_id(&self) -> Option<MemberId> {
        (**self).local_member_id()
    }

    fn member_display_name(&self, id: MemberId) -> Option<String> {
        (**self).member_display_name(id)
    }
}

/// The party messaging channel.
///
/// Messages are broadcast to every current party member, fire-and-forget: no
/// acknowledgement, ordering, or delivery guarantee is expected. The protocol
/// recovers from loss on the next update or join-triggered announce.
pub trait PartyTransport {
    /// Sends `msg` to every current party member.
    fn broadcast(&mut self, msg: &PartyMessage);
}

impl<T: PartyTransport + ?Sized> PartyTransport for &mut T {
    fn broadcast(&mut self, msg: &PartyMessage) {
        (**self).broadcast(msg);
    }
}

// ###################
// # UNIT TESTS      #
// ###################

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn special_percent_rejects_values_above_hundred() {
        assert!(SpecialPercent::new(100).is_some());
        assert!(SpecialPercent::new(101).is_none());
        assert!(SpecialPercent::try_from(200_u8).is_err());
    }

    #[test]
    fn special_percent_from_raw_rounds_down() {
        assert_eq!(SpecialPercent::from_raw(0), Some(SpecialPercent::EMPTY));
        assert_eq!(SpecialPercent::from_raw(9).unwrap().get(), 0);
        assert_eq!(SpecialPercent::from_raw(999).unwrap().get(), 99);
        assert_eq!(SpecialPercent::from_raw(1000), Some(SpecialPercent::FULL));
        assert!(SpecialPercent::from_raw(1001).is_none());
        assert!(SpecialPercent::from_raw(-1).is_none());
    }

    #[test]
    fn legacy_sentinel_means_not_tracking() {
        assert_eq!(
            SpecialReading::from_legacy(-1).unwrap(),
            SpecialReading::NotTracking
        );
        assert_eq!(
            SpecialReading::from_legacy(i32::MIN).unwrap(),
            SpecialReading::NotTracking
        );
        assert_eq!(SpecialReading::NotTracking.percent(), None);
    }

    #[test]
    fn legacy_overflow_is_rejected() {
        assert_eq!(
            SpecialReading::from_legacy(300),
            Err(SyncError::InvalidSpecialValue { raw: 300 })
        );
    }

    #[test]
    fn only_logged_in_is_stable() {
        for state in [
            GameState::LoginScreen,
            GameState::LoggingIn,
            GameState::Loading,
            GameState::Hopping,
            GameState::ConnectionLost,
        ] {
            assert!(state.is_transient(), "{state:?} should be transient");
        }
        assert!(!GameState::LoggedIn.is_transient());
    }

    #[test]
    fn member_id_orders_numerically() {
        assert!(MemberId::new(2) < MemberId::new(10));
        assert_eq!(MemberId::from(5_u64), MemberId::new(5));
    }
}
