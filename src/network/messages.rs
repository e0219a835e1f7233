//! The two messages party members exchange.

use serde::{Deserialize, Serialize};

use crate::{MemberId, SpecialPercent, SpecialReading, SyncError};

/// "Here is my current energy."
///
/// The receiver upserts the sender into its registry, restarting the drain
/// countdown when `used_special` is set.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateUpdate {
    /// Party id of the member this update describes.
    pub sender: MemberId,
    /// The sender's current energy.
    pub special: SpecialPercent,
    /// Whether the sender spent energy since their previous update.
    pub used_special: bool,
}

/// "Stop showing me."
///
/// The receiver removes the sender from its registry. Applying it twice has
/// the same effect as applying it once.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StopTracking {
    /// Party id of the member that stopped reporting.
    pub sender: MemberId,
}

/// Any message broadcast to the party.
///
/// ```
/// use party_special_sync::{MemberId, PartyMessage, StopTracking};
///
/// let msg = PartyMessage::from(StopTracking { sender: MemberId::new(4) });
/// assert_eq!(msg.sender(), MemberId::new(4));
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartyMessage {
    /// See [`StateUpdate`].
    StateUpdate(StateUpdate),
    /// See [`StopTracking`].
    StopTracking(StopTracking),
}

impl PartyMessage {
    /// Builds a message from the older single-message format, where one
    /// integer carried either the value or a negative "stop tracking me".
    ///
    /// ```
    /// use party_special_sync::{MemberId, PartyMessage, StopTracking};
    ///
    /// let sender = MemberId::new(3);
    /// assert_eq!(
    ///     PartyMessage::from_legacy(sender, -1, false),
    ///     Ok(PartyMessage::StopTracking(StopTracking { sender }))
    /// );
    /// assert!(PartyMessage::from_legacy(sender, 101, false).is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidSpecialValue`] for values above 100.
    pub fn from_legacy(
        sender: MemberId,
        special: i32,
        used_special: bool,
    ) -> Result<Self, SyncError> {
        Ok(match SpecialReading::from_legacy(special)? {
            SpecialReading::Tracking(special) => PartyMessage::StateUpdate(StateUpdate {
                sender,
                special,
                used_special,
            }),
            SpecialReading::NotTracking => PartyMessage::StopTracking(StopTracking { sender }),
        })
    }

    /// Party id of the member that sent this message.
    #[must_use]
    pub const fn sender(&self) -> MemberId {
        match self {
            PartyMessage::StateUpdate(update) => update.sender,
            PartyMessage::StopTracking(stop) => stop.sender,
        }
    }

    /// What the sender reports about their own energy.
    #[must_use]
    pub const fn reading(&self) -> SpecialReading {
        match self {
            PartyMessage::StateUpdate(update) => SpecialReading::Tracking(update.special),
            PartyMessage::StopTracking(_) => SpecialReading::NotTracking,
        }
    }

    /// Whether the sender spent energy. Always `false` for [`StopTracking`].
    #[must_use]
    pub const fn used_special(&self) -> bool {
        match self {
            PartyMessage::StateUpdate(update) => update.used_special,
            PartyMessage::StopTracking(_) => false,
        }
    }
}

impl From<StateUpdate> for PartyMessage {
    fn from(update: StateUpdate) -> Self {
        PartyMessage::StateUpdate(update)
    }
}

impl From<StopTracking> for PartyMessage {
    fn from(stop: StopTracking) -> Self {
        PartyMessage::StopTracking(stop)
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

    #[test]
    fn sender_is_read_from_either_variant() {
        let update = PartyMessage::from(StateUpdate {
            sender: MemberId::new(3),
            special: SpecialPercent::FULL,
            used_special: false,
        });
        assert_eq!(update.sender(), MemberId::new(3));

        let stop = PartyMessage::from(StopTracking {
            sender: MemberId::new(8),
        });
        assert_eq!(stop.sender(), MemberId::new(8));
    }

    #[test]
    fn legacy_value_maps_to_update_or_stop() {
        let sender = MemberId::new(5);
        let msg = PartyMessage::from_legacy(sender, 35, true).unwrap();
        assert_eq!(msg.reading(), SpecialReading::Tracking(SpecialPercent::new(35).unwrap()));
        assert!(msg.used_special());

        let stop = PartyMessage::from_legacy(sender, -1, true).unwrap();
        assert_eq!(stop.reading(), SpecialReading::NotTracking);
        assert!(!stop.used_special());

        assert_eq!(
            PartyMessage::from_legacy(sender, 400, false),
            Err(SyncError::InvalidSpecialValue { raw: 400 })
        );
    }

    #[test]
    fn json_rejects_out_of_range_special() {
        let json = r#"{"StateUpdate":{"sender":1,"special":140,"used_special":false}}"#;
        assert!(serde_json::from_str::<PartyMessage>(json).is_err());

        let json = r#"{"StateUpdate":{"sender":1,"special":40,"used_special":true}}"#;
        let msg: PartyMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.sender(), MemberId::new(1));
    }
}
