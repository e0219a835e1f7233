//! The receive path: applies peer broadcasts to the shared registry.
//!
//! Transports usually deliver messages on their own thread. [`PeerReceiver`]
//! is cheap to clone and `Send + Sync`, so each transport thread can hold one
//! while the host keeps driving the [`PartyTracker`] on the tick thread.
//!
//! [`PartyTracker`]: crate::PartyTracker

use std::sync::Arc;

use tracing::trace;

use crate::member::MemberName;
use crate::network::codec;
use crate::network::messages::PartyMessage;
use crate::report_violation_to;
use crate::sessions::member_registry::MemberRegistry;
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::{HostContext, MemberId, SyncError};

/// What happened to one received message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum ReceiveOutcome {
    /// A `StateUpdate` was upserted under this name.
    Applied(MemberName),
    /// A `StopTracking` removed (or found already absent) this name.
    Removed(MemberName),
    /// The message came from the local member and was already applied at send
    /// time.
    SelfEcho,
    /// The local client is not in a party; nothing to apply to.
    NotInParty,
    /// The roster has no usable display name for the sender yet.
    UnresolvedSender,
}

impl ReceiveOutcome {
    /// Returns `true` if the registry was (or may have been) mutated.
    #[must_use]
    pub fn touched_registry(&self) -> bool {
        matches!(self, ReceiveOutcome::Applied(_) | ReceiveOutcome::Removed(_))
    }
}

/// Applies [`PartyMessage`]s from peers to a [`MemberRegistry`].
#[derive(Clone)]
pub struct PeerReceiver {
    registry: MemberRegistry,
    observer: Arc<dyn ViolationObserver>,
}

impl std::fmt::Debug for PeerReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerReceiver")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl PeerReceiver {
    /// Creates a receiver writing into `registry`.
    #[must_use]
    pub fn new(registry: MemberRegistry, observer: Arc<dyn ViolationObserver>) -> Self {
        Self { registry, observer }
    }

    /// The registry this receiver writes into.
    #[must_use]
    pub fn registry(&self) -> &MemberRegistry {
        &self.registry
    }

    /// Applies one message.
    ///
    /// Messages are dropped without touching the registry when they echo the
    /// local member, when the local client is not in a party, or when the
    /// sender's name cannot be resolved yet. None of these are errors: a later
    /// update fixes the view.
    pub fn receive<H: HostContext + ?Sized>(
        &self,
        msg: &PartyMessage,
        host: &H,
    ) -> ReceiveOutcome {
        let sender = msg.sender();

        let Some(local_id) = host.local_member_id() else {
            trace!(%sender, "Dropping party message received outside a party");
            return ReceiveOutcome::NotInParty;
        };

        if sender == local_id {
            trace!(%sender, "Dropping self-echo");
            return ReceiveOutcome::SelfEcho;
        }

        let Some(name) = host
            .member_display_name(sender)
            .and_then(|raw| MemberName::sanitize(&raw))
        else {
            trace!(%sender, "Dropping message from unresolved sender");
            return ReceiveOutcome::UnresolvedSender;
        };

        let reading = msg.reading();
        let used_special = msg.used_special();
        trace!(%sender, %name, ?reading, used_special, "Applying peer message");
        if self.registry.apply(name.clone(), sender, reading, used_special) {
            ReceiveOutcome::Applied(name)
        } else {
            ReceiveOutcome::Removed(name)
        }
    }

    /// Applies a report in the older single-message format, where a negative
    /// value means the sender stopped tracking.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidSpecialValue`] for values above 100. The
    /// failure is also reported to the violation observer.
    pub fn receive_legacy<H: HostContext + ?Sized>(
        &self,
        sender: MemberId,
        special: i32,
        used_special: bool,
        host: &H,
    ) -> Result<ReceiveOutcome, SyncError> {
        match PartyMessage::from_legacy(sender, special, used_special) {
            Ok(msg) => Ok(self.receive(&msg, host)),
            Err(err) => {
                report_violation_to!(
                    self.observer,
                    Some(sender),
                    ViolationSeverity::Warning,
                    ViolationKind::Protocol,
                    "discarding legacy report with value {}",
                    special
                );
                Err(err)
            },
        }
    }

    /// Decodes `bytes` with the party codec and applies the message.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Serialization`] if the bytes are not a valid
    /// message. The failure is also reported to the violation observer.
    pub fn receive_bytes<H: HostContext + ?Sized>(
        &self,
        bytes: &[u8],
        host: &H,
    ) -> Result<ReceiveOutcome, SyncError> {
        match codec::decode_message(bytes) {
            Ok(msg) => Ok(self.receive(&msg, host)),
            Err(err) => {
                report_violation_to!(
                    self.observer,
                    None,
                    ViolationSeverity::Warning,
                    ViolationKind::Protocol,
                    "discarding undecodable party message ({} bytes): {}",
                    bytes.len(),
                    err
                );
                Err(err.into())
            },
        }
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
    use crate::network::messages::{StateUpdate, StopTracking};
    use crate::telemetry::CollectingObserver;
    use crate::SpecialPercent;
    use std::collections::BTreeMap;

    struct Roster {
        local: Option<MemberId>,
        names: BTreeMap<MemberId, &'static str>,
    }

    impl HostContext for Roster {
        fn local_player_name(&self) -> Option<String> {
            self.local
                .and_then(|id| self.names.get(&id))
                .map(|name| (*name).to_owned())
        }

        fn local_member_id(&self) -> Option<MemberId> {
            self.local
        }

        fn member_display_name(&self, id: MemberId) -> Option<String> {
            self.names.get(&id).map(|name| (*name).to_owned())
        }
    }

    fn roster() -> Roster {
        Roster {
            local: Some(MemberId::new(1)),
            names: BTreeMap::from([
                (MemberId::new(1), "Alice"),
                (MemberId::new(7), "Bob"),
                (MemberId::new(8), "<unknown>"),
            ]),
        }
    }

    fn receiver() -> (PeerReceiver, Arc<CollectingObserver>) {
        let collector = Arc::new(CollectingObserver::new());
        let receiver = PeerReceiver::new(MemberRegistry::new(), collector.clone());
        (receiver, collector)
    }

    fn update(sender: u64, special: u8, used_special: bool) -> PartyMessage {
        PartyMessage::StateUpdate(StateUpdate {
            sender: MemberId::new(sender),
            special: SpecialPercent::new(special).unwrap(),
            used_special,
        })
    }

    #[test]
    fn peer_update_is_applied_under_sanitized_name() {
        let (receiver, _) = receiver();
        let outcome = receiver.receive(&update(7, 30, true), &roster());

        let bob = MemberName::sanitize("Bob").unwrap();
        assert_eq!(outcome, ReceiveOutcome::Applied(bob.clone()));
        let entry = receiver.registry().get(&bob).unwrap();
        assert_eq!(entry.current_special().get(), 30);
        assert_eq!(entry.ticks_since_drain(), Some(0));
    }

    #[test]
    fn self_echo_does_not_mutate() {
        let (receiver, _) = receiver();
        assert_eq!(
            receiver.receive(&update(1, 10, true), &roster()),
            ReceiveOutcome::SelfEcho
        );
        assert!(receiver.registry().is_empty());
    }

    #[test]
    fn unresolved_and_placeholder_senders_are_dropped() {
        let (receiver, _) = receiver();
        assert_eq!(
            receiver.receive(&update(99, 10, false), &roster()),
            ReceiveOutcome::UnresolvedSender
        );
        assert_eq!(
            receiver.receive(&update(8, 10, false), &roster()),
            ReceiveOutcome::UnresolvedSender
        );
        assert!(receiver.registry().is_empty());
    }

    #[test]
    fn messages_outside_party_are_dropped() {
        let (receiver, _) = receiver();
        let host = Roster {
            local: None,
            ..roster()
        };
        let outcome = receiver.receive(&update(7, 10, false), &host);
        assert_eq!(outcome, ReceiveOutcome::NotInParty);
        assert!(!outcome.touched_registry());
    }

    #[test]
    fn stop_tracking_twice_equals_once() {
        let (receiver, _) = receiver();
        receiver.receive(&update(7, 30, false), &roster());
        let stop = PartyMessage::StopTracking(StopTracking {
            sender: MemberId::new(7),
        });

        let first = receiver.receive(&stop, &roster());
        let after_first = receiver.registry().all();
        let second = receiver.receive(&stop, &roster());

        assert_eq!(first, second);
        assert_eq!(after_first, receiver.registry().all());
        assert!(receiver.registry().is_empty());
    }

    #[test]
    fn garbage_bytes_are_reported() {
        let (receiver, collector) = receiver();
        let result = receiver.receive_bytes(&[0xFF, 0x01], &roster());
        assert!(matches!(result, Err(SyncError::Serialization { .. })));
        assert!(collector.has_violation(ViolationKind::Protocol));
    }

    #[test]
    fn legacy_reports_update_then_remove() {
        let (receiver, collector) = receiver();
        let bob = MemberName::sanitize("Bob").unwrap();

        let outcome = receiver
            .receive_legacy(MemberId::new(7), 45, true, &roster())
            .unwrap();
        assert_eq!(outcome, ReceiveOutcome::Applied(bob.clone()));
        assert_eq!(receiver.registry().get(&bob).unwrap().current_special().get(), 45);

        let outcome = receiver
            .receive_legacy(MemberId::new(7), -1, false, &roster())
            .unwrap();
        assert_eq!(outcome, ReceiveOutcome::Removed(bob));
        assert!(receiver.registry().is_empty());
        assert!(collector.is_empty());
    }

    #[test]
    fn legacy_value_above_hundred_is_reported() {
        let (receiver, collector) = receiver();
        let result = receiver.receive_legacy(MemberId::new(7), 250, false, &roster());

        assert_eq!(result, Err(SyncError::InvalidSpecialValue { raw: 250 }));
        assert!(collector.has_violation(ViolationKind::Protocol));
        assert!(receiver.registry().is_empty());
    }

    #[test]
    fn encoded_update_is_applied() {
        let (receiver, collector) = receiver();
        let bytes = codec::encode_message(&update(7, 55, false)).unwrap();
        let outcome = receiver.receive_bytes(&bytes, &roster()).unwrap();
        assert!(outcome.touched_registry());
        assert!(collector.is_empty());
    }
}
