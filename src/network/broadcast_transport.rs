//! In-process party bus over [`tokio::sync::broadcast`].
//!
//! Every [`BroadcastTransport`] joined to the same bus sees every message,
//! including its own; the receive path drops those as self-echoes. Messages
//! travel as encoded bytes so the bus exercises the same codec a network
//! transport would.
//!
//! No runtime is required: sending and [`drain_into`](BroadcastTransport::drain_into)
//! never block or await.
//!
//! # Feature Flag
//!
//! ```toml
//! [dependencies]
//! party-special-sync = { version = "0.3", features = ["tokio"] }
//! ```

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::trace;

use crate::network::codec;
use crate::network::messages::PartyMessage;
use crate::report_violation_to;
use crate::sessions::receiver::PeerReceiver;
use crate::telemetry::{TracingObserver, ViolationKind, ViolationObserver, ViolationSeverity};
use crate::{HostContext, PartyTransport};

/// One member's endpoint on an in-process party bus.
///
/// ```
/// use party_special_sync::BroadcastTransport;
///
/// let alice_bus = BroadcastTransport::new(16);
/// let bob_bus = alice_bus.join();
/// assert_eq!(bob_bus.pending(), 0);
/// ```
pub struct BroadcastTransport {
    tx: broadcast::Sender<Arc<[u8]>>,
    rx: broadcast::Receiver<Arc<[u8]>>,
    observer: Arc<dyn ViolationObserver>,
}

impl std::fmt::Debug for BroadcastTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastTransport")
            .field("members", &self.tx.receiver_count())
            .field("pending", &self.rx.len())
            .finish_non_exhaustive()
    }
}

impl BroadcastTransport {
    /// Opens a new bus that buffers up to `capacity` messages per member and
    /// returns the first endpoint. A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_observer(capacity, Arc::new(TracingObserver))
    }

    /// Like [`new`](Self::new), reporting lag and codec failures to `observer`.
    #[must_use]
    pub fn with_observer(capacity: usize, observer: Arc<dyn ViolationObserver>) -> Self {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        Self { tx, rx, observer }
    }

    /// Adds another member endpoint to the same bus. It only sees messages
    /// sent after it joined.
    #[must_use]
    pub fn join(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.tx.subscribe(),
            observer: self.observer.clone(),
        }
    }

    /// Messages waiting for this endpoint.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Applies every waiting message through `receiver`. Returns how many
    /// messages changed the registry.
    ///
    /// If this endpoint fell more than `capacity` messages behind, the oldest
    /// ones are lost; that is reported and draining continues with what is
    /// left, since a later update heals the view.
    pub fn drain_into<H: HostContext + ?Sized>(
        &mut self,
        receiver: &PeerReceiver,
        host: &H,
    ) -> usize {
        let mut applied = 0;
        loop {
            match self.rx.try_recv() {
                Ok(bytes) => {
                    if let Ok(outcome) = receiver.receive_bytes(&bytes, host) {
                        if outcome.touched_registry() {
                            applied += 1;
                        }
                    }
                },
                Err(TryRecvError::Lagged(missed)) => {
                    report_violation_to!(
                        self.observer,
                        None,
                        ViolationSeverity::Warning,
                        ViolationKind::Protocol,
                        "party bus endpoint lagged; {} messages lost",
                        missed
                    );
                },
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        applied
    }
}

impl PartyTransport for BroadcastTransport {
    fn broadcast(&mut self, msg: &PartyMessage) {
        let bytes = match codec::encode_message(msg) {
            Ok(bytes) => bytes,
            Err(err) => {
                report_violation_to!(
                    self.observer,
                    Some(msg.sender()),
                    ViolationSeverity::Error,
                    ViolationKind::InternalError,
                    "failed to encode party message: {}",
                    err
                );
                return;
            },
        };
        // Fire-and-forget: with nobody listening the message is simply lost.
        if self.tx.send(Arc::from(bytes)).is_err() {
            trace!("No party bus members listening");
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
    use crate::member::MemberName;
    use crate::network::messages::StateUpdate;
    use crate::sessions::member_registry::MemberRegistry;
    use crate::telemetry::CollectingObserver;
    use crate::{MemberId, SpecialPercent};

    struct Bob;

    impl HostContext for Bob {
        fn local_player_name(&self) -> Option<String> {
            Some("Bob".to_owned())
        }

        fn local_member_id(&self) -> Option<MemberId> {
            Some(MemberId::new(2))
        }

        fn member_display_name(&self, id: MemberId) -> Option<String> {
            match id.as_u64() {
                1 => Some("Alice".to_owned()),
                2 => Some("Bob".to_owned()),
                _ => None,
            }
        }
    }

    fn update(sender: u64, special: u8) -> PartyMessage {
        PartyMessage::StateUpdate(StateUpdate {
            sender: MemberId::new(sender),
            special: SpecialPercent::new(special).unwrap(),
            used_special: false,
        })
    }

    #[test]
    fn peers_receive_and_self_echo_is_dropped() {
        let mut alice = BroadcastTransport::new(8);
        let mut bob = alice.join();
        let receiver = PeerReceiver::new(MemberRegistry::new(), Arc::new(CollectingObserver::new()));

        alice.broadcast(&update(1, 70));
        bob.broadcast(&update(2, 30));

        assert_eq!(bob.drain_into(&receiver, &Bob), 1);
        assert_eq!(bob.pending(), 0);
        let registry = receiver.registry();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&MemberName::sanitize("Alice").unwrap()));
    }

    #[test]
    fn lagging_endpoint_reports_and_recovers() {
        let collector = Arc::new(CollectingObserver::new());
        let mut alice = BroadcastTransport::with_observer(2, collector.clone());
        let mut bob = alice.join();
        let receiver = PeerReceiver::new(MemberRegistry::new(), collector.clone());

        for special in [10, 20, 30, 40] {
            alice.broadcast(&update(1, special));
        }

        assert_eq!(bob.drain_into(&receiver, &Bob), 2);
        assert!(collector.has_violation(ViolationKind::Protocol));
        let alice_entry = receiver
            .registry()
            .get(&MemberName::sanitize("Alice").unwrap())
            .unwrap();
        assert_eq!(alice_entry.current_special().get(), 40);
    }

    #[test]
    fn zero_capacity_is_usable() {
        let mut solo = BroadcastTransport::new(0);
        solo.broadcast(&update(1, 50));
        assert_eq!(solo.pending(), 1);
    }
}
