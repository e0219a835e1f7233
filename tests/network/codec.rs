//! Frames produced by a live tracker, checked at the byte level.

use crate::common::{name, pct, raw_special, RecordingTransport, StubHost};
use party_special_sync::network::codec::{self, CodecError, MAX_MESSAGE_SIZE};
use party_special_sync::{
    HostEvent, MemberId, PartyMessage, PeerReceiver, ReceiveOutcome, StateUpdate, StopTracking,
    TrackerBuilder, TrackerConfig,
};
use proptest::prelude::*;

fn frames_from_session() -> Vec<Vec<u8>> {
    let host = StubHost::in_party("Alice", 3);
    let outbox = RecordingTransport::new();
    let mut tracker = TrackerBuilder::new()
        .start_tracker(host, outbox.clone())
        .unwrap();
    tracker.start(Some(1000));
    tracker.handle(HostEvent::Tick);
    tracker.handle(raw_special(25));
    tracker.handle(HostEvent::Tick);
    tracker.handle(HostEvent::ConfigChanged(TrackerConfig::observer()));

    outbox
        .take()
        .iter()
        .map(|msg| codec::encode_message(msg).unwrap())
        .collect()
}

#[test]
fn session_frames_decode_to_what_was_sent() {
    let frames = frames_from_session();
    let decoded: Vec<_> = frames
        .iter()
        .map(|frame| codec::decode_message(frame).unwrap())
        .collect();

    assert_eq!(
        decoded,
        vec![
            PartyMessage::StateUpdate(StateUpdate {
                sender: MemberId::new(3),
                special: pct(100),
                used_special: false,
            }),
            PartyMessage::StateUpdate(StateUpdate {
                sender: MemberId::new(3),
                special: pct(25),
                used_special: true,
            }),
            PartyMessage::StopTracking(StopTracking {
                sender: MemberId::new(3),
            }),
        ]
    );
    assert!(frames.iter().all(|frame| frame.len() <= MAX_MESSAGE_SIZE));
}

#[test]
fn peer_applies_frames_from_another_client() {
    let frames = frames_from_session();
    let bob = StubHost::in_party("Bob", 4);
    bob.add_member(3, "Alice");
    let receiver = TrackerBuilder::new()
        .start_tracker(bob.clone(), RecordingTransport::new())
        .unwrap()
        .receiver();

    let outcomes: Vec<_> = frames
        .iter()
        .map(|frame| receiver.receive_bytes(frame, &bob).unwrap())
        .collect();

    assert_eq!(
        outcomes,
        vec![
            ReceiveOutcome::Applied(name("Alice")),
            ReceiveOutcome::Applied(name("Alice")),
            ReceiveOutcome::Removed(name("Alice")),
        ]
    );
    assert!(receiver.registry().is_empty());
}

#[test]
fn padded_frame_is_rejected() {
    let mut frame = frames_from_session().remove(0);
    frame.extend_from_slice(&[0, 0]);
    assert!(matches!(
        codec::decode_message(&frame),
        Err(CodecError::TrailingBytes { .. })
    ));
}

proptest! {
    #[test]
    fn arbitrary_bytes_never_reach_the_registry_unchecked(
        bytes in proptest::collection::vec(any::<u8>(), 0..40)
    ) {
        let host = StubHost::in_party("Bob", 4);
        host.add_member(3, "Alice");
        let receiver = PeerReceiver::new(
            party_special_sync::MemberRegistry::new(),
            std::sync::Arc::new(party_special_sync::telemetry::CollectingObserver::new()),
        );

        if let Ok(ReceiveOutcome::Applied(applied)) = receiver.receive_bytes(&bytes, &host) {
            let entry = receiver.registry().get(&applied).unwrap();
            prop_assert!(entry.current_special().get() <= 100);
        }
        prop_assert!(receiver.registry().len() <= 1);
    }
}
