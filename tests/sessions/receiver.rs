//! Receive path driven through real trackers.

use crate::common::{name, pct, raw_special, LoopbackParty, RecordingTransport, StubHost};
use party_special_sync::network::codec;
use party_special_sync::telemetry::{CollectingObserver, ViolationKind};
use party_special_sync::{
    HostEvent, MemberId, PartyMessage, ReceiveOutcome, StateUpdate, StopTracking, SyncError,
    TrackerBuilder,
};
use std::sync::Arc;

fn update(sender: u64, special: u8, used_special: bool) -> PartyMessage {
    PartyMessage::StateUpdate(StateUpdate {
        sender: MemberId::new(sender),
        special: pct(special),
        used_special,
    })
}

fn stop(sender: u64) -> PartyMessage {
    PartyMessage::StopTracking(StopTracking {
        sender: MemberId::new(sender),
    })
}

#[test]
fn peer_update_lands_under_roster_name() {
    let host = StubHost::in_party("Alice", 1);
    host.add_member(7, "<col=00ff00>Bob_the_Mule</col>");
    let mut tracker = TrackerBuilder::new()
        .start_tracker(host, RecordingTransport::new())
        .unwrap();
    tracker.start(None);

    let outcome = tracker.receive(&update(7, 75, true));

    assert_eq!(outcome, ReceiveOutcome::Applied(name("Bob the Mule")));
    let bob = tracker.registry().get(&name("Bob the Mule")).unwrap();
    assert_eq!(bob.member_id(), MemberId::new(7));
    assert_eq!(bob.current_special(), pct(75));
    assert_eq!(bob.ticks_since_drain(), Some(0));
}

#[test]
fn self_echo_is_not_applied_twice() {
    let host = StubHost::in_party("Alice", 1);
    let outbox = RecordingTransport::new();
    let mut tracker = TrackerBuilder::new()
        .start_tracker(host, outbox.clone())
        .unwrap();
    tracker.start(Some(800));
    tracker.handle(raw_special(30));
    tracker.handle(HostEvent::Tick);
    tracker.handle(HostEvent::Tick);
    let before = tracker.registry().get(&name("Alice")).unwrap();

    for msg in outbox.take() {
        assert_eq!(tracker.receive(&msg), ReceiveOutcome::SelfEcho);
    }

    assert_eq!(tracker.registry().get(&name("Alice")).unwrap(), before);
    assert_eq!(before.ticks_since_drain(), Some(1));
}

#[test]
fn stop_tracking_is_idempotent() {
    let host = StubHost::in_party("Alice", 1);
    host.add_member(7, "Bob");
    let receiver = TrackerBuilder::new()
        .start_tracker(host.clone(), RecordingTransport::new())
        .unwrap()
        .receiver();

    let _ = receiver.receive(&update(7, 40, false), &host);
    assert_eq!(receiver.receive(&stop(7), &host), ReceiveOutcome::Removed(name("Bob")));
    assert_eq!(receiver.receive(&stop(7), &host), ReceiveOutcome::Removed(name("Bob")));
    assert!(receiver.registry().is_empty());
}

#[test]
fn messages_outside_a_party_are_dropped() {
    let host = StubHost::new();
    host.set_local_name(Some("Alice"));
    host.add_member(7, "Bob");
    let tracker = TrackerBuilder::new()
        .start_tracker(host, RecordingTransport::new())
        .unwrap();

    assert_eq!(tracker.receive(&update(7, 10, true)), ReceiveOutcome::NotInParty);
    assert!(tracker.registry().is_empty());
}

#[test]
fn unresolved_sender_is_dropped_until_roster_catches_up() {
    let host = StubHost::in_party("Alice", 1);
    host.add_member(9, "<unknown>");
    let tracker = TrackerBuilder::new()
        .start_tracker(host.clone(), RecordingTransport::new())
        .unwrap();

    assert_eq!(tracker.receive(&update(9, 60, false)), ReceiveOutcome::UnresolvedSender);
    assert_eq!(tracker.receive(&update(10, 60, false)), ReceiveOutcome::UnresolvedSender);
    assert!(tracker.registry().is_empty());

    host.add_member(9, "Carol");
    assert_eq!(
        tracker.receive(&update(9, 60, false)),
        ReceiveOutcome::Applied(name("Carol"))
    );
}

#[test]
fn rejoin_under_new_id_restamps_entry() {
    let host = StubHost::in_party("Alice", 1);
    host.add_member(7, "Bob");
    let tracker = TrackerBuilder::new()
        .start_tracker(host.clone(), RecordingTransport::new())
        .unwrap();

    let _ = tracker.receive(&update(7, 50, false));
    host.remove_member(7);
    host.add_member(12, "Bob");
    let _ = tracker.receive(&update(12, 55, false));

    assert_eq!(tracker.registry().len(), 1);
    assert_eq!(tracker.registry().name_of(MemberId::new(12)), Some(name("Bob")));
    assert_eq!(tracker.registry().name_of(MemberId::new(7)), None);
}

#[test]
fn undecodable_bytes_are_reported_and_rejected() {
    let collector = Arc::new(CollectingObserver::new());
    let host = StubHost::in_party("Alice", 1);
    let tracker = TrackerBuilder::new()
        .with_violation_observer(collector.clone())
        .start_tracker(host.clone(), RecordingTransport::new())
        .unwrap();

    let result = tracker.receiver().receive_bytes(&[0xFF, 0xFF, 0xFF], &host);

    assert!(matches!(result, Err(SyncError::Serialization { .. })));
    assert!(collector.has_violation(ViolationKind::Protocol));
    assert!(tracker.registry().is_empty());
}

#[test]
fn encoded_bytes_apply_like_messages() {
    let host = StubHost::in_party("Alice", 1);
    host.add_member(7, "Bob");
    let tracker = TrackerBuilder::new()
        .start_tracker(host.clone(), RecordingTransport::new())
        .unwrap();

    let bytes = codec::encode_message(&update(7, 33, true)).unwrap();
    let outcome = tracker.receiver().receive_bytes(&bytes, &host).unwrap();

    assert_eq!(outcome, ReceiveOutcome::Applied(name("Bob")));
    assert_eq!(tracker.registry().get(&name("Bob")).unwrap().current_special(), pct(33));
}

#[test]
fn party_converges_without_loss() {
    let mut party = LoopbackParty::new(&["Alice", "Bob", "Carol"]);
    party.start_all(100);
    party.tick();

    party.set_special(1, 50);
    party.set_special(2, 25);
    party.tick();

    assert!(party.converged());
    for member in party.members() {
        let registry = member.tracker.registry();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get(&name("Bob")).unwrap().current_special(), pct(50));
        assert_eq!(registry.get(&name("Carol")).unwrap().current_special(), pct(25));
    }
    assert_eq!(party.dropped(), 0);
}

#[test]
fn party_converges_after_loss_once_members_reannounce() {
    let mut party = LoopbackParty::new(&["Alice", "Bob", "Carol", "Dave"]).with_loss(40, 0xC0FFEE);
    party.start_all(100);
    party.tick();
    party.set_special(0, 45);
    party.set_special(3, 70);
    party.tick();

    // Lossy delivery leaves no guarantee. A lossless round of re-announces
    // (as a join would trigger) repairs every view.
    let mut party = party.with_loss(0, 0);
    for index in 0..party.len() {
        party
            .member_mut(index)
            .tracker
            .handle(HostEvent::MemberJoined(MemberId::new(99)));
    }
    party.tick();

    assert!(party.converged());
    let view = party.member(1).tracker.registry();
    assert_eq!(view.get(&name("Alice")).unwrap().current_special(), pct(45));
    assert_eq!(view.get(&name("Dave")).unwrap().current_special(), pct(70));
    assert!(party.dropped() > 0);
}
