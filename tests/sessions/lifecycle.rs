//! Membership events as a host would deliver them.

use crate::common::{name, pct, raw_special, RecordingTransport, StubHost};
use party_special_sync::{
    HostEvent, MemberId, PartyMessage, PartyTracker, StateUpdate, TrackerBuilder,
};

fn tracker_with_peers(
    host: &StubHost,
) -> (PartyTracker<StubHost, RecordingTransport>, RecordingTransport) {
    host.add_member(7, "Bob");
    host.add_member(9, "Carol");
    let outbox = RecordingTransport::new();
    let mut tracker = TrackerBuilder::new()
        .start_tracker(host.clone(), outbox.clone())
        .unwrap();
    tracker.start(Some(1000));
    tracker.handle(HostEvent::Tick);

    for (sender, special) in [(7, 60), (9, 35)] {
        let _ = tracker.receive(&PartyMessage::StateUpdate(StateUpdate {
            sender: MemberId::new(sender),
            special: pct(special),
            used_special: false,
        }));
    }
    outbox.take();
    (tracker, outbox)
}

#[test]
fn party_reset_empties_the_registry() {
    let host = StubHost::in_party("Alice", 1);
    let (mut tracker, _) = tracker_with_peers(&host);
    assert_eq!(tracker.registry().len(), 3);

    tracker.handle(HostEvent::PartyChanged);

    assert!(tracker.registry().is_empty());
    assert!(tracker.overlay().labels().is_empty());
}

#[test]
fn new_party_hears_from_us_on_next_tick() {
    let host = StubHost::in_party("Alice", 1);
    let (mut tracker, outbox) = tracker_with_peers(&host);

    host.clear_roster();
    host.set_local_id(Some(4));
    host.add_member(4, "Alice");
    tracker.handle(HostEvent::PartyChanged);
    tracker.handle(HostEvent::Tick);

    assert_eq!(
        outbox.take(),
        vec![PartyMessage::StateUpdate(StateUpdate {
            sender: MemberId::new(4),
            special: pct(100),
            used_special: false,
        })]
    );
    assert_eq!(tracker.registry().len(), 1);
}

#[test]
fn leaving_members_are_pruned_by_id() {
    let host = StubHost::in_party("Alice", 1);
    let (mut tracker, _) = tracker_with_peers(&host);

    host.remove_member(7);
    tracker.handle(HostEvent::MemberLeft(MemberId::new(7)));
    assert!(tracker.registry().get(&name("Bob")).is_none());
    assert!(tracker.registry().get(&name("Carol")).is_some());

    host.remove_member(9);
    tracker.handle(HostEvent::MemberLeft(MemberId::new(9)));
    assert_eq!(tracker.registry().len(), 1);
    assert!(tracker.registry().get(&name("Alice")).is_some());
}

#[test]
fn untracked_leaver_changes_nothing() {
    let host = StubHost::in_party("Alice", 1);
    let (mut tracker, outbox) = tracker_with_peers(&host);

    tracker.handle(HostEvent::MemberLeft(MemberId::new(42)));

    assert_eq!(tracker.registry().len(), 3);
    assert!(outbox.is_empty());
}

#[test]
fn joiner_triggers_reannounce_without_a_spend() {
    let host = StubHost::in_party("Alice", 1);
    let (mut tracker, outbox) = tracker_with_peers(&host);
    tracker.handle(raw_special(40));
    tracker.handle(HostEvent::Tick);
    outbox.take();

    host.add_member(11, "Dave");
    tracker.handle(HostEvent::MemberJoined(MemberId::new(11)));
    tracker.handle(HostEvent::Tick);

    let sent = outbox.take();
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        sent[0],
        PartyMessage::StateUpdate(update) if update.special == pct(40) && !update.used_special
    ));
    // The re-announce must not restart anyone's drain indicator.
    assert_eq!(
        tracker.registry().get(&name("Alice")).unwrap().ticks_since_drain(),
        Some(1)
    );
}

#[test]
fn profile_change_reannounces_under_new_name() {
    let host = StubHost::in_party("Alice", 1);
    let (mut tracker, outbox) = tracker_with_peers(&host);

    host.set_local_name(Some("Alicia"));
    host.add_member(1, "Alicia");
    tracker.handle(HostEvent::ProfileChanged);
    tracker.handle(HostEvent::Tick);

    assert_eq!(outbox.len(), 1);
    assert!(tracker.registry().get(&name("Alicia")).is_some());
    // The id moved to the new name; the stale entry is gone.
    assert!(tracker.registry().get(&name("Alice")).is_none());
}

#[test]
fn events_before_start_are_ignored() {
    let host = StubHost::in_party("Alice", 1);
    let outbox = RecordingTransport::new();
    let mut tracker = TrackerBuilder::new()
        .start_tracker(host, outbox.clone())
        .unwrap();

    tracker.handle(HostEvent::MemberJoined(MemberId::new(3)));
    tracker.handle(HostEvent::Tick);

    assert!(!tracker.is_running());
    assert!(outbox.is_empty());
}
