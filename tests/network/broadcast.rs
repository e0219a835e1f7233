//! Several trackers sharing one in-process tokio broadcast bus.

use crate::common::{name, pct, raw_special, StubHost};
use party_special_sync::telemetry::{CollectingObserver, ViolationKind};
use party_special_sync::{BroadcastTransport, HostEvent, PartyTracker, TrackerBuilder};
use std::sync::Arc;

type BusTracker = PartyTracker<StubHost, BroadcastTransport>;

fn roster_host(local: &str, local_id: u64) -> StubHost {
    let host = StubHost::in_party(local, local_id);
    for (id, member) in [(1, "Alice"), (2, "Bob"), (3, "Carol")] {
        host.add_member(id, member);
    }
    host
}

fn bus_party(capacity: usize) -> Vec<BusTracker> {
    let bus = BroadcastTransport::new(capacity);
    [(1, "Alice"), (2, "Bob"), (3, "Carol")]
        .into_iter()
        .map(|(id, member)| {
            let mut tracker = TrackerBuilder::new()
                .start_tracker(roster_host(member, id), bus.join())
                .unwrap();
            tracker.start(Some(1000));
            tracker
        })
        .collect()
}

fn tick_and_drain(party: &mut [BusTracker]) -> usize {
    for tracker in party.iter_mut() {
        tracker.handle(HostEvent::Tick);
    }
    let mut applied = 0;
    for tracker in party.iter_mut() {
        let receiver = tracker.receiver();
        let host = tracker.host().clone();
        applied += tracker.transport_mut().drain_into(&receiver, &host);
    }
    applied
}

#[test]
fn everyone_learns_everyone_over_the_bus() {
    let mut party = bus_party(16);

    // Three announces, each applied by the two other members.
    assert_eq!(tick_and_drain(&mut party), 6);

    party[1].handle(raw_special(45));
    assert_eq!(tick_and_drain(&mut party), 2);

    for tracker in &party {
        let registry = tracker.registry();
        assert_eq!(registry.len(), 3);
        let bob = registry.get(&name("Bob")).unwrap();
        assert_eq!(bob.current_special(), pct(45));
        assert_eq!(bob.ticks_since_drain(), Some(0));
    }
}

#[test]
fn overflowing_the_bus_is_reported() {
    let collector = Arc::new(CollectingObserver::new());
    let bus = BroadcastTransport::with_observer(1, collector.clone());
    let mut listener = bus.join();
    let host = roster_host("Carol", 3);
    let mut alice = TrackerBuilder::new()
        .start_tracker(roster_host("Alice", 1), bus.join())
        .unwrap();
    alice.start(Some(1000));

    for percent in [90, 80, 70] {
        alice.handle(raw_special(percent));
        alice.handle(HostEvent::Tick);
    }

    let receiver = TrackerBuilder::new()
        .start_tracker(host.clone(), bus.join())
        .unwrap()
        .receiver();
    assert_eq!(listener.drain_into(&receiver, &host), 1);
    assert!(collector.has_violation(ViolationKind::Protocol));
    assert_eq!(
        receiver.registry().get(&name("Alice")).unwrap().current_special(),
        pct(70)
    );
}
