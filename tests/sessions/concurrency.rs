//! The tick thread and a transport thread racing on one registry.

use crate::common::{name, pct, raw_special, RecordingTransport, StubHost};
use party_special_sync::{HostEvent, MemberId, PartyMessage, StateUpdate, TrackerBuilder};
use std::sync::{Arc, Barrier};
use std::thread;

const PEERS: u64 = 6;
const ROUNDS: u8 = 100;

fn host_with_peers() -> StubHost {
    let host = StubHost::in_party("Alice", 1);
    for id in 2..2 + PEERS {
        host.add_member(id, &format!("Peer{id}"));
    }
    host
}

#[test]
fn receive_thread_and_tick_thread_do_not_lose_updates() {
    let host = host_with_peers();
    let mut tracker = TrackerBuilder::new()
        .start_tracker(host.clone(), RecordingTransport::new())
        .unwrap();
    tracker.start(Some(1000));

    let receiver = tracker.receiver();
    let barrier = Arc::new(Barrier::new(2));

    let transport_thread = {
        let barrier = Arc::clone(&barrier);
        let host = host.clone();
        thread::spawn(move || {
            barrier.wait();
            for round in 0..=ROUNDS {
                for id in 2..2 + PEERS {
                    let msg = PartyMessage::StateUpdate(StateUpdate {
                        sender: MemberId::new(id),
                        special: pct(round),
                        used_special: round % 10 == 0,
                    });
                    assert!(receiver.receive(&msg, &host).touched_registry());
                }
            }
        })
    };

    barrier.wait();
    for round in 0..200 {
        tracker.handle(raw_special(100 - (round % 100)));
        tracker.handle(HostEvent::Tick);
        let view = tracker.overlay();
        for member in view.members() {
            assert!(member.current_special().get() <= 100);
        }
    }
    transport_thread.join().unwrap();

    let registry = tracker.registry();
    assert_eq!(registry.len(), 1 + PEERS as usize);
    for id in 2..2 + PEERS {
        let peer = registry.get(&name(&format!("Peer{id}"))).unwrap();
        assert_eq!(peer.current_special(), pct(ROUNDS));
        assert_eq!(peer.member_id(), MemberId::new(id));
    }
}

#[test]
fn membership_events_race_with_receives() {
    let host = host_with_peers();
    let mut tracker = TrackerBuilder::new()
        .start_tracker(host.clone(), RecordingTransport::new())
        .unwrap();
    tracker.start(Some(500));

    let receivers: Vec<_> = (0..3).map(|_| tracker.receiver()).collect();
    let handles: Vec<_> = receivers
        .into_iter()
        .map(|receiver| {
            let host = host.clone();
            thread::spawn(move || {
                for round in 0..50_u8 {
                    for id in 2..2 + PEERS {
                        let _ = receiver.receive(
                            &PartyMessage::StateUpdate(StateUpdate {
                                sender: MemberId::new(id),
                                special: pct(round),
                                used_special: true,
                            }),
                            &host,
                        );
                    }
                }
            })
        })
        .collect();

    for round in 0..50 {
        if round % 7 == 0 {
            tracker.handle(HostEvent::PartyChanged);
        }
        tracker.handle(HostEvent::MemberLeft(MemberId::new(2 + round % PEERS)));
        tracker.handle(HostEvent::Tick);
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // Whatever interleaving happened, names and ids stay one-to-one.
    let snapshot = tracker.registry().all();
    let mut ids: Vec<_> = snapshot.iter().map(|member| member.member_id()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), snapshot.len());
    assert!(snapshot.len() <= 1 + PEERS as usize);
}
