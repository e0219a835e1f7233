//! Fuzz target for host event sequences.
//!
//! Drives a tracker with arbitrary interleavings of ticks, readouts,
//! membership changes, settings edits and peer messages.
//!
//! # Safety Properties Tested
//! - No panics on arbitrary event sequences
//! - At most one broadcast per event
//! - Registry names and ids stay one-to-one

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use party_special_sync::{
    GameState, HostContext, HostEvent, MemberId, PartyMessage, PartyTransport, SpecialPercent,
    StateUpdate, StopTracking, TrackerBuilder, TrackerConfig,
};
use std::collections::BTreeSet;

#[derive(Debug, Arbitrary)]
enum FuzzEvent {
    Tick,
    Readout { raw: i16, logged_in: bool },
    PartyChanged,
    Joined(u8),
    Left(u8),
    ProfileChanged,
    Settings { track_me: bool, desired_special: u8, tick_display: u8 },
    PeerUpdate { sender: u8, special: u8, used: bool },
    PeerStop(u8),
}

struct Roster;

impl HostContext for Roster {
    fn local_player_name(&self) -> Option<String> {
        Some("Peer 1".to_owned())
    }

    fn local_member_id(&self) -> Option<MemberId> {
        Some(MemberId::new(1))
    }

    fn member_display_name(&self, id: MemberId) -> Option<String> {
        (id.as_u64() < 8).then(|| format!("Peer {id}"))
    }
}

#[derive(Default)]
struct Counter(usize);

impl PartyTransport for Counter {
    fn broadcast(&mut self, _: &PartyMessage) {
        self.0 += 1;
    }
}

fuzz_target!(|events: Vec<FuzzEvent>| {
    let Ok(mut tracker) = TrackerBuilder::new().start_tracker(Roster, Counter::default()) else {
        return;
    };
    tracker.start(Some(1000));

    for event in events {
        let before = tracker.transport().0;
        match event {
            FuzzEvent::Tick => {
                tracker.handle(HostEvent::Tick);
            },
            FuzzEvent::Readout { raw, logged_in } => {
                let game_state = if logged_in {
                    GameState::LoggedIn
                } else {
                    GameState::Loading
                };
                tracker.handle(HostEvent::SpecialChanged {
                    raw: i32::from(raw),
                    game_state,
                });
            },
            FuzzEvent::PartyChanged => {
                tracker.handle(HostEvent::PartyChanged);
            },
            FuzzEvent::Joined(id) => {
                tracker.handle(HostEvent::MemberJoined(MemberId::new(u64::from(id))));
            },
            FuzzEvent::Left(id) => {
                tracker.handle(HostEvent::MemberLeft(MemberId::new(u64::from(id))));
            },
            FuzzEvent::ProfileChanged => {
                tracker.handle(HostEvent::ProfileChanged);
            },
            FuzzEvent::Settings {
                track_me,
                desired_special,
                tick_display,
            } => {
                tracker.handle(HostEvent::ConfigChanged(TrackerConfig {
                    track_me,
                    desired_special,
                    tick_display: u32::from(tick_display),
                    ..TrackerConfig::default()
                }));
            },
            FuzzEvent::PeerUpdate {
                sender,
                special,
                used,
            } => {
                if let Some(special) = SpecialPercent::new(special) {
                    let _ = tracker.receive(&PartyMessage::StateUpdate(StateUpdate {
                        sender: MemberId::new(u64::from(sender)),
                        special,
                        used_special: used,
                    }));
                }
            },
            FuzzEvent::PeerStop(sender) => {
                let _ = tracker.receive(&PartyMessage::StopTracking(StopTracking {
                    sender: MemberId::new(u64::from(sender)),
                }));
            },
        }

        assert!(tracker.transport().0 - before <= 1);
        let snapshot = tracker.registry().all();
        let ids: BTreeSet<_> = snapshot.iter().map(|member| member.member_id()).collect();
        assert_eq!(ids.len(), snapshot.len());
        let _ = tracker.overlay().labels();
    }
});
