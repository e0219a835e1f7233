//! Property-based tests for the tick path.
//!
//! # Invariants Tested
//!
//! - At most one message is broadcast per host event, and only on ticks
//! - Every broadcast carries the local member id
//! - A readout taken outside the logged-in state is never broadcast
//! - A broadcast flags a spend only for a decrease seen while tracking since
//!   the previous tick
//! - The drain indicator never outlives `tick_display`
//! - Names and ids in the registry stay one-to-one

use crate::common::{RecordingTransport, StubHost};
use party_special_sync::{
    GameState, HostEvent, MemberId, PartyMessage, StateUpdate, TrackerBuilder, TrackerConfig,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

const LOCAL_ID: u64 = 1;

#[derive(Debug, Clone)]
enum Step {
    Tick,
    Readout { raw: i32, game_state: GameState },
    Joined(u64),
    Left(u64),
    PartyChanged,
    ToggleTracking,
    Peer { id: u64, special: u8, used: bool },
}

fn game_state() -> impl Strategy<Value = GameState> {
    prop_oneof![
        4 => Just(GameState::LoggedIn),
        1 => Just(GameState::LoginScreen),
        1 => Just(GameState::LoggingIn),
        1 => Just(GameState::Loading),
        1 => Just(GameState::Hopping),
        1 => Just(GameState::ConnectionLost),
    ]
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        6 => Just(Step::Tick),
        4 => (-20..1020_i32, game_state())
            .prop_map(|(raw, game_state)| Step::Readout { raw, game_state }),
        1 => (2..6_u64).prop_map(Step::Joined),
        1 => (2..6_u64).prop_map(Step::Left),
        1 => Just(Step::PartyChanged),
        1 => Just(Step::ToggleTracking),
        3 => (2..6_u64, 0..=100_u8, any::<bool>())
            .prop_map(|(id, special, used)| Step::Peer { id, special, used }),
    ]
}

fn host() -> StubHost {
    let host = StubHost::in_party("Alice", LOCAL_ID);
    for id in 2..6 {
        host.add_member(id, &format!("Peer {id}"));
    }
    host
}

proptest! {
    #[test]
    fn tick_path_invariants_hold(
        steps in proptest::collection::vec(step(), 1..120),
        tick_display in 1..6_u32,
    ) {
        let host = host();
        let outbox = RecordingTransport::new();
        let mut config = TrackerConfig { tick_display, ..TrackerConfig::default() };
        let mut tracker = TrackerBuilder::new()
            .with_config(config.clone())
            .start_tracker(host.clone(), outbox.clone())
            .unwrap();
        tracker.start(Some(1000));

        // Percentages the local client has legitimately observed.
        let mut observed: BTreeSet<u8> = BTreeSet::from([100]);
        let mut last_value: u8 = 100;
        let mut spend_pending = false;

        for step in steps {
            let is_tick = matches!(step, Step::Tick);
            let is_toggle = matches!(step, Step::ToggleTracking);
            let before = outbox.len();

            match step {
                Step::Tick => {
                    tracker.handle(HostEvent::Tick);
                },
                Step::Readout { raw, game_state } => {
                    if game_state == GameState::LoggedIn && (0..=1000).contains(&raw) {
                        let value = (raw / 10) as u8;
                        observed.insert(value);
                        spend_pending |= config.track_me && value < last_value;
                        last_value = value;
                    }
                    tracker.handle(HostEvent::SpecialChanged { raw, game_state });
                },
                Step::Joined(id) => {
                    tracker.handle(HostEvent::MemberJoined(MemberId::new(id)));
                },
                Step::Left(id) => {
                    tracker.handle(HostEvent::MemberLeft(MemberId::new(id)));
                },
                Step::PartyChanged => {
                    tracker.handle(HostEvent::PartyChanged);
                },
                Step::ToggleTracking => {
                    config.track_me = !config.track_me;
                    spend_pending = false;
                    tracker.handle(HostEvent::ConfigChanged(config.clone()));
                },
                Step::Peer { id, special, used } => {
                    let _ = tracker.receive(&PartyMessage::StateUpdate(StateUpdate {
                        sender: MemberId::new(id),
                        special: crate::common::pct(special),
                        used_special: used,
                    }));
                },
            }

            let sent = outbox.len() - before;
            prop_assert!(sent <= 1);
            if sent == 1 {
                prop_assert!(is_tick || is_toggle);
            }
            if is_tick {
                match outbox.messages().last() {
                    Some(PartyMessage::StateUpdate(update)) if sent == 1 => {
                        prop_assert_eq!(update.used_special, spend_pending);
                    },
                    _ => prop_assert!(!spend_pending),
                }
                spend_pending = false;
            }

            for member in tracker.registry().all() {
                if let Some(ticks) = member.ticks_since_drain() {
                    prop_assert!(ticks <= tick_display);
                }
            }

            let snapshot = tracker.registry().all();
            let ids: BTreeSet<_> = snapshot.iter().map(|member| member.member_id()).collect();
            prop_assert_eq!(ids.len(), snapshot.len());
        }

        for msg in outbox.messages() {
            prop_assert_eq!(msg.sender(), MemberId::new(LOCAL_ID));
            if let PartyMessage::StateUpdate(update) = msg {
                prop_assert!(observed.contains(&update.special.get()));
            }
        }
    }
}
