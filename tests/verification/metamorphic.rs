//! Metamorphic tests for the receive path.
//!
//! Peers are independent: as long as each sender's own messages arrive in
//! order, how they interleave with other senders must not change the final
//! registry. Redelivering a message must not change it either.

use crate::common::{pct, StubHost};
use party_special_sync::telemetry::CollectingObserver;
use party_special_sync::{
    MemberId, MemberRegistry, PartyMessage, PeerReceiver, RegistrySnapshot, StateUpdate,
    StopTracking,
};
use proptest::prelude::*;
use std::sync::Arc;

const SENDERS: std::ops::Range<u64> = 2..6;

fn host() -> StubHost {
    let host = StubHost::in_party("Alice", 1);
    for id in SENDERS {
        host.add_member(id, &format!("Peer {id}"));
    }
    host
}

fn message(sender: u64) -> impl Strategy<Value = PartyMessage> {
    prop_oneof![
        8 => (0..=100_u8, any::<bool>()).prop_map(move |(special, used_special)| {
            PartyMessage::StateUpdate(StateUpdate {
                sender: MemberId::new(sender),
                special: pct(special),
                used_special,
            })
        }),
        1 => Just(PartyMessage::StopTracking(StopTracking {
            sender: MemberId::new(sender),
        })),
    ]
}

/// One ordered message stream per sender.
fn streams() -> impl Strategy<Value = Vec<Vec<PartyMessage>>> {
    SENDERS
        .map(|sender| proptest::collection::vec(message(sender), 0..12))
        .collect::<Vec<_>>()
}

fn apply(messages: &[PartyMessage]) -> RegistrySnapshot {
    let host = host();
    let receiver = PeerReceiver::new(MemberRegistry::new(), Arc::new(CollectingObserver::new()));
    for msg in messages {
        let _ = receiver.receive(msg, &host);
    }
    receiver.registry().all()
}

fn sequential(streams: &[Vec<PartyMessage>]) -> Vec<PartyMessage> {
    streams.iter().flatten().copied().collect()
}

fn round_robin(streams: &[Vec<PartyMessage>]) -> Vec<PartyMessage> {
    let longest = streams.iter().map(Vec::len).max().unwrap_or(0);
    (0..longest)
        .flat_map(|index| streams.iter().filter_map(move |stream| stream.get(index)))
        .copied()
        .collect()
}

proptest! {
    #[test]
    fn interleaving_across_senders_does_not_matter(streams in streams()) {
        prop_assert_eq!(apply(&sequential(&streams)), apply(&round_robin(&streams)));

        let reversed: Vec<_> = streams.iter().rev().cloned().collect();
        prop_assert_eq!(apply(&sequential(&streams)), apply(&sequential(&reversed)));
    }

    #[test]
    fn redelivery_does_not_matter(streams in streams()) {
        let once = sequential(&streams);
        let twice: Vec<_> = once.iter().flat_map(|msg| [*msg, *msg]).collect();
        prop_assert_eq!(apply(&once), apply(&twice));
    }
}
