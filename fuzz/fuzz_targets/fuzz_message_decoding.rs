//! Fuzz target for party message decoding.
//!
//! Arbitrary transport bytes must never crash the decoder or the receive
//! path, and a decoded message must re-encode to the same bytes.
//!
//! # Safety Properties Tested
//! - No panics on arbitrary input
//! - Out-of-range energy values are rejected, never applied
//! - Accepted frames are canonical

#![no_main]

use libfuzzer_sys::fuzz_target;

use party_special_sync::network::codec;
use party_special_sync::telemetry::CollectingObserver;
use party_special_sync::{HostContext, MemberId, MemberRegistry, PeerReceiver};
use std::sync::Arc;

struct Roster;

impl HostContext for Roster {
    fn local_player_name(&self) -> Option<String> {
        Some("Local".to_owned())
    }

    fn local_member_id(&self) -> Option<MemberId> {
        Some(MemberId::new(0))
    }

    fn member_display_name(&self, id: MemberId) -> Option<String> {
        (id.as_u64() % 2 == 1).then(|| format!("Peer {id}"))
    }
}

fuzz_target!(|data: &[u8]| {
    if let Ok(msg) = codec::decode_message(data) {
        let encoded = codec::encode_message(&msg).expect("decoded messages re-encode");
        assert_eq!(encoded, data, "accepted frame was not canonical");
    }

    let receiver = PeerReceiver::new(MemberRegistry::new(), Arc::new(CollectingObserver::new()));
    let _ = receiver.receive_bytes(data, &Roster);
    for member in receiver.registry().all() {
        assert!(member.current_special().get() <= 100);
    }
});
