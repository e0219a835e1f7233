//! Three clients sharing an in-process party bus.
//!
//! Run with: cargo run --example party_bus --features tokio

use std::collections::BTreeMap;

use party_special_sync::prelude::*;
use party_special_sync::BroadcastTransport;
use tracing::info;

const MEMBERS: [(u64, &str); 3] = [(1, "Alice"), (2, "Bob"), (3, "Carol")];

/// Every client sees the same roster.
#[derive(Clone)]
struct Client {
    local: MemberId,
    roster: BTreeMap<MemberId, String>,
}

impl Client {
    fn new(local: u64) -> Self {
        Self {
            local: MemberId::new(local),
            roster: MEMBERS
                .iter()
                .map(|(id, name)| (MemberId::new(*id), (*name).to_owned()))
                .collect(),
        }
    }
}

impl HostContext for Client {
    fn local_player_name(&self) -> Option<String> {
        self.roster.get(&self.local).cloned()
    }

    fn local_member_id(&self) -> Option<MemberId> {
        Some(self.local)
    }

    fn member_display_name(&self, id: MemberId) -> Option<String> {
        self.roster.get(&id).cloned()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // configure logging: output tracker logs to standard out
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(tracing::Level::DEBUG)
            .finish(),
    )?;

    let bus = BroadcastTransport::new(32);
    let mut party = MEMBERS
        .iter()
        .map(|(id, _)| {
            let mut tracker = TrackerBuilder::new()
                .with_config(TrackerConfig {
                    tick_display: 3,
                    ..TrackerConfig::default()
                })
                .start_tracker(Client::new(*id), bus.join())?;
            tracker.start(Some(1000));
            Ok(tracker)
        })
        .collect::<Result<Vec<_>, SyncError>>()?;

    // Bob spends on tick 2, Carol on tick 4.
    let script: [&[(usize, i32)]; 8] = [&[], &[], &[(1, 500)], &[], &[(2, 250)], &[], &[], &[]];

    for (tick, changes) in script.iter().enumerate() {
        for &(member, raw) in *changes {
            party[member].handle(HostEvent::SpecialChanged {
                raw,
                game_state: GameState::LoggedIn,
            });
        }
        for tracker in &mut party {
            tracker.handle(HostEvent::Tick);
        }
        for tracker in &mut party {
            let receiver = tracker.receiver();
            let host = tracker.host().clone();
            tracker.transport_mut().drain_into(&receiver, &host);
        }

        for label in party[0].overlay().labels() {
            info!(
                tick,
                label = %label.text,
                drain = label.drain_text.as_deref().unwrap_or(""),
                style = ?label.style,
                "Alice's overlay"
            );
        }
    }

    Ok(())
}
