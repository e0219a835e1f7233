//! A whole party wired together in memory.
//!
//! Each member gets its own host view and tracker. [`LoopbackParty::deliver`]
//! hands every broadcast to every member (the sender included, which
//! exercises self-echo suppression), dropping messages at a seeded rate.
#![allow(dead_code)]

use party_special_sync::{HostEvent, MemberName, PartyTracker, TrackerBuilder, TrackerConfig};

use super::stubs::{raw_special, RecordingTransport, StubHost};

/// One participant of a [`LoopbackParty`].
pub struct PartyMember {
    pub name: MemberName,
    pub host: StubHost,
    pub outbox: RecordingTransport,
    pub tracker: PartyTracker<StubHost, RecordingTransport>,
}

/// A party whose members exchange messages in memory.
pub struct LoopbackParty {
    members: Vec<PartyMember>,
    loss_percent: u64,
    rng_state: u64,
    delivered: usize,
    dropped: usize,
}

impl LoopbackParty {
    /// Creates a party of `names`, assigning member ids `1..=names.len()`.
    /// Every host sees the full roster.
    pub fn new(names: &[&str]) -> Self {
        Self::with_config(names, &TrackerConfig::default())
    }

    pub fn with_config(names: &[&str], config: &TrackerConfig) -> Self {
        let members = names
            .iter()
            .zip(1_u64..)
            .map(|(display_name, id)| {
                let host = StubHost::in_party(display_name, id);
                for (other, other_id) in names.iter().zip(1_u64..) {
                    host.add_member(other_id, other);
                }
                let outbox = RecordingTransport::new();
                let tracker = TrackerBuilder::new()
                    .with_config(config.clone())
                    .start_tracker(host.clone(), outbox.clone())
                    .expect("test config is valid");
                PartyMember {
                    name: MemberName::sanitize(display_name).expect("test names sanitize"),
                    host,
                    outbox,
                    tracker,
                }
            })
            .collect();

        Self {
            members,
            loss_percent: 0,
            rng_state: 0,
            delivered: 0,
            dropped: 0,
        }
    }

    /// Drops roughly `percent`% of deliveries, deterministically for `seed`.
    pub fn with_loss(mut self, percent: u64, seed: u64) -> Self {
        self.loss_percent = percent.min(100);
        self.rng_state = seed;
        self
    }

    /// Starts every tracker with the same initial readout (whole percent).
    pub fn start_all(&mut self, percent: i32) {
        for member in &mut self.members {
            member.tracker.start(Some(percent * 10));
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn member(&self, index: usize) -> &PartyMember {
        &self.members[index]
    }

    pub fn member_mut(&mut self, index: usize) -> &mut PartyMember {
        &mut self.members[index]
    }

    pub fn members(&self) -> &[PartyMember] {
        &self.members
    }

    /// Feeds a local readout change to one member.
    pub fn set_special(&mut self, index: usize, percent: i32) {
        self.members[index].tracker.handle(raw_special(percent));
    }

    /// Ticks every member, then delivers what they sent.
    pub fn tick(&mut self) {
        for member in &mut self.members {
            member.tracker.handle(HostEvent::Tick);
        }
        self.deliver();
    }

    /// Delivers every queued broadcast to every member. Returns how many
    /// deliveries changed a registry.
    pub fn deliver(&mut self) -> usize {
        let outgoing: Vec<_> = self
            .members
            .iter()
            .flat_map(|member| member.outbox.take())
            .collect();

        let mut applied = 0;
        for msg in &outgoing {
            for index in 0..self.members.len() {
                if self.roll_loss() {
                    self.dropped += 1;
                    continue;
                }
                self.delivered += 1;
                let member = &self.members[index];
                let outcome = member.tracker.receiver().receive(msg, &member.host);
                if outcome.touched_registry() {
                    applied += 1;
                }
            }
        }
        applied
    }

    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Returns `true` if every member's registry holds the same values.
    pub fn converged(&self) -> bool {
        let views: Vec<Vec<_>> = self
            .members
            .iter()
            .map(|member| {
                member
                    .tracker
                    .registry()
                    .all()
                    .iter()
                    .map(|entry| (entry.name().clone(), entry.current_special()))
                    .collect()
            })
            .collect();
        views.windows(2).all(|pair| pair[0] == pair[1])
    }

    // splitmix64; enough for reproducible loss patterns.
    fn roll_loss(&mut self) -> bool {
        if self.loss_percent == 0 {
            return false;
        }
        self.rng_state = self.rng_state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.rng_state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        z % 100 < self.loss_percent
    }
}
