//! Party membership state machine.
//!
//! | Event | Registry | Local watcher |
//! |-------|----------|---------------|
//! | party changed / reset | cleared | re-announce due |
//! | member joined | untouched | re-announce due |
//! | member left | leaver removed by id | untouched |
//! | local profile changed | untouched | re-announce due |
//!
//! A joiner's request for data is not modelled separately: the re-announce
//! on the next tick answers it.

use tracing::{debug, trace};

use crate::member::Member;
use crate::sessions::member_registry::MemberRegistry;
use crate::watcher::LocalStateWatcher;
use crate::{HostEvent, MemberId};

/// The subset of [`HostEvent`]s that concern party membership.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MembershipEvent {
    /// Joined, left, or switched party. Peer identities are no longer valid.
    PartyChanged,
    /// A member joined the current party.
    MemberJoined(MemberId),
    /// A member left the current party.
    MemberLeft(MemberId),
    /// The local player's identity or profile changed.
    ProfileChanged,
}

impl MembershipEvent {
    /// Extracts the membership event from a host event, if it is one.
    #[must_use]
    pub fn from_host(event: &HostEvent) -> Option<Self> {
        match event {
            HostEvent::PartyChanged => Some(Self::PartyChanged),
            HostEvent::MemberJoined(id) => Some(Self::MemberJoined(*id)),
            HostEvent::MemberLeft(id) => Some(Self::MemberLeft(*id)),
            HostEvent::ProfileChanged => Some(Self::ProfileChanged),
            _ => None,
        }
    }
}

/// What a membership event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEffect {
    /// The registry was flushed; this many entries were dropped.
    Cleared(usize),
    /// A re-announce was scheduled for the next tick.
    AnnounceDue,
    /// The leaver's entry was removed.
    Removed(Member),
    /// Nobody in the registry carries the leaver's id.
    UnknownLeaver(MemberId),
}

/// Applies [`MembershipEvent`]s to the registry and the local watcher.
#[derive(Debug, Clone)]
pub struct MembershipController {
    registry: MemberRegistry,
}

impl MembershipController {
    /// Creates a controller over `registry`.
    #[must_use]
    pub fn new(registry: MemberRegistry) -> Self {
        Self { registry }
    }

    /// Applies one event.
    pub fn handle(
        &self,
        event: MembershipEvent,
        watcher: &mut LocalStateWatcher,
    ) -> MembershipEffect {
        match event {
            MembershipEvent::PartyChanged => {
                let dropped = self.registry.clear();
                debug!(dropped, "Party changed; registry flushed");
                // A fresh party has never heard from us.
                watcher.mark_due();
                MembershipEffect::Cleared(dropped)
            },
            MembershipEvent::MemberJoined(id) => {
                debug!(member_id = %id, "Member joined; scheduling re-announce");
                watcher.mark_due();
                MembershipEffect::AnnounceDue
            },
            MembershipEvent::ProfileChanged => {
                debug!("Local profile changed; scheduling re-announce");
                watcher.mark_due();
                MembershipEffect::AnnounceDue
            },
            MembershipEvent::MemberLeft(id) => match self.registry.remove_by_id(id) {
                Some(member) => {
                    debug!(member_id = %id, name = %member.name(), "Member left");
                    MembershipEffect::Removed(member)
                },
                None => {
                    // Members who never broadcast are not tracked.
                    trace!(member_id = %id, "Leaver was not tracked");
                    MembershipEffect::UnknownLeaver(id)
                },
            },
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::member::MemberName;
    use crate::{SpecialPercent, TrackerConfig};

    fn setup() -> (MembershipController, MemberRegistry) {
        let registry = MemberRegistry::new();
        let controller = MembershipController::new(registry.clone());
        (controller, registry)
    }

    fn add(registry: &MemberRegistry, name: &str, id: u64) {
        registry.upsert(
            MemberName::sanitize(name).unwrap(),
            MemberId::new(id),
            SpecialPercent::FULL,
            false,
        );
    }

    #[test]
    fn party_change_flushes_everyone() {
        let (controller, registry) = setup();
        add(&registry, "alice", 1);
        add(&registry, "bob", 7);
        add(&registry, "carol", 9);

        let mut watcher = LocalStateWatcher::new();
        let effect = controller.handle(MembershipEvent::PartyChanged, &mut watcher);

        assert_eq!(effect, MembershipEffect::Cleared(3));
        assert!(registry.is_empty());
    }

    #[test]
    fn join_and_profile_change_schedule_announce() {
        let (controller, registry) = setup();
        add(&registry, "alice", 1);

        for event in [
            MembershipEvent::MemberJoined(MemberId::new(4)),
            MembershipEvent::ProfileChanged,
        ] {
            let mut watcher = LocalStateWatcher::new();
            assert_eq!(controller.handle(event, &mut watcher), MembershipEffect::AnnounceDue);
            assert!(watcher.is_due());
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn leave_removes_only_the_leaver() {
        let (controller, registry) = setup();
        add(&registry, "bob", 7);
        add(&registry, "carol", 9);

        let mut watcher = LocalStateWatcher::new();
        let effect = controller.handle(MembershipEvent::MemberLeft(MemberId::new(7)), &mut watcher);

        assert!(matches!(effect, MembershipEffect::Removed(member) if member.name().as_str() == "bob"));
        assert!(registry.contains(&MemberName::sanitize("carol").unwrap()));
        assert_eq!(registry.len(), 1);
        assert!(!watcher.is_due());
    }

    #[test]
    fn unknown_leaver_is_a_noop() {
        let (controller, registry) = setup();
        add(&registry, "bob", 7);

        let mut watcher = LocalStateWatcher::new();
        let effect = controller.handle(MembershipEvent::MemberLeft(MemberId::new(3)), &mut watcher);

        assert_eq!(effect, MembershipEffect::UnknownLeaver(MemberId::new(3)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn only_membership_host_events_convert() {
        assert_eq!(
            MembershipEvent::from_host(&HostEvent::MemberLeft(MemberId::new(2))),
            Some(MembershipEvent::MemberLeft(MemberId::new(2)))
        );
        assert_eq!(MembershipEvent::from_host(&HostEvent::Tick), None);
        assert_eq!(
            MembershipEvent::from_host(&HostEvent::ConfigChanged(TrackerConfig::default())),
            None
        );
    }
}
