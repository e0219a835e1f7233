//! Shared registry of tracked party members.
//!
//! The registry is written from two places: the host's tick path (local
//! updates, drain timers, membership events) and the transport's receive
//! thread (peer updates). Every operation takes the single lock once, so a
//! reader never observes a half-applied update and a snapshot is always
//! consistent across entries.

use std::collections::BTreeMap;

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::member::{Member, MemberName};
use crate::report_violation_to;
use crate::sync::{self, RwLock};
use crate::telemetry::{TracingObserver, ViolationKind, ViolationObserver, ViolationSeverity};
use crate::{MemberId, SpecialPercent, SpecialReading};

/// A point-in-time copy of every tracked member, ordered by name.
///
/// Parties are small, so the common case stays on the stack.
pub type RegistrySnapshot = SmallVec<[Member; 8]>;

/// Thread-safe map from sanitized name to tracked member.
///
/// Cloning is cheap and yields a handle to the same registry.
///
/// # Invariants
///
/// - Keys are unique sanitized names.
/// - Member ids are unique among live entries: an update that carries an id
///   already held by another name evicts the stale entry.
///
/// # Examples
///
/// ```
/// use party_special_sync::{MemberId, MemberName, MemberRegistry, SpecialPercent};
///
/// let registry = MemberRegistry::new();
/// let bob = MemberName::sanitize("Bob").unwrap();
///
/// registry.upsert(bob.clone(), MemberId::new(7), SpecialPercent::new(75).unwrap(), true);
/// let entry = registry.get(&bob).unwrap();
/// assert_eq!(entry.current_special().get(), 75);
/// assert_eq!(entry.ticks_since_drain(), Some(0));
///
/// registry.remove_by_id(MemberId::new(7));
/// assert!(registry.is_empty());
/// ```
#[derive(Clone)]
pub struct MemberRegistry {
    members: sync::Arc<RwLock<BTreeMap<MemberName, Member>>>,
    observer: std::sync::Arc<dyn ViolationObserver>,
}

impl std::fmt::Debug for MemberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let members = sync::read(&self.members);
        f.debug_struct("MemberRegistry")
            .field("members", &members.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Default for MemberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemberRegistry {
    /// Creates an empty registry that reports anomalies through `tracing`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_observer(std::sync::Arc::new(TracingObserver))
    }

    /// Creates an empty registry that reports anomalies to `observer`.
    #[must_use]
    pub fn with_observer(observer: std::sync::Arc<dyn ViolationObserver>) -> Self {
        Self {
            members: sync::Arc::new(RwLock::new(BTreeMap::new())),
            observer,
        }
    }

    /// Inserts or updates the entry for `name`.
    ///
    /// The member id is always re-stamped. When `used_special` is set the
    /// drain countdown restarts at zero; otherwise it is left as it was (a new
    /// entry starts not draining).
    pub fn upsert(
        &self,
        name: MemberName,
        member_id: MemberId,
        special: SpecialPercent,
        used_special: bool,
    ) {
        let evicted = {
            let mut members = sync::write(&self.members);

            let stale = members
                .iter()
                .find(|(key, member)| member.member_id() == member_id && **key != name)
                .map(|(key, _)| key.clone());
            let evicted = stale.and_then(|key| members.remove(&key));

            members
                .entry(name)
                .and_modify(|member| member.apply_report(member_id, special, used_special))
                .or_insert_with_key(|name| {
                    let mut member = Member::new(name.clone(), member_id, special);
                    member.apply_report(member_id, special, used_special);
                    member
                });
            evicted
        };

        if let Some(stale) = evicted {
            report_violation_to!(
                self.observer,
                Some(member_id),
                ViolationSeverity::Warning,
                ViolationKind::Registry,
                "member id {} moved from '{}' to a new name; evicted the stale entry",
                member_id,
                stale.name()
            );
        }
    }

    /// Applies a [`SpecialReading`]: a value is upserted, [`NotTracking`]
    /// removes the entry. Returns `true` if the entry exists afterwards.
    ///
    /// [`NotTracking`]: SpecialReading::NotTracking
    pub fn apply(
        &self,
        name: MemberName,
        member_id: MemberId,
        reading: SpecialReading,
        used_special: bool,
    ) -> bool {
        match reading {
            SpecialReading::Tracking(special) => {
                self.upsert(name, member_id, special, used_special);
                true
            },
            SpecialReading::NotTracking => {
                self.remove(&name);
                false
            },
        }
    }

    /// Removes the entry for `name`. Removing an absent name is a no-op.
    pub fn remove(&self, name: &MemberName) -> Option<Member> {
        let removed = sync::write(&self.members).remove(name);
        if removed.is_some() {
            debug!(%name, "Removed member from registry");
        }
        removed
    }

    /// Removes the entry currently stamped with `member_id`, if any.
    pub fn remove_by_id(&self, member_id: MemberId) -> Option<Member> {
        let mut members = sync::write(&self.members);
        let key = members
            .iter()
            .find(|(_, member)| member.member_id() == member_id)
            .map(|(key, _)| key.clone());
        let removed = key.and_then(|key| members.remove(&key));
        if removed.is_none() {
            trace!(%member_id, "No registry entry for member id");
        }
        removed
    }

    /// Removes every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut members = sync::write(&self.members);
        let count = members.len();
        members.clear();
        count
    }

    /// Returns a copy of the entry for `name`.
    #[must_use]
    pub fn get(&self, name: &MemberName) -> Option<Member> {
        sync::read(&self.members).get(name).cloned()
    }

    /// Returns the name of the entry stamped with `member_id`.
    #[must_use]
    pub fn name_of(&self, member_id: MemberId) -> Option<MemberName> {
        sync::read(&self.members)
            .values()
            .find(|member| member.member_id() == member_id)
            .map(|member| member.name().clone())
    }

    /// Returns a consistent snapshot of every entry, ordered by name.
    #[must_use]
    pub fn all(&self) -> RegistrySnapshot {
        sync::read(&self.members).values().cloned().collect()
    }

    /// Returns `true` if `name` is tracked.
    #[must_use]
    pub fn contains(&self, name: &MemberName) -> bool {
        sync::read(&self.members).contains_key(name)
    }

    /// Number of tracked members.
    #[must_use]
    pub fn len(&self) -> usize {
        sync::read(&self.members).len()
    }

    /// Returns `true` if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        sync::read(&self.members).is_empty()
    }

    /// Advances every running drain countdown by one tick. Returns how many
    /// countdowns expired on this tick.
    pub fn advance_drain_timers(&self, display_threshold: u32) -> usize {
        let mut members = sync::write(&self.members);
        let mut expired = 0;
        for member in members.values_mut() {
            if member.drain().is_tracking() && !member.advance_drain(display_threshold).is_tracking()
            {
                expired += 1;
            }
        }
        expired
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
    use crate::drain_timer::DrainState;
    use crate::telemetry::CollectingObserver;
    use proptest::prelude::*;
    use std::thread;

    fn name(raw: &str) -> MemberName {
        MemberName::sanitize(raw).unwrap()
    }

    fn pct(value: u8) -> SpecialPercent {
        SpecialPercent::new(value).unwrap()
    }

    #[test]
    fn upsert_creates_then_updates() {
        let registry = MemberRegistry::new();
        registry.upsert(name("alice"), MemberId::new(1), pct(100), false);
        registry.upsert(name("alice"), MemberId::new(1), pct(50), true);

        assert_eq!(registry.len(), 1);
        let alice = registry.get(&name("alice")).unwrap();
        assert_eq!(alice.current_special(), pct(50));
        assert_eq!(alice.drain(), DrainState::TrackingDrain { ticks_elapsed: 0 });
    }

    #[test]
    fn upsert_without_use_keeps_countdown() {
        let registry = MemberRegistry::new();
        registry.upsert(name("alice"), MemberId::new(1), pct(50), true);
        registry.advance_drain_timers(10);
        registry.upsert(name("alice"), MemberId::new(1), pct(60), false);

        assert_eq!(registry.get(&name("alice")).unwrap().ticks_since_drain(), Some(1));
    }

    #[test]
    fn upsert_restamps_member_id_after_rejoin() {
        let registry = MemberRegistry::new();
        registry.upsert(name("alice"), MemberId::new(1), pct(50), false);
        registry.upsert(name("alice"), MemberId::new(12), pct(50), false);

        assert_eq!(registry.get(&name("alice")).unwrap().member_id(), MemberId::new(12));
        assert!(registry.remove_by_id(MemberId::new(1)).is_none());
        assert!(registry.remove_by_id(MemberId::new(12)).is_some());
    }

    #[test]
    fn reused_id_evicts_stale_entry_and_reports() {
        let collector = std::sync::Arc::new(CollectingObserver::new());
        let registry = MemberRegistry::with_observer(collector.clone());
        registry.upsert(name("alice"), MemberId::new(3), pct(50), false);
        registry.upsert(name("alice renamed"), MemberId::new(3), pct(50), false);

        assert!(!registry.contains(&name("alice")));
        assert!(registry.contains(&name("alice renamed")));
        assert!(collector.has_violation(ViolationKind::Registry));
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = MemberRegistry::new();
        registry.upsert(name("bob"), MemberId::new(7), pct(80), false);

        assert!(registry.remove(&name("bob")).is_some());
        assert!(registry.remove(&name("bob")).is_none());
        assert!(registry.get(&name("bob")).is_none());
    }

    #[test]
    fn remove_by_id_only_touches_matching_entry() {
        let registry = MemberRegistry::new();
        registry.upsert(name("bob"), MemberId::new(7), pct(80), false);
        registry.upsert(name("carol"), MemberId::new(9), pct(20), false);

        let removed = registry.remove_by_id(MemberId::new(7)).unwrap();
        assert_eq!(removed.name(), &name("bob"));
        assert!(registry.contains(&name("carol")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn apply_not_tracking_removes() {
        let registry = MemberRegistry::new();
        registry.upsert(name("bob"), MemberId::new(7), pct(80), false);
        assert!(!registry.apply(name("bob"), MemberId::new(7), SpecialReading::NotTracking, false));
        assert!(registry.is_empty());
    }

    #[test]
    fn clear_reports_removed_count() {
        let registry = MemberRegistry::new();
        for (i, who) in ["a", "b", "c"].into_iter().enumerate() {
            registry.upsert(name(who), MemberId::new(i as u64), pct(10), false);
        }
        assert_eq!(registry.clear(), 3);
        assert!(registry.is_empty());
    }

    #[test]
    fn drain_timers_expire_after_threshold() {
        let registry = MemberRegistry::new();
        registry.upsert(name("alice"), MemberId::new(1), pct(0), true);
        registry.upsert(name("bob"), MemberId::new(2), pct(100), false);

        assert_eq!(registry.advance_drain_timers(1), 0);
        assert_eq!(registry.advance_drain_timers(1), 1);
        assert!(registry.all().iter().all(|m| !m.drain().is_tracking()));
    }

    #[test]
    fn snapshot_is_ordered_by_name() {
        let registry = MemberRegistry::new();
        registry.upsert(name("carol"), MemberId::new(9), pct(10), false);
        registry.upsert(name("alice"), MemberId::new(1), pct(10), false);

        let names: Vec<_> = registry.all().iter().map(|m| m.name().to_string()).collect();
        assert_eq!(names, ["alice", "carol"]);
    }

    #[test]
    fn concurrent_receive_and_tick_paths_stay_consistent() {
        let registry = MemberRegistry::new();
        let receive = registry.clone();
        let tick = registry.clone();

        let receiver = thread::spawn(move || {
            for round in 0..500_u32 {
                let value = pct((round % 101) as u8);
                receive.upsert(name("peer"), MemberId::new(2), value, round % 3 == 0);
            }
        });
        let ticker = thread::spawn(move || {
            for round in 0..500_u32 {
                tick.upsert(name("local"), MemberId::new(1), pct(50), round % 5 == 0);
                tick.advance_drain_timers(3);
                let snapshot = tick.all();
                let mut names: Vec<_> = snapshot.iter().map(|m| m.name().clone()).collect();
                names.dedup();
                assert_eq!(names.len(), snapshot.len());
            }
        });

        receiver.join().unwrap();
        ticker.join().unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Upsert(u8, u64, u8, bool),
        Remove(u8),
        RemoveById(u64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..6, 0u64..6, 0u8..=100, any::<bool>())
                .prop_map(|(n, id, v, used)| Op::Upsert(n, id, v, used)),
            (0u8..6).prop_map(Op::Remove),
            (0u64..6).prop_map(Op::RemoveById),
        ]
    }

    proptest! {
        #[test]
        fn names_and_ids_stay_unique(ops in proptest::collection::vec(op_strategy(), 0..64)) {
            let registry = MemberRegistry::with_observer(std::sync::Arc::new(CollectingObserver::new()));
            for op in ops {
                match op {
                    Op::Upsert(n, id, v, used) => {
                        registry.upsert(name(&format!("p{n}")), MemberId::new(id), pct(v), used);
                    },
                    Op::Remove(n) => {
                        let key = name(&format!("p{n}"));
                        registry.remove(&key);
                        prop_assert!(registry.get(&key).is_none());
                    },
                    Op::RemoveById(id) => {
                        registry.remove_by_id(MemberId::new(id));
                    },
                }

                let snapshot = registry.all();
                let mut ids: Vec<_> = snapshot.iter().map(Member::member_id).collect();
                ids.sort();
                ids.dedup();
                prop_assert_eq!(ids.len(), snapshot.len());
            }
        }

        #[test]
        fn double_remove_matches_single_remove(present in any::<bool>()) {
            let once = MemberRegistry::new();
            let twice = MemberRegistry::new();
            for registry in [&once, &twice] {
                registry.upsert(name("alice"), MemberId::new(1), pct(30), false);
                if present {
                    registry.upsert(name("bob"), MemberId::new(2), pct(40), true);
                }
            }

            once.remove(&name("bob"));
            twice.remove(&name("bob"));
            twice.remove(&name("bob"));
            prop_assert_eq!(once.all(), twice.all());
        }
    }
}
