//! The tick path: one [`PartyTracker`] per client, driven by [`HostEvent`]s.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::member::MemberName;
use crate::network::messages::{PartyMessage, StateUpdate, StopTracking};
use crate::overlay::OverlayView;
use crate::report_violation_to;
use crate::sessions::config::TrackerConfig;
use crate::sessions::lifecycle::{MembershipController, MembershipEffect, MembershipEvent};
use crate::sessions::member_registry::MemberRegistry;
use crate::sessions::receiver::PeerReceiver;
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::watcher::{LocalStateWatcher, Observation};
use crate::{GameState, HostContext, HostEvent, MemberId, PartyTransport, SpecialPercent};

/// Tracks the party's special-attack energy on behalf of one client.
///
/// The host feeds every notification to [`handle`] from its own thread.
/// Peer messages are applied through the [`PeerReceiver`] returned by
/// [`receiver`], which may live on another thread; both write to the same
/// [`MemberRegistry`].
///
/// At most one [`StateUpdate`] is broadcast per tick. It is sent only when
/// tracking is enabled, the client is in a party, and the party roster already
/// shows the local player under the same name the client reports (so peers can
/// resolve the sender).
///
/// Create one with [`TrackerBuilder`](crate::TrackerBuilder).
///
/// [`handle`]: Self::handle
/// [`receiver`]: Self::receiver
pub struct PartyTracker<H, T>
where
    H: HostContext,
    T: PartyTransport,
{
    host: H,
    transport: T,
    config: TrackerConfig,
    registry: MemberRegistry,
    watcher: LocalStateWatcher,
    membership: MembershipController,
    receiver: PeerReceiver,
    observer: Arc<dyn ViolationObserver>,
    running: bool,
}

impl<H, T> std::fmt::Debug for PartyTracker<H, T>
where
    H: HostContext,
    T: PartyTransport,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartyTracker")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("watcher", &self.watcher)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl<H, T> PartyTracker<H, T>
where
    H: HostContext,
    T: PartyTransport,
{
    pub(crate) fn new(
        host: H,
        transport: T,
        config: TrackerConfig,
        observer: Arc<dyn ViolationObserver>,
    ) -> Self {
        let registry = MemberRegistry::with_observer(observer.clone());
        Self {
            host,
            transport,
            config,
            membership: MembershipController::new(registry.clone()),
            receiver: PeerReceiver::new(registry.clone(), observer.clone()),
            registry,
            watcher: LocalStateWatcher::new(),
            observer,
            running: false,
        }
    }

    /// Starts tracking. `initial_raw` is the local readout at startup (tenths
    /// of a percent), or `None` if the client is not logged in yet. An update
    /// is scheduled for the first tick either way.
    pub fn start(&mut self, initial_raw: Option<i32>) {
        let initial = match initial_raw {
            Some(raw) => {
                let initial = SpecialPercent::from_raw(raw);
                if initial.is_none() {
                    self.report_invalid_readout(raw);
                }
                initial
            },
            None => None,
        };
        self.watcher.prime(initial);
        self.running = true;
        debug!(initial = ?initial, "Party tracker started");
    }

    /// Stops tracking and forgets every member.
    pub fn shutdown(&mut self) {
        let dropped = self.registry.clear();
        self.watcher = LocalStateWatcher::new();
        self.running = false;
        debug!(dropped, "Party tracker shut down");
    }

    /// Returns `true` between [`start`](Self::start) and
    /// [`shutdown`](Self::shutdown).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Processes one host notification. Returns the message broadcast while
    /// handling it, if any.
    ///
    /// Events delivered before [`start`](Self::start) are ignored.
    pub fn handle(&mut self, event: HostEvent) -> Option<PartyMessage> {
        if !self.running {
            trace!(?event, "Ignoring host event while stopped");
            return None;
        }

        match event {
            HostEvent::Tick => self.tick(),
            HostEvent::SpecialChanged { raw, game_state } => {
                self.special_changed(raw, game_state);
                None
            },
            HostEvent::ConfigChanged(config) => self.reconfigure(config),
            other => {
                if let Some(membership) = MembershipEvent::from_host(&other) {
                    self.membership_changed(membership);
                }
                None
            },
        }
    }

    /// A receiver sharing this tracker's registry, for the transport thread.
    #[must_use]
    pub fn receiver(&self) -> PeerReceiver {
        self.receiver.clone()
    }

    /// Applies a peer message on the calling thread, using this tracker's host
    /// for name resolution. Transports that deliver on the tick thread can use
    /// this instead of a separate [`PeerReceiver`].
    pub fn receive(&self, msg: &PartyMessage) -> crate::ReceiveOutcome {
        self.receiver.receive(msg, &self.host)
    }

    /// The shared member registry.
    #[must_use]
    pub fn registry(&self) -> &MemberRegistry {
        &self.registry
    }

    /// Read-only projection of the current registry for rendering.
    #[must_use]
    pub fn overlay(&self) -> OverlayView<'_> {
        OverlayView::new(&self.config, &self.registry)
    }

    /// Current settings.
    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// The local readout watcher.
    #[must_use]
    pub fn watcher(&self) -> &LocalStateWatcher {
        &self.watcher
    }

    /// The host context.
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutable access to the host context.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn tick(&mut self) -> Option<PartyMessage> {
        self.registry.advance_drain_timers(self.config.tick_display);
        self.flush_update()
    }

    fn special_changed(&mut self, raw: i32, game_state: GameState) {
        match self.watcher.observe(raw, game_state) {
            Observation::InvalidReadout => self.report_invalid_readout(raw),
            Observation::Spent { previous, current } => {
                if self.config.track_me {
                    trace!(%previous, %current, "Local special spent");
                } else {
                    // Keep the value for a later announce, never the spend.
                    self.watcher.clear_spend();
                }
            },
            Observation::Updated { .. } | Observation::IgnoredTransient => {},
        }
    }

    fn membership_changed(&mut self, event: MembershipEvent) {
        if let MembershipEffect::Removed(member) = self.membership.handle(event, &mut self.watcher)
        {
            trace!(name = %member.name(), "Pruned leaver");
        }
    }

    fn reconfigure(&mut self, config: TrackerConfig) -> Option<PartyMessage> {
        if let Err(err) = config.validate() {
            report_violation_to!(
                self.observer,
                None,
                ViolationSeverity::Error,
                ViolationKind::Configuration,
                "ignoring configuration change: {}",
                err
            );
            return None;
        }

        let was_tracking = self.config.track_me;
        self.config = config;

        match (was_tracking, self.config.track_me) {
            (false, true) => {
                debug!("Local tracking enabled; scheduling announce");
                self.watcher.clear_spend();
                self.watcher.mark_due();
                None
            },
            (true, false) => {
                self.watcher.clear_spend();
                self.stop_tracking_local()
            },
            _ => None,
        }
    }

    /// Sends the pending local update if every gate passes.
    ///
    /// Outside a party the value stays pending but the spend is dropped: no
    /// peer can see it before the tick it happened on is over. Waiting for the
    /// roster to show the local name keeps the spend.
    fn flush_update(&mut self) -> Option<PartyMessage> {
        if !self.config.track_me || !self.watcher.is_due() {
            return None;
        }

        let Some((local_id, local_name)) = self.local_identity() else {
            self.watcher.clear_spend();
            return None;
        };

        let roster_name = self
            .host
            .member_display_name(local_id)
            .and_then(|raw| MemberName::sanitize(&raw));
        if roster_name.as_ref() != Some(&local_name) {
            trace!(%local_id, %local_name, "Roster has not caught up with local name; holding update");
            return None;
        }

        let pending = self.watcher.take_pending()?;
        let update = StateUpdate {
            sender: local_id,
            special: pending.special,
            used_special: pending.used_special,
        };

        // Applied locally now; the wire echo is dropped on receipt.
        self.registry
            .upsert(local_name, local_id, update.special, update.used_special);

        let msg = PartyMessage::StateUpdate(update);
        self.transport.broadcast(&msg);
        trace!(?update, "Broadcast local update");
        Some(msg)
    }

    fn stop_tracking_local(&mut self) -> Option<PartyMessage> {
        let (local_id, local_name) = self.local_identity()?;
        self.registry.remove(&local_name)?;

        let msg = PartyMessage::StopTracking(StopTracking { sender: local_id });
        self.transport.broadcast(&msg);
        debug!(%local_id, "Local tracking disabled; told the party to stop tracking us");
        Some(msg)
    }

    /// The local party id and sanitized name, or `None` when not in a party
    /// or not logged in.
    fn local_identity(&self) -> Option<(MemberId, MemberName)> {
        let Some(local_id) = self.host.local_member_id() else {
            trace!("Not in a party; nothing to send");
            return None;
        };
        let Some(local_name) = self
            .host
            .local_player_name()
            .and_then(|raw| MemberName::sanitize(&raw))
        else {
            trace!("Local player name unavailable; nothing to send");
            return None;
        };
        Some((local_id, local_name))
    }

    fn report_invalid_readout(&self, raw: i32) {
        report_violation_to!(
            self.observer,
            None,
            ViolationSeverity::Warning,
            ViolationKind::Watcher,
            "local special readout {} is outside 0..={}",
            raw,
            SpecialPercent::MAX_RAW
        );
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
    use crate::TrackerBuilder;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone)]
    struct Host {
        local_name: Option<String>,
        local_id: Option<MemberId>,
        roster: BTreeMap<MemberId, String>,
    }

    impl Host {
        fn alice() -> Self {
            Self {
                local_name: Some("Alice".to_owned()),
                local_id: Some(MemberId::new(1)),
                roster: BTreeMap::from([(MemberId::new(1), "Alice".to_owned())]),
            }
        }
    }

    impl HostContext for Host {
        fn local_player_name(&self) -> Option<String> {
            self.local_name.clone()
        }

        fn local_member_id(&self) -> Option<MemberId> {
            self.local_id
        }

        fn member_display_name(&self, id: MemberId) -> Option<String> {
            self.roster.get(&id).cloned()
        }
    }

    #[derive(Debug, Default)]
    struct Outbox(Vec<PartyMessage>);

    impl PartyTransport for Outbox {
        fn broadcast(&mut self, msg: &PartyMessage) {
            self.0.push(*msg);
        }
    }

    fn tracker(host: Host) -> (PartyTracker<Host, Outbox>, Arc<CollectingObserver>) {
        let collector = Arc::new(CollectingObserver::new());
        let tracker = TrackerBuilder::new()
            .with_violation_observer(collector.clone())
            .start_tracker(host, Outbox::default())
            .unwrap();
        (tracker, collector)
    }

    fn alice() -> MemberName {
        MemberName::sanitize("Alice").unwrap()
    }

    fn special(raw: i32) -> HostEvent {
        HostEvent::SpecialChanged {
            raw,
            game_state: GameState::LoggedIn,
        }
    }

    #[test]
    fn events_before_start_are_ignored() {
        let (mut tracker, _) = tracker(Host::alice());
        assert!(tracker.handle(special(500)).is_none());
        assert!(tracker.handle(HostEvent::Tick).is_none());
        assert!(tracker.transport().0.is_empty());
    }

    #[test]
    fn start_announces_on_first_tick() {
        let (mut tracker, _) = tracker(Host::alice());
        tracker.start(Some(1000));

        let sent = tracker.handle(HostEvent::Tick).unwrap();
        assert_eq!(
            sent,
            PartyMessage::StateUpdate(StateUpdate {
                sender: MemberId::new(1),
                special: SpecialPercent::FULL,
                used_special: false,
            })
        );
        assert!(tracker.handle(HostEvent::Tick).is_none());
    }

    #[test]
    fn spend_is_sent_once_and_applied_locally() {
        let (mut tracker, _) = tracker(Host::alice());
        tracker.start(Some(400));
        tracker.handle(HostEvent::Tick);

        tracker.handle(special(100));
        let sent = tracker.handle(HostEvent::Tick);

        assert_eq!(
            sent,
            Some(PartyMessage::StateUpdate(StateUpdate {
                sender: MemberId::new(1),
                special: SpecialPercent::new(10).unwrap(),
                used_special: true,
            }))
        );
        let entry = tracker.registry().get(&alice()).unwrap();
        assert_eq!(entry.current_special().get(), 10);
        assert_eq!(entry.drain(), DrainState::TrackingDrain { ticks_elapsed: 0 });
        assert_eq!(tracker.transport().0.len(), 2);
    }

    #[test]
    fn drain_indicator_hides_after_tick_display() {
        let (mut tracker, _) = tracker(Host::alice());
        tracker.start(Some(500));
        tracker.handle(HostEvent::ConfigChanged(TrackerConfig {
            tick_display: 2,
            ..TrackerConfig::default()
        }));
        tracker.handle(HostEvent::Tick);
        tracker.handle(special(200));
        tracker.handle(HostEvent::Tick);

        tracker.handle(HostEvent::Tick);
        tracker.handle(HostEvent::Tick);
        assert_eq!(tracker.registry().get(&alice()).unwrap().ticks_since_drain(), Some(2));
        tracker.handle(HostEvent::Tick);
        assert_eq!(tracker.registry().get(&alice()).unwrap().ticks_since_drain(), None);
    }

    #[test]
    fn update_waits_for_party_membership() {
        let mut host = Host::alice();
        host.local_id = None;
        let (mut tracker, _) = tracker(host);
        tracker.start(Some(500));
        tracker.handle(special(300));

        assert!(tracker.handle(HostEvent::Tick).is_none());
        assert!(tracker.registry().is_empty());

        tracker.host_mut().local_id = Some(MemberId::new(1));
        let sent = tracker.handle(HostEvent::Tick).unwrap();
        // The value is announced, the spend made outside the party is not.
        assert!(matches!(
            sent,
            PartyMessage::StateUpdate(update)
                if update.special.get() == 30 && !update.used_special
        ));
        assert_eq!(tracker.registry().get(&alice()).unwrap().ticks_since_drain(), None);
    }

    #[test]
    fn spend_while_disabled_is_not_replayed_on_re_enable() {
        let (mut tracker, _) = tracker(Host::alice());
        tracker.start(Some(1000));
        tracker.handle(HostEvent::Tick);
        tracker.handle(HostEvent::ConfigChanged(TrackerConfig::observer()));

        tracker.handle(special(500));
        for _ in 0..500 {
            assert!(tracker.handle(HostEvent::Tick).is_none());
        }
        tracker.handle(special(1000));
        tracker.handle(HostEvent::ConfigChanged(TrackerConfig::default()));

        let sent = tracker.handle(HostEvent::Tick).unwrap();
        assert_eq!(
            sent,
            PartyMessage::StateUpdate(StateUpdate {
                sender: MemberId::new(1),
                special: SpecialPercent::FULL,
                used_special: false,
            })
        );
        assert_eq!(tracker.registry().get(&alice()).unwrap().drain(), DrainState::NotTracking);
    }

    #[test]
    fn spend_pending_at_disable_is_dropped() {
        let (mut tracker, _) = tracker(Host::alice());
        tracker.start(Some(1000));
        tracker.handle(HostEvent::Tick);

        tracker.handle(special(400));
        tracker.handle(HostEvent::ConfigChanged(TrackerConfig::observer()));
        tracker.handle(HostEvent::ConfigChanged(TrackerConfig::default()));

        let sent = tracker.handle(HostEvent::Tick).unwrap();
        assert!(matches!(
            sent,
            PartyMessage::StateUpdate(update)
                if update.special.get() == 40 && !update.used_special
        ));
    }

    #[test]
    fn update_waits_for_roster_name() {
        let mut host = Host::alice();
        host.roster.insert(MemberId::new(1), "<unknown>".to_owned());
        let (mut tracker, _) = tracker(host);
        tracker.start(Some(500));

        assert!(tracker.handle(HostEvent::Tick).is_none());

        tracker
            .host_mut()
            .roster
            .insert(MemberId::new(1), "Alice".to_owned());
        assert!(tracker.handle(HostEvent::Tick).is_some());
    }

    #[test]
    fn disabled_tracking_sends_nothing() {
        let (mut tracker, _) = tracker(Host::alice());
        tracker.start(Some(500));
        assert!(tracker
            .handle(HostEvent::ConfigChanged(TrackerConfig::observer()))
            .is_none());
        tracker.handle(special(100));

        assert!(tracker.handle(HostEvent::Tick).is_none());
        assert!(tracker.registry().is_empty());
    }

    #[test]
    fn disabling_tracking_broadcasts_stop() {
        let (mut tracker, _) = tracker(Host::alice());
        tracker.start(Some(500));
        tracker.handle(HostEvent::Tick);

        let sent = tracker.handle(HostEvent::ConfigChanged(TrackerConfig::observer()));

        assert_eq!(
            sent,
            Some(PartyMessage::StopTracking(StopTracking {
                sender: MemberId::new(1)
            }))
        );
        assert!(!tracker.registry().contains(&alice()));
    }

    #[test]
    fn re_enabling_tracking_announces() {
        let (mut tracker, _) = tracker(Host::alice());
        tracker.start(Some(500));
        tracker.handle(HostEvent::Tick);
        tracker.handle(HostEvent::ConfigChanged(TrackerConfig::observer()));

        tracker.handle(HostEvent::ConfigChanged(TrackerConfig::default()));
        assert!(tracker.handle(HostEvent::Tick).is_some());
        assert!(tracker.registry().contains(&alice()));
    }

    #[test]
    fn invalid_config_is_reported_and_ignored() {
        let (mut tracker, collector) = tracker(Host::alice());
        tracker.start(None);
        tracker.handle(HostEvent::ConfigChanged(TrackerConfig {
            tick_display: 0,
            ..TrackerConfig::default()
        }));

        assert_eq!(tracker.config().tick_display, 10);
        assert!(collector.has_violation(ViolationKind::Configuration));
    }

    #[test]
    fn invalid_readout_is_reported() {
        let (mut tracker, collector) = tracker(Host::alice());
        tracker.start(Some(-5));
        tracker.handle(special(4000));

        assert!(tracker.watcher().last_known().is_none());
        assert_eq!(collector.violations_of_kind(ViolationKind::Watcher).len(), 2);
    }

    #[test]
    fn transient_zero_during_hop_is_not_broadcast_as_spend() {
        let (mut tracker, _) = tracker(Host::alice());
        tracker.start(Some(1000));
        tracker.handle(HostEvent::Tick);

        tracker.handle(HostEvent::SpecialChanged {
            raw: 0,
            game_state: GameState::Hopping,
        });
        assert!(tracker.handle(HostEvent::Tick).is_none());
    }

    #[test]
    fn shutdown_forgets_everyone() {
        let (mut tracker, _) = tracker(Host::alice());
        tracker.start(Some(1000));
        tracker.handle(HostEvent::Tick);

        tracker.shutdown();
        assert!(!tracker.is_running());
        assert!(tracker.registry().is_empty());
        assert!(tracker.handle(HostEvent::Tick).is_none());
    }

    #[test]
    fn party_change_clears_then_reannounces() {
        let (mut tracker, _) = tracker(Host::alice());
        tracker.start(Some(700));
        tracker.handle(HostEvent::Tick);

        tracker.handle(HostEvent::PartyChanged);
        assert!(tracker.registry().is_empty());

        let sent = tracker.handle(HostEvent::Tick).unwrap();
        assert!(matches!(sent, PartyMessage::StateUpdate(update) if !update.used_special));
    }
}
