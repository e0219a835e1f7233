//! [`TrackerBuilder`]: collects settings and a violation observer, then binds
//! a [`PartyTracker`](crate::PartyTracker) to a host and a transport.

use std::sync::Arc;

use crate::{
    sessions::config::TrackerConfig,
    telemetry::{TracingObserver, ViolationObserver},
    HostContext, PartyTracker, PartyTransport, SyncError,
};

/// The [`TrackerBuilder`] builds a [`PartyTracker`].
///
/// After setting all appropriate values, use
/// [`start_tracker`](Self::start_tracker) to consume the builder.
///
/// ```
/// use party_special_sync::prelude::*;
/// use party_special_sync::telemetry::CollectingObserver;
/// use std::sync::Arc;
///
/// struct Offline;
///
/// impl HostContext for Offline {
///     fn local_player_name(&self) -> Option<String> { None }
///     fn local_member_id(&self) -> Option<MemberId> { None }
///     fn member_display_name(&self, _: MemberId) -> Option<String> { None }
/// }
///
/// struct Discard;
///
/// impl PartyTransport for Discard {
///     fn broadcast(&mut self, _: &PartyMessage) {}
/// }
///
/// let observer = Arc::new(CollectingObserver::new());
/// let tracker = TrackerBuilder::new()
///     .with_config(TrackerConfig { tick_display: 5, ..TrackerConfig::default() })
///     .with_violation_observer(observer.clone())
///     .start_tracker(Offline, Discard)?;
/// assert_eq!(tracker.config().tick_display, 5);
/// # Ok::<(), SyncError>(())
/// ```
#[must_use = "TrackerBuilder must be consumed by calling start_tracker"]
pub struct TrackerBuilder {
    config: TrackerConfig,
    /// Optional observer for tolerated anomalies.
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl std::fmt::Debug for TrackerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure to ensure all fields are included when new fields are added.
        let Self {
            config,
            violation_observer,
        } = self;

        f.debug_struct("TrackerBuilder")
            .field("config", config)
            .field("has_violation_observer", &violation_observer.is_some())
            .finish()
    }
}

impl Default for TrackerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackerBuilder {
    /// Construct a new builder with all values set to their defaults.
    pub fn new() -> Self {
        Self {
            config: TrackerConfig::default(),
            violation_observer: None,
        }
    }

    /// Sets the tracker settings. They are validated when the tracker starts.
    pub fn with_config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    /// Routes tolerated anomalies (duplicate ids, undecodable messages,
    /// rejected settings) to `observer` instead of plain `tracing` output.
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Consumes the builder to construct a [`PartyTracker`] bound to `host`
    /// and `transport`. The tracker stays idle until
    /// [`PartyTracker::start`] is called.
    ///
    /// # Errors
    /// - Returns [`SyncError::InvalidConfig`] if the configuration is invalid.
    pub fn start_tracker<H, T>(self, host: H, transport: T) -> Result<PartyTracker<H, T>, SyncError>
    where
        H: HostContext,
        T: PartyTransport,
    {
        self.config.validate()?;
        let observer = self
            .violation_observer
            .unwrap_or_else(|| Arc::new(TracingObserver));
        Ok(PartyTracker::new(host, transport, self.config, observer))
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
    use crate::{MemberId, PartyMessage};

    struct NoHost;

    impl HostContext for NoHost {
        fn local_player_name(&self) -> Option<String> {
            None
        }

        fn local_member_id(&self) -> Option<MemberId> {
            None
        }

        fn member_display_name(&self, _: MemberId) -> Option<String> {
            None
        }
    }

    struct NoTransport;

    impl PartyTransport for NoTransport {
        fn broadcast(&mut self, _: &PartyMessage) {}
    }

    #[test]
    fn invalid_config_fails_to_start() {
        let result = TrackerBuilder::new()
            .with_config(TrackerConfig {
                desired_special: 150,
                ..TrackerConfig::default()
            })
            .start_tracker(NoHost, NoTransport);
        assert!(matches!(result, Err(SyncError::InvalidConfig { .. })));
    }

    #[test]
    fn started_tracker_is_idle() {
        let tracker = TrackerBuilder::default()
            .start_tracker(NoHost, NoTransport)
            .unwrap();
        assert!(!tracker.is_running());
        assert!(tracker.registry().is_empty());
    }

    #[test]
    fn debug_hides_observer() {
        let text = format!("{:?}", TrackerBuilder::new());
        assert!(text.contains("has_violation_observer: false"));
    }
}
