//! Read-only projection of the registry for the overlay renderer.
//!
//! Nothing here mutates tracker state. An [`OverlayView`] takes one
//! consistent snapshot when it is created, so a frame is never drawn from a
//! half-applied update.

use crate::member::{Member, MemberName};
use crate::sessions::config::TrackerConfig;
use crate::sessions::member_registry::{MemberRegistry, RegistrySnapshot};
use crate::SpecialPercent;

/// Prefix of the drain indicator.
pub const DRAIN_GLYPH: char = '🗲';

/// Visual style of a label.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LabelStyle {
    /// The member meets the "healthy" threshold.
    Standard,
    /// The member is below the threshold.
    Low,
}

/// Text to draw over one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayLabel {
    /// The member this label belongs to.
    pub name: MemberName,
    /// Name and/or value, e.g. `"Alice 45%"`.
    pub text: String,
    /// Ticks since the last spend, e.g. `"🗲3"`, while the indicator is shown.
    pub drain_text: Option<String>,
    /// How to color the label.
    pub style: LabelStyle,
}

/// A snapshot of the registry paired with the settings that govern rendering.
///
/// # Examples
///
/// ```
/// use party_special_sync::{MemberId, MemberName, MemberRegistry, OverlayView, SpecialPercent, TrackerConfig};
///
/// let registry = MemberRegistry::new();
/// let alice = MemberName::sanitize("Alice").unwrap();
/// registry.upsert(alice.clone(), MemberId::new(1), SpecialPercent::new(25).unwrap(), true);
///
/// let config = TrackerConfig { draw_parentheses: true, ..TrackerConfig::default() };
/// let view = OverlayView::new(&config, &registry);
///
/// let label = view.label(&alice).unwrap();
/// assert_eq!(label.text, "Alice (25%)");
/// assert_eq!(label.drain_text.as_deref(), Some("🗲0"));
/// ```
#[derive(Debug, Clone)]
pub struct OverlayView<'a> {
    config: &'a TrackerConfig,
    members: RegistrySnapshot,
}

impl<'a> OverlayView<'a> {
    /// Snapshots `registry` under `config`.
    #[must_use]
    pub fn new(config: &'a TrackerConfig, registry: &MemberRegistry) -> Self {
        Self {
            config,
            members: registry.all(),
        }
    }

    /// Every tracked member, ordered by name.
    #[must_use]
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Looks up one member in the snapshot.
    #[must_use]
    pub fn member(&self, name: &MemberName) -> Option<&Member> {
        self.members.iter().find(|member| member.name() == name)
    }

    /// Whether the overlay should be drawn at all. Off when the local player
    /// broadcasts but asked not to show the tracker.
    #[must_use]
    pub fn overlay_enabled(&self) -> bool {
        !self.config.track_me || self.config.show_as_tracker
    }

    /// `true` if `name` is tracked and passes the allow-list.
    #[must_use]
    pub fn is_visible(&self, name: &MemberName) -> bool {
        self.member(name).is_some() && self.config.allows(&name.folded())
    }

    /// `true` if `value` is at or above the configured threshold.
    #[must_use]
    pub fn meets_threshold(&self, value: SpecialPercent) -> bool {
        value.get() >= self.config.desired_special
    }

    /// Builds the label for `name`, or `None` if the member is not visible or
    /// the render policies hide both the name and the value.
    #[must_use]
    pub fn label(&self, name: &MemberName) -> Option<OverlayLabel> {
        if !self.is_visible(name) {
            return None;
        }
        let member = self.member(name)?;
        let special = member.current_special();
        let healthy = self.meets_threshold(special);

        let name_part = self
            .config
            .name_render
            .should_render(healthy)
            .then(|| member.name().as_str());
        let value_part = self
            .config
            .spec_render
            .should_render(healthy)
            .then(|| self.format_value(special));

        let text = match (name_part, value_part) {
            (None, None) => return None,
            (Some(name), None) => name.to_owned(),
            (None, Some(value)) => value,
            (Some(name), Some(value)) => format!("{name} {value}"),
        };

        Some(OverlayLabel {
            name: member.name().clone(),
            text,
            drain_text: member
                .ticks_since_drain()
                .map(|ticks| format!("{DRAIN_GLYPH}{ticks}")),
            style: if healthy {
                LabelStyle::Standard
            } else {
                LabelStyle::Low
            },
        })
    }

    /// Labels for every drawable member, ordered by name. Empty when the
    /// overlay is disabled.
    #[must_use]
    pub fn labels(&self) -> Vec<OverlayLabel> {
        if !self.overlay_enabled() {
            return Vec::new();
        }
        self.members
            .iter()
            .filter_map(|member| self.label(member.name()))
            .collect()
    }

    fn format_value(&self, special: SpecialPercent) -> String {
        let percent = if self.config.draw_percent_by_name {
            "%"
        } else {
            ""
        };
        if self.config.draw_parentheses {
            format!("({special}{percent})")
        } else {
            format!("{special}{percent}")
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
    use crate::{MemberId, RenderPolicy};

    fn name(raw: &str) -> MemberName {
        MemberName::sanitize(raw).unwrap()
    }

    fn registry() -> MemberRegistry {
        let registry = MemberRegistry::new();
        registry.upsert(name("alice"), MemberId::new(1), SpecialPercent::new(80).unwrap(), false);
        registry.upsert(name("bob"), MemberId::new(7), SpecialPercent::new(20).unwrap(), true);
        registry
    }

    #[test]
    fn allow_list_limits_visibility() {
        let config = TrackerConfig {
            visible_players: vec!["alice".to_owned()],
            ..TrackerConfig::default()
        };
        let registry = registry();
        let view = OverlayView::new(&config, &registry);

        assert!(view.is_visible(&name("alice")));
        assert!(!view.is_visible(&name("bob")));
        assert!(!view.is_visible(&name("carol")));
    }

    #[test]
    fn allow_list_ignores_case() {
        let config = TrackerConfig {
            visible_players: crate::parse_player_list("ALICE"),
            ..TrackerConfig::default()
        };
        let registry = registry();
        let view = OverlayView::new(&config, &registry);
        assert!(view.is_visible(&name("alice")));
        assert!(!view.is_visible(&name("bob")));
    }

    #[test]
    fn threshold_is_inclusive() {
        let config = TrackerConfig::default();
        let registry = MemberRegistry::new();
        let view = OverlayView::new(&config, &registry);
        assert!(view.meets_threshold(SpecialPercent::new(50).unwrap()));
        assert!(!view.meets_threshold(SpecialPercent::new(49).unwrap()));
    }

    #[test]
    fn default_label_shows_name_value_and_drain() {
        let config = TrackerConfig::default();
        let registry = registry();
        let view = OverlayView::new(&config, &registry);

        let bob = view.label(&name("bob")).unwrap();
        assert_eq!(bob.text, "bob 20%");
        assert_eq!(bob.drain_text.as_deref(), Some("🗲0"));
        assert_eq!(bob.style, LabelStyle::Low);

        let alice = view.label(&name("alice")).unwrap();
        assert_eq!(alice.text, "alice 80%");
        assert_eq!(alice.drain_text, None);
        assert_eq!(alice.style, LabelStyle::Standard);
    }

    #[test]
    fn value_only_label_has_no_leading_space() {
        let config = TrackerConfig {
            name_render: RenderPolicy::Never,
            draw_percent_by_name: false,
            ..TrackerConfig::default()
        };
        let registry = registry();
        let view = OverlayView::new(&config, &registry);
        assert_eq!(view.label(&name("alice")).unwrap().text, "80");
    }

    #[test]
    fn low_only_policy_hides_healthy_members() {
        let config = TrackerConfig::low_only();
        let registry = registry();
        let view = OverlayView::new(&config, &registry);

        assert!(view.label(&name("alice")).is_none());
        assert!(view.label(&name("bob")).is_some());
        assert_eq!(view.labels().len(), 1);
    }

    #[test]
    fn hidden_tracker_draws_nothing() {
        let config = TrackerConfig {
            show_as_tracker: false,
            ..TrackerConfig::default()
        };
        let registry = registry();
        let view = OverlayView::new(&config, &registry);
        assert!(!view.overlay_enabled());
        assert!(view.labels().is_empty());

        let config = TrackerConfig {
            track_me: false,
            show_as_tracker: false,
            ..TrackerConfig::default()
        };
        let view = OverlayView::new(&config, &registry);
        assert!(view.overlay_enabled());
    }

    #[test]
    fn snapshot_does_not_follow_later_writes() {
        let config = TrackerConfig::default();
        let registry = registry();
        let view = OverlayView::new(&config, &registry);
        registry.clear();
        assert_eq!(view.members().len(), 2);
    }
}
