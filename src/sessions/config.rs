//! Tracker settings.
//!
//! | Field | Default | Effect |
//! |-------|---------|--------|
//! | `track_me` | `true` | broadcast the local player's energy |
//! | `show_as_tracker` | `true` | keep drawing the overlay while `track_me` is on |
//! | `desired_special` | `50` | "healthy" threshold in percent |
//! | `tick_display` | `10` | ticks before the drain indicator hides |
//! | `visible_players` | empty | case-insensitive allow-list, empty shows everyone |
//! | `name_render` / `spec_render` | `Always` | when to draw each label part |
//! | `draw_percent_by_name` | `true` | append `%` to the value |
//! | `draw_parentheses` | `false` | wrap the value in `()` |
//!
//! # Example
//!
//! ```
//! use party_special_sync::{parse_player_list, RenderPolicy, TrackerConfig};
//!
//! let config = TrackerConfig {
//!     desired_special: 55,
//!     visible_players: parse_player_list("Alice, BOB ,,"),
//!     spec_render: RenderPolicy::WhenBelowThreshold,
//!     ..TrackerConfig::default()
//! };
//! assert!(config.validate().is_ok());
//! assert_eq!(config.visible_players, ["alice", "bob"]);
//! ```

use serde::{Deserialize, Serialize};

use crate::SyncError;

/// When a label part is drawn, relative to the "healthy" threshold.
///
/// ```
/// use party_special_sync::RenderPolicy;
///
/// assert!(RenderPolicy::Always.should_render(true));
/// assert!(!RenderPolicy::Never.should_render(false));
/// assert!(RenderPolicy::WhenBelowThreshold.should_render(false));
/// assert!(!RenderPolicy::WhenBelowThreshold.should_render(true));
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RenderPolicy {
    /// Never draw.
    Never,
    /// Always draw.
    #[default]
    Always,
    /// Draw only while the member is below `desired_special`.
    WhenBelowThreshold,
}

impl RenderPolicy {
    /// Decides whether to draw, given whether the member meets the threshold.
    #[inline]
    #[must_use]
    pub const fn should_render(self, healthy: bool) -> bool {
        match self {
            RenderPolicy::Never => false,
            RenderPolicy::Always => true,
            RenderPolicy::WhenBelowThreshold => !healthy,
        }
    }
}

/// User-facing tracker settings.
///
/// # Forward Compatibility
///
/// New fields may be added to this struct in future versions. Construct it
/// with the `..TrackerConfig::default()` pattern.
///
/// Deserializing fills missing fields with their defaults, so hosts can store
/// a partial settings document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
#[must_use = "TrackerConfig has no effect unless passed to TrackerBuilder::with_config()"]
pub struct TrackerConfig {
    /// Broadcast the local player's energy to the party.
    ///
    /// Default: `true`
    pub track_me: bool,

    /// Keep drawing the overlay while `track_me` is on. When off, the local
    /// client still broadcasts but hides its own overlay.
    ///
    /// Default: `true`
    pub show_as_tracker: bool,

    /// Percentage at or above which a member is "healthy". At most 100.
    ///
    /// Default: 50
    pub desired_special: u8,

    /// Ticks after a spend before the drain indicator hides. At least 1.
    ///
    /// Default: 10
    pub tick_display: u32,

    /// Allow-list of names, compared without regard to case or surrounding
    /// whitespace. Empty shows every tracked member.
    ///
    /// Default: empty
    pub visible_players: Vec<String>,

    /// When to draw the member name.
    ///
    /// Default: [`RenderPolicy::Always`]
    pub name_render: RenderPolicy,

    /// When to draw the energy value.
    ///
    /// Default: [`RenderPolicy::Always`]
    pub spec_render: RenderPolicy,

    /// Append `%` to the value.
    ///
    /// Default: `true`
    pub draw_percent_by_name: bool,

    /// Wrap the value in parentheses.
    ///
    /// Default: `false`
    pub draw_parentheses: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            track_me: true,
            show_as_tracker: true,
            desired_special: 50,
            tick_display: 10,
            visible_players: Vec::new(),
            name_render: RenderPolicy::Always,
            spec_render: RenderPolicy::Always,
            draw_percent_by_name: true,
            draw_parentheses: false,
        }
    }
}

impl TrackerConfig {
    /// Creates a `TrackerConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for a player who only watches: nothing is broadcast, the
    /// overlay stays on.
    pub fn observer() -> Self {
        Self {
            track_me: false,
            ..Self::default()
        }
    }

    /// Preset that only draws members who are short on energy.
    pub fn low_only() -> Self {
        Self {
            name_render: RenderPolicy::WhenBelowThreshold,
            spec_render: RenderPolicy::WhenBelowThreshold,
            ..Self::default()
        }
    }

    /// Returns `true` if `folded_name` (lowercase) passes the allow-list.
    /// Entries match regardless of case, so a hand-built list works like
    /// one from [`parse_player_list`].
    #[must_use]
    pub fn allows(&self, folded_name: &str) -> bool {
        self.visible_players.is_empty()
            || self
                .visible_players
                .iter()
                .any(|name| name.trim().eq_ignore_ascii_case(folded_name))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if `desired_special` exceeds 100
    /// or `tick_display` is zero.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.desired_special > 100 {
            return Err(SyncError::InvalidConfig {
                info: format!(
                    "desired_special must be within 0..=100, got {}",
                    self.desired_special
                ),
            });
        }

        if self.tick_display == 0 {
            return Err(SyncError::InvalidConfig {
                info: "tick_display must be at least 1".to_owned(),
            });
        }

        Ok(())
    }

    /// Loads settings from a JSON document. Missing fields take their
    /// defaults; the result is validated.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if the document does not parse or
    /// the settings are out of range.
    #[cfg(feature = "json")]
    pub fn from_json(json: &str) -> Result<Self, SyncError> {
        let config: Self = serde_json::from_str(json).map_err(|err| SyncError::InvalidConfig {
            info: format!("settings document: {err}"),
        })?;
        config.validate()?;
        Ok(config)
    }
}

/// Parses the comma-separated allow-list setting: entries are lowercased and
/// trimmed, empty entries are dropped.
#[must_use]
pub fn parse_player_list(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(|entry| entry.trim().to_lowercase())
        .filter(|entry| !entry.is_empty())
        .collect()
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

    #[test]
    fn defaults_match_documented_values() {
        let config = TrackerConfig::default();
        assert!(config.track_me);
        assert!(config.show_as_tracker);
        assert_eq!(config.desired_special, 50);
        assert_eq!(config.tick_display, 10);
        assert!(config.visible_players.is_empty());
        assert_eq!(config.name_render, RenderPolicy::Always);
        assert_eq!(config.spec_render, RenderPolicy::Always);
        assert!(config.draw_percent_by_name);
        assert!(!config.draw_parentheses);
        assert_eq!(TrackerConfig::new(), config);
    }

    #[test]
    fn presets_are_valid() {
        for config in [
            TrackerConfig::default(),
            TrackerConfig::observer(),
            TrackerConfig::low_only(),
        ] {
            assert!(config.validate().is_ok(), "{config:?}");
        }
    }

    #[test]
    fn threshold_above_hundred_is_rejected() {
        let config = TrackerConfig {
            desired_special: 101,
            ..TrackerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SyncError::InvalidConfig { info }) if info.contains("desired_special")
        ));
    }

    #[test]
    fn zero_tick_display_is_rejected() {
        let config = TrackerConfig {
            tick_display: 0,
            ..TrackerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn player_list_is_lowercased_and_trimmed() {
        assert_eq!(parse_player_list(" Alice ,bob,, CAROL"), ["alice", "bob", "carol"]);
        assert!(parse_player_list("").is_empty());
        assert!(parse_player_list(" , ").is_empty());
    }

    #[test]
    fn empty_allow_list_shows_everyone() {
        let config = TrackerConfig::default();
        assert!(config.allows("anyone"));

        let config = TrackerConfig {
            visible_players: vec!["alice".to_owned()],
            ..TrackerConfig::default()
        };
        assert!(config.allows("alice"));
        assert!(!config.allows("bob"));
    }

    #[test]
    fn hand_built_allow_list_ignores_case() {
        let config = TrackerConfig {
            visible_players: vec!["Alice".to_owned(), " BOB ".to_owned()],
            ..TrackerConfig::default()
        };
        assert!(config.allows("alice"));
        assert!(config.allows("bob"));
        assert!(!config.allows("carol"));
    }

    #[test]
    fn partial_settings_document_fills_defaults() {
        let config: TrackerConfig =
            serde_json::from_str(r#"{ "track_me": false, "tick_display": 4 }"#).unwrap();
        assert!(!config.track_me);
        assert_eq!(config.tick_display, 4);
        assert_eq!(config.desired_special, 50);
    }
}
