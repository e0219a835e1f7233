//! Tracked party members and the sanitized names that key them.

use serde::{Deserialize, Serialize};

use crate::drain_timer::DrainState;
use crate::{MemberId, SpecialPercent};

/// Placeholder the party roster shows before a member's real name arrives.
pub const UNKNOWN_MEMBER_NAME: &str = "<unknown>";

/// A sanitized player display name, the registry key.
///
/// Names are normalized so that the same player compares equal no matter
/// which surface reported them: markup tags are stripped, non-breaking spaces,
/// underscores and hyphens become plain spaces, non-ASCII characters are
/// dropped, and surrounding whitespace is trimmed.
///
/// # Examples
///
/// ```
/// use party_special_sync::MemberName;
///
/// let name = MemberName::sanitize("<col=ff0000>Iron_Mule</col>").unwrap();
/// assert_eq!(name.as_str(), "Iron Mule");
/// assert_eq!(name.folded(), "iron mule");
///
/// assert!(MemberName::sanitize("<unknown>").is_none());
/// assert!(MemberName::sanitize("   ").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberName(String);

impl MemberName {
    /// Sanitizes a raw display name. Returns `None` for the reserved
    /// [`UNKNOWN_MEMBER_NAME`] placeholder or for names that are empty once
    /// cleaned.
    #[must_use]
    pub fn sanitize(raw: &str) -> Option<Self> {
        if raw == UNKNOWN_MEMBER_NAME {
            return None;
        }

        let mut cleaned = String::with_capacity(raw.len());
        let mut in_tag = false;
        for c in raw.chars() {
            match c {
                '<' => in_tag = true,
                '>' if in_tag => in_tag = false,
                _ if in_tag => {},
                '\u{00A0}' | '_' | '-' => cleaned.push(' '),
                c if c.is_ascii() => cleaned.push(c),
                _ => {},
            }
        }

        let trimmed = cleaned.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(MemberName(trimmed.to_owned()))
        }
    }

    /// Returns the sanitized name.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the lowercase form used for allow-list comparison.
    #[must_use]
    pub fn folded(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl std::fmt::Display for MemberName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MemberName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One tracked party participant.
///
/// `Member` values handed out by the registry are copies taken under the
/// registry lock; they never change underneath the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    name: MemberName,
    member_id: MemberId,
    current_special: SpecialPercent,
    drain: DrainState,
}

impl Member {
    /// Creates a member that is not draining.
    #[must_use]
    pub fn new(name: MemberName, member_id: MemberId, current_special: SpecialPercent) -> Self {
        Self {
            name,
            member_id,
            current_special,
            drain: DrainState::NotTracking,
        }
    }

    /// The sanitized name this member is keyed by.
    #[must_use]
    pub fn name(&self) -> &MemberName {
        &self.name
    }

    /// The party id last seen for this member.
    #[must_use]
    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    /// Last reported energy.
    #[must_use]
    pub fn current_special(&self) -> SpecialPercent {
        self.current_special
    }

    /// Drain countdown state.
    #[must_use]
    pub fn drain(&self) -> DrainState {
        self.drain
    }

    /// Ticks since the last spend, or `None` when the indicator is hidden.
    #[must_use]
    pub fn ticks_since_drain(&self) -> Option<u32> {
        self.drain.ticks_elapsed()
    }

    /// Applies a fresh report. The drain countdown restarts only when
    /// `used_special` is set; a plain value change leaves it alone.
    pub(crate) fn apply_report(
        &mut self,
        member_id: MemberId,
        special: SpecialPercent,
        used_special: bool,
    ) {
        self.member_id = member_id;
        self.current_special = special;
        if used_special {
            self.drain.start();
        }
    }

    /// Advances the drain countdown by one tick.
    pub(crate) fn advance_drain(&mut self, display_threshold: u32) -> DrainState {
        self.drain.advance(display_threshold)
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

    fn pct(value: u8) -> SpecialPercent {
        SpecialPercent::new(value).unwrap()
    }

    #[test]
    fn sanitize_strips_tags_and_separators() {
        let name = MemberName::sanitize("<img=2>Zezima-Main").unwrap();
        assert_eq!(name.as_str(), "Zezima Main");
    }

    #[test]
    fn sanitize_replaces_non_breaking_space() {
        let name = MemberName::sanitize("B\u{00A0}Gata").unwrap();
        assert_eq!(name.as_str(), "B Gata");
    }

    #[test]
    fn sanitize_drops_non_ascii_and_trims() {
        let name = MemberName::sanitize("  Ålice\u{2603}  ").unwrap();
        assert_eq!(name.as_str(), "lice");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let once = MemberName::sanitize("<b>Iron_Mule</b>").unwrap();
        let twice = MemberName::sanitize(once.as_str()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_placeholder_is_rejected() {
        assert!(MemberName::sanitize(UNKNOWN_MEMBER_NAME).is_none());
    }

    #[test]
    fn tag_only_names_are_rejected() {
        assert!(MemberName::sanitize("<col=ffffff></col>").is_none());
    }

    #[test]
    fn report_without_use_keeps_drain_state() {
        let name = MemberName::sanitize("alice").unwrap();
        let mut member = Member::new(name, MemberId::new(1), pct(100));
        member.apply_report(MemberId::new(2), pct(60), true);
        member.advance_drain(10);
        member.apply_report(MemberId::new(2), pct(70), false);

        assert_eq!(member.current_special(), pct(70));
        assert_eq!(member.ticks_since_drain(), Some(1));
    }

    #[test]
    fn report_restamps_member_id() {
        let name = MemberName::sanitize("alice").unwrap();
        let mut member = Member::new(name, MemberId::new(1), pct(100));
        member.apply_report(MemberId::new(42), pct(100), false);
        assert_eq!(member.member_id(), MemberId::new(42));
    }
}
