//! Structured telemetry pipeline for tolerated anomalies.
//!
//! Nothing in the tracking core is fatal: a message from an unknown sender is
//! dropped, a leave for an unknown id is ignored, a bad readout is skipped.
//! Those paths still deserve to be observable. Instead of only logging with
//! `tracing::warn!`, anomalies are structured data that can be:
//!
//! - Logged via tracing (default behavior)
//! - Collected programmatically for testing
//! - Sent to custom observers (metrics, alerting, etc.)
//!
//! # Example
//!
//! ```
//! use party_special_sync::telemetry::{CollectingObserver, ViolationKind};
//! use std::sync::Arc;
//!
//! // Create a collecting observer for tests
//! let observer = Arc::new(CollectingObserver::new());
//!
//! // Check violations after some operations
//! assert!(observer.violations().is_empty(), "unexpected violations");
//! assert!(!observer.has_violation(ViolationKind::Registry));
//! ```

use crate::MemberId;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Severity of a violation.
///
/// Severities are ordered from least to most severe, allowing filtering
/// and comparison operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// Unexpected but recoverable - operation continued with fallback.
    Warning,
    /// Serious issue - an overlay entry may be stale until the next update.
    Error,
    /// Critical invariant broken - registry contents may be wrong.
    Critical,
}

impl ViolationSeverity {
    /// Returns a string representation suitable for logging/metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categories of violations, one per subsystem.
///
/// # Forward Compatibility
///
/// This enum is marked `#[non_exhaustive]` because new categories may be
/// added in future versions. Always include a wildcard arm when matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ViolationKind {
    /// Member registry invariant touched.
    ///
    /// Examples:
    /// - Two names claiming the same member id
    Registry,
    /// Party message handling issue.
    ///
    /// Examples:
    /// - Undecodable bytes from the transport
    Protocol,
    /// Local state watcher issue.
    ///
    /// Examples:
    /// - Raw readout outside 0..=1000
    Watcher,
    /// Configuration constraint violated.
    ///
    /// Examples:
    /// - Runtime config update with a threshold above 100
    Configuration,
    /// Internal logic error (should never happen).
    InternalError,
}

impl ViolationKind {
    /// Returns a string representation suitable for logging/metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::Protocol => "protocol",
            Self::Watcher => "watcher",
            Self::Configuration => "configuration",
            Self::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded violation.
///
/// # Example
///
/// ```
/// use party_special_sync::telemetry::{Violation, ViolationSeverity, ViolationKind};
/// use party_special_sync::MemberId;
///
/// let violation = Violation::new(
///     ViolationSeverity::Warning,
///     ViolationKind::Registry,
///     "member id claimed by two names",
///     "registry.rs:42",
/// ).with_member(MemberId::new(7))
///  .with_context("previous", "bob");
///
/// assert_eq!(violation.member, Some(MemberId::new(7)));
/// assert_eq!(violation.context.get("previous").map(String::as_str), Some("bob"));
/// ```
#[derive(Debug, Clone, serde::Serialize)]
pub struct Violation {
    /// The severity level of this violation.
    pub severity: ViolationSeverity,
    /// The subsystem where the violation occurred.
    pub kind: ViolationKind,
    /// Human-readable description of what went wrong.
    pub message: String,
    /// Source location where the violation was detected (file:line).
    pub location: &'static str,
    /// The party member involved, if any.
    pub member: Option<MemberId>,
    /// Additional structured context as key-value pairs.
    pub context: BTreeMap<String, String>,
}

impl Violation {
    /// Creates a new violation.
    #[must_use]
    pub fn new(
        severity: ViolationSeverity,
        kind: ViolationKind,
        message: impl Into<String>,
        location: &'static str,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            location,
            member: None,
            context: BTreeMap::new(),
        }
    }

    /// Sets the member this violation concerns.
    #[must_use]
    pub fn with_member(mut self, member: MemberId) -> Self {
        self.member = Some(member);
        self
    }

    /// Adds a context key-value pair.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Serializes this violation to a JSON string.
    ///
    /// Returns `None` if serialization fails.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}/{}] {} (at {}",
            self.severity, self.kind, self.message, self.location
        )?;
        if let Some(member) = self.member {
            write!(f, ", member={member}")?;
        }
        if !self.context.is_empty() {
            write!(f, ", context={:?}", self.context)?;
        }
        write!(f, ")")
    }
}

/// Trait for observing violations.
///
/// Observers are shared between the tick path and the transport's receive
/// thread, so they must be `Send + Sync`.
///
/// # Example
///
/// ```
/// use party_special_sync::telemetry::{ViolationObserver, Violation};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// #[derive(Default)]
/// struct CountingObserver(AtomicUsize);
///
/// impl ViolationObserver for CountingObserver {
///     fn on_violation(&self, _violation: &Violation) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait ViolationObserver: Send + Sync {
    /// Called when a violation is detected.
    ///
    /// This runs inline on the tick or receive path; keep it quick.
    fn on_violation(&self, violation: &Violation);
}

/// Built-in observer that logs violations via the `tracing` crate.
///
/// - `Warning` severity → `tracing::warn!`
/// - `Error` and `Critical` severity → `tracing::error!`
///
/// All fields are emitted as structured tracing fields.
#[derive(Debug, Default, Clone)]
pub struct TracingObserver;

impl TracingObserver {
    /// Creates a new tracing observer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn format_member(member: Option<MemberId>) -> String {
        member.map_or_else(|| "none".to_owned(), |id| id.to_string())
    }
}

impl ViolationObserver for TracingObserver {
    fn on_violation(&self, violation: &Violation) {
        let severity = violation.severity.as_str();
        let kind = violation.kind.as_str();
        let location = violation.location;
        let member = Self::format_member(violation.member);
        let context = if violation.context.is_empty() {
            "{}".to_owned()
        } else {
            let pairs: Vec<String> = violation
                .context
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            format!("{{{}}}", pairs.join(", "))
        };

        match violation.severity {
            ViolationSeverity::Warning => {
                tracing::warn!(
                    severity,
                    kind,
                    location,
                    member = %member,
                    context = %context,
                    "{}",
                    violation.message
                );
            },
            ViolationSeverity::Error | ViolationSeverity::Critical => {
                tracing::error!(
                    severity,
                    kind,
                    location,
                    member = %member,
                    context = %context,
                    "{}",
                    violation.message
                );
            },
        }
    }
}

/// Built-in observer that collects violations for testing.
///
/// # Example
///
/// ```
/// use party_special_sync::telemetry::{CollectingObserver, ViolationKind, ViolationObserver, Violation, ViolationSeverity};
///
/// let observer = CollectingObserver::new();
///
/// observer.on_violation(&Violation::new(
///     ViolationSeverity::Warning,
///     ViolationKind::Protocol,
///     "test violation",
///     "test.rs:1",
/// ));
///
/// assert_eq!(observer.len(), 1);
/// assert!(observer.has_violation(ViolationKind::Protocol));
/// ```
#[derive(Debug, Default)]
pub struct CollectingObserver {
    violations: Mutex<Vec<Violation>>,
}

impl CollectingObserver {
    /// Creates a new collecting observer with an empty violation list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            violations: Mutex::new(Vec::new()),
        }
    }

    /// Returns a copy of all collected violations.
    #[must_use]
    pub fn violations(&self) -> Vec<Violation> {
        self.violations.lock().clone()
    }

    /// Returns the number of collected violations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.violations.lock().len()
    }

    /// Returns true if no violations have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.lock().is_empty()
    }

    /// Checks if any violation of the specified kind has been collected.
    #[must_use]
    pub fn has_violation(&self, kind: ViolationKind) -> bool {
        self.violations.lock().iter().any(|v| v.kind == kind)
    }

    /// Returns all violations matching the specified kind.
    #[must_use]
    pub fn violations_of_kind(&self, kind: ViolationKind) -> Vec<Violation> {
        self.violations.lock()
            .iter()
            .filter(|v| v.kind == kind)
            .cloned()
            .collect()
    }

    /// Clears all collected violations.
    pub fn clear(&self) {
        self.violations.lock().clear();
    }
}

impl ViolationObserver for CollectingObserver {
    fn on_violation(&self, violation: &Violation) {
        self.violations.lock().push(violation.clone());
    }
}

/// A composite observer that forwards violations to multiple observers.
///
/// Useful when you want to both log violations and collect them for testing.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn ViolationObserver>>,
}

impl CompositeObserver {
    /// Creates a new composite observer with no child observers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    /// Adds an observer to the composite.
    pub fn add(&mut self, observer: Arc<dyn ViolationObserver>) {
        self.observers.push(observer);
    }
}

impl ViolationObserver for CompositeObserver {
    fn on_violation(&self, violation: &Violation) {
        for observer in &self.observers {
            observer.on_violation(violation);
        }
    }
}

impl std::fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("num_observers", &self.observers.len())
            .finish()
    }
}

/// Macro for reporting violations to the default [`TracingObserver`] with
/// location tracking.
///
/// ```
/// use party_special_sync::{report_violation, telemetry::{ViolationSeverity, ViolationKind}};
///
/// let raw = 1200;
/// report_violation!(ViolationSeverity::Warning, ViolationKind::Watcher,
///     "raw readout {} out of range", raw);
/// ```
#[macro_export]
macro_rules! report_violation {
    ($severity:expr, $kind:expr, $msg:literal) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::Violation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};

    ($severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::Violation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};
}

/// Like [`report_violation!`], but reports to an explicit
/// `Arc<dyn ViolationObserver>` and lets the caller attach a member id.
///
/// ```
/// use party_special_sync::{report_violation_to, MemberId};
/// use party_special_sync::telemetry::{CollectingObserver, ViolationKind, ViolationObserver, ViolationSeverity};
/// use std::sync::Arc;
///
/// let collector = Arc::new(CollectingObserver::new());
/// let observer: Arc<dyn ViolationObserver> = collector.clone();
/// report_violation_to!(observer, Some(MemberId::new(3)), ViolationSeverity::Warning,
///     ViolationKind::Protocol, "legacy report out of range");
/// assert!(collector.has_violation(ViolationKind::Protocol));
/// ```
#[macro_export]
macro_rules! report_violation_to {
    ($observer:expr, $member:expr, $severity:expr, $kind:expr, $msg:literal) => {{
        use $crate::telemetry::ViolationObserver as _;
        let mut violation = $crate::telemetry::Violation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        violation.member = $member;
        $observer.on_violation(&violation);
    }};

    ($observer:expr, $member:expr, $severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        use $crate::telemetry::ViolationObserver as _;
        let mut violation = $crate::telemetry::Violation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        violation.member = $member;
        $observer.on_violation(&violation);
    }};
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

    fn sample(kind: ViolationKind) -> Violation {
        Violation::new(ViolationSeverity::Warning, kind, "sample", "test.rs:1")
    }

    #[test]
    fn severity_orders_from_warning_to_critical() {
        assert!(ViolationSeverity::Warning < ViolationSeverity::Error);
        assert!(ViolationSeverity::Error < ViolationSeverity::Critical);
    }

    #[test]
    fn display_includes_member_and_context() {
        let violation = sample(ViolationKind::Registry)
            .with_member(MemberId::new(9))
            .with_context("name", "carol");
        let text = violation.to_string();
        assert!(text.starts_with("[warning/registry] sample"));
        assert!(text.contains("member=9"));
        assert!(text.contains("carol"));
    }

    #[test]
    fn collecting_observer_filters_by_kind() {
        let observer = CollectingObserver::new();
        observer.on_violation(&sample(ViolationKind::Protocol));
        observer.on_violation(&sample(ViolationKind::Watcher));
        observer.on_violation(&sample(ViolationKind::Protocol));

        assert_eq!(observer.len(), 3);
        assert_eq!(observer.violations_of_kind(ViolationKind::Protocol).len(), 2);
        assert!(!observer.has_violation(ViolationKind::Registry));

        observer.clear();
        assert!(observer.is_empty());
    }

    #[test]
    fn composite_forwards_to_every_child() {
        let first = Arc::new(CollectingObserver::new());
        let second = Arc::new(CollectingObserver::new());
        let mut composite = CompositeObserver::new();
        composite.add(first.clone());
        composite.add(second.clone());

        composite.on_violation(&sample(ViolationKind::Configuration));

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn report_violation_to_attaches_member() {
        let collector = Arc::new(CollectingObserver::new());
        let observer: Arc<dyn ViolationObserver> = collector.clone();
        report_violation_to!(
            observer,
            Some(MemberId::new(4)),
            ViolationSeverity::Error,
            ViolationKind::Registry,
            "member {} vanished",
            4
        );
        let recorded = collector.violations();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].member, Some(MemberId::new(4)));
        assert_eq!(recorded[0].message, "member 4 vanished");
    }

    #[cfg(feature = "json")]
    #[test]
    fn to_json_uses_snake_case_labels() {
        let json = sample(ViolationKind::InternalError).to_json().unwrap();
        assert!(json.contains(r#""severity":"warning""#));
        assert!(json.contains(r#""kind":"internal_error""#));
    }
}
