//! Overlay projection over a live tracker.

use crate::common::{name, raw_special, LoopbackParty};
use party_special_sync::overlay::DRAIN_GLYPH;
use party_special_sync::{parse_player_list, HostEvent, LabelStyle, RenderPolicy, TrackerConfig};

fn party_with_values(config: &TrackerConfig) -> LoopbackParty {
    let mut party = LoopbackParty::with_config(&["Alice", "Bob", "Carol"], config);
    party.start_all(100);
    party.tick();
    party.set_special(1, 30);
    party.set_special(2, 75);
    party.tick();
    party
}

#[test]
fn allow_list_limits_labels() {
    let config = TrackerConfig {
        visible_players: parse_player_list("alice"),
        ..TrackerConfig::default()
    };
    let party = party_with_values(&config);
    let view = party.member(0).tracker.overlay();

    assert_eq!(view.members().len(), 3);
    assert!(view.is_visible(&name("Alice")));
    assert!(!view.is_visible(&name("Bob")));

    let labels = view.labels();
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].name, name("Alice"));
}

#[test]
fn hand_built_allow_list_matches_any_case() {
    let config = TrackerConfig {
        visible_players: vec!["Carol".to_owned()],
        ..TrackerConfig::default()
    };
    let party = party_with_values(&config);
    let labels = party.member(0).tracker.overlay().labels();

    let names: Vec<_> = labels.iter().map(|label| label.name.as_str()).collect();
    assert_eq!(names, ["Carol"]);
}

#[test]
fn low_members_are_styled_and_show_drain() {
    let party = party_with_values(&TrackerConfig::default());
    let view = party.member(0).tracker.overlay();

    let bob = view.label(&name("Bob")).unwrap();
    assert_eq!(bob.text, "Bob 30%");
    assert_eq!(bob.style, LabelStyle::Low);
    assert_eq!(bob.drain_text, Some(format!("{DRAIN_GLYPH}0")));

    let alice = view.label(&name("Alice")).unwrap();
    assert_eq!(alice.style, LabelStyle::Standard);
    assert_eq!(alice.drain_text, None);
}

#[test]
fn low_only_preset_hides_healthy_members() {
    let party = party_with_values(&TrackerConfig::low_only());
    let labels = party.member(0).tracker.overlay().labels();

    let names: Vec<_> = labels.iter().map(|label| label.name.as_str()).collect();
    assert_eq!(names, ["Bob"]);
}

#[test]
fn value_only_rendering() {
    let config = TrackerConfig {
        name_render: RenderPolicy::Never,
        draw_percent_by_name: false,
        draw_parentheses: true,
        ..TrackerConfig::default()
    };
    let party = party_with_values(&config);
    let view = party.member(2).tracker.overlay();

    assert_eq!(view.label(&name("Carol")).unwrap().text, "(75)");
}

#[test]
fn hidden_tracker_still_broadcasts() {
    let config = TrackerConfig {
        show_as_tracker: false,
        ..TrackerConfig::default()
    };
    let mut party = party_with_values(&config);

    assert!(party.member(0).tracker.overlay().labels().is_empty());
    assert!(!party.member(0).tracker.overlay().overlay_enabled());

    // Peers still hear Alice.
    party.set_special(0, 20);
    party.tick();
    let bob_view = party.member(1).tracker.overlay();
    assert_eq!(
        bob_view.member(&name("Alice")).map(|m| m.current_special().get()),
        Some(20)
    );
}

#[test]
fn observers_keep_their_overlay() {
    let mut party = party_with_values(&TrackerConfig::default());
    party
        .member_mut(0)
        .tracker
        .handle(HostEvent::ConfigChanged(TrackerConfig {
            show_as_tracker: false,
            ..TrackerConfig::observer()
        }));
    party.deliver();

    let view = party.member(0).tracker.overlay();
    assert!(view.overlay_enabled());
    assert_eq!(view.labels().len(), 2);
    // Everyone else dropped Alice after her stop message.
    assert!(party.member(1).tracker.registry().get(&name("Alice")).is_none());
}

#[test]
fn view_is_a_snapshot() {
    let mut party = party_with_values(&TrackerConfig::default());
    let before: Vec<_> = party
        .member(0)
        .tracker
        .overlay()
        .labels()
        .into_iter()
        .map(|label| label.text)
        .collect();

    party.member_mut(0).tracker.handle(raw_special(5));
    party.tick();

    assert_eq!(before, ["Alice 100%", "Bob 30%", "Carol 75%"]);
    assert_eq!(
        party.member(0).tracker.overlay().label(&name("Alice")).unwrap().text,
        "Alice 5%"
    );
}
