//! Convenient re-exports for common usage.
//!
//! ```rust
//! use party_special_sync::prelude::*;
//! ```
//!
//! # What's Included
//!
//! - **Tracker**: [`PartyTracker`], [`TrackerBuilder`], [`PeerReceiver`]
//! - **Host seams**: [`HostContext`], [`PartyTransport`], [`HostEvent`], [`GameState`]
//! - **Values**: [`MemberId`], [`MemberName`], [`SpecialPercent`], [`SpecialReading`], [`DrainState`]
//! - **Messages**: [`PartyMessage`], [`StateUpdate`], [`StopTracking`]
//! - **Registry and overlay**: [`MemberRegistry`], [`Member`], [`OverlayView`], [`OverlayLabel`]
//! - **Configuration**: [`TrackerConfig`], [`RenderPolicy`]
//! - **Errors**: [`SyncError`]

pub use crate::{
    DrainState, GameState, HostContext, HostEvent, LabelStyle, Member, MemberId, MemberName,
    MemberRegistry, OverlayLabel, OverlayView, PartyMessage, PartyTracker, PartyTransport,
    PeerReceiver, ReceiveOutcome, RenderPolicy, SpecialPercent, SpecialReading, StateUpdate,
    StopTracking, SyncError, TrackerBuilder, TrackerConfig,
};
