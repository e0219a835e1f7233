//! Common test infrastructure shared across integration tests.
//!
//! This module provides:
//! - `stubs`: a scriptable [`HostContext`] and a transport that records
//!   every broadcast
//! - `party`: a multi-member loopback party with seeded message loss
//!
//! # Usage
//!
//! From any integration test entry file:
//! ```ignore
//! #[path = "common/mod.rs"]
//! mod common;
//! use common::{LoopbackParty, RecordingTransport, StubHost};
//! ```
//!
//! [`HostContext`]: party_special_sync::HostContext

pub mod party;

// Not every integration crate uses every helper.
#[allow(unused_imports)]
pub use party::{LoopbackParty, PartyMember};
#[allow(unused_imports)]
pub use stubs::{name, pct, raw_special, RecordingTransport, StubHost};
