//! Synchronization primitives abstraction for loom testing compatibility.
//!
//! The member registry is written from the host's tick thread and from the
//! transport's receive thread. Production builds use `parking_lot` locks;
//! loom builds (`RUSTFLAGS="--cfg loom"`) swap in `loom::sync` so the
//! `loom-tests/` crate can explore every interleaving.
//!
//! Import from this module instead of directly from `parking_lot`:
//!
//! ```ignore
//! use crate::sync::{read, write, Arc, RwLock};
//! ```
//!
//! `read` and `write` hide the one API difference that matters here: loom's
//! locks return a `LockResult`, `parking_lot`'s never poison.
//!
//! Run loom tests from the isolated `loom-tests/` crate:
//! ```bash
//! cd loom-tests
//! RUSTFLAGS="--cfg loom" cargo test --release
//! ```

/// When running under loom (`RUSTFLAGS="--cfg loom"`), use loom's types
#[cfg(loom)]
pub(crate) mod inner {
    pub use loom::sync::Arc;
    pub use loom::sync::RwLock;
    pub use loom::sync::{RwLockReadGuard, RwLockWriteGuard};

    /// Acquires a shared read guard, recovering from poisoning.
    #[inline]
    pub fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
        lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Acquires an exclusive write guard, recovering from poisoning.
    #[inline]
    pub fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
        lock.write().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// In production, use parking_lot for performance
#[cfg(not(loom))]
pub(crate) mod inner {
    pub use parking_lot::RwLock;
    pub use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
    pub use std::sync::Arc;

    #[inline]
    pub fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
        lock.read()
    }

    #[inline]
    pub fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
        lock.write()
    }
}

// Re-export at module level for convenience
pub(crate) use inner::*;
