//! Tokio synchronization primitives with an optional debug wrapper.
//!
//! - **Default** (production): direct re-exports from `tokio::sync`, zero
//!   overhead.
//! - **`deadlock-detection`**: wraps `Mutex`/`RwLock` with a watchdog that
//!   logs the call site of an acquisition that has not completed within a
//!   few seconds, plus the call site of the last successful acquisition.
//!
//! Every engine in this crate (`LogReplicator`, `LockManager`,
//! `CacheEngine`) is guarded by exactly one of these per instance; the
//! debug build exists to catch accidental cross-engine lock ordering during
//! development, not to change runtime behavior.

#[cfg(any(test, feature = "deadlock-detection"))]
mod mutex;
#[cfg(feature = "deadlock-detection")]
pub use mutex::Mutex;

#[cfg(feature = "deadlock-detection")]
pub use tokio::sync::MutexGuard;

#[cfg(not(feature = "deadlock-detection"))]
mod mutex_release;
#[cfg(not(feature = "deadlock-detection"))]
pub use mutex_release::{Mutex, MutexGuard};
