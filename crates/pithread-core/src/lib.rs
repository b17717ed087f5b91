//! # pithread-core
//!
//! Core types for the pi-thread runtime.
//!
//! This crate is platform-agnostic and knows nothing about channels,
//! queues or workers; those live in `pithread-runtime`.
//!
//! ## Modules
//!
//! - `id` - pi-thread and channel identifiers
//! - `atomic` - atomic counter/flag wrappers with CAS
//! - `spinlock` - short-section spinlock
//! - `clock` - per-thread epoch clock for lazy commitment invalidation
//! - `status` - pi-thread scheduling status
//! - `error` - error stack (`PiError`)
//! - `kprint` - leveled logging macros
//! - `env` - environment variable helpers

pub mod id;
pub mod atomic;
pub mod spinlock;
pub mod clock;
pub mod status;
pub mod error;
pub mod kprint;
pub mod env;

pub use id::{ChannelId, PiThreadId};
pub use atomic::{AtomicCounter, AtomicFlag};
pub use spinlock::{SpinLock, SpinLockGuard};
pub use clock::Clock;
pub use status::ThreadStatus;
pub use error::{ErrorKind, Frame, PiError, PiResult, ResultExt};
pub use env::{env_get, env_get_bool, env_get_opt};

/// Runtime-wide constants
pub mod constants {
    /// Maximum workers (OS threads)
    pub const MAX_WORKERS: usize = 64;

    /// Default fuel: choices a thread may complete before it must yield
    pub const DEFAULT_FUEL: u32 = 64;

    /// Wait-queue size at which idle time triggers a cycle sweep
    pub const DEFAULT_GC_THRESHOLD: usize = 1024;

    /// Old-generation entries examined per cycle sweep
    pub const DEFAULT_GC_BUDGET: usize = 4096;

    /// Stale commitments seen in one scan before a channel is compacted
    pub const DEFAULT_COMPACT_THRESHOLD: usize = 32;
}
