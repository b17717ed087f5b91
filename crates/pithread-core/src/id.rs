//! Identifier types for pi-threads and channels

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a pi-thread
///
/// Ids are allocated from a process-wide counter and never reused,
/// so they double as a stable identity for wait-queue lookups.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PiThreadId(u64);

impl PiThreadId {
    /// Sentinel value indicating no pi-thread
    pub const NONE: PiThreadId = PiThreadId(0);

    /// Allocate a fresh id
    #[inline]
    pub fn next() -> Self {
        PiThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Create from a raw value
    #[inline]
    pub const fn new(id: u64) -> Self {
        PiThreadId(id)
    }

    /// Get the raw value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Check if this is the NONE sentinel
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for PiThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "PiThreadId(NONE)")
        } else {
            write!(f, "PiThreadId({})", self.0)
        }
    }
}

impl fmt::Display for PiThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "pt{}", self.0)
        }
    }
}

impl Default for PiThreadId {
    fn default() -> Self {
        PiThreadId::NONE
    }
}

/// Unique identifier for a channel
///
/// Channel identity is its heap allocation; the id is a cheap, ordered
/// stand-in for that identity (hash keys, lock ordering, log lines).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ChannelId(u64);

impl ChannelId {
    #[inline]
    pub fn next() -> Self {
        ChannelId(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({})", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}
