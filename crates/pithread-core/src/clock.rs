//! Per-thread commitment clock
//!
//! A pi-thread stamps every commitment it registers with the clock value
//! current at registration time. Advancing the clock invalidates all of
//! those stamps at once, so stale commitments can stay in channel lists
//! and be discarded whenever a scan runs into them.

use crate::atomic::AtomicCounter;

/// Monotonic epoch counter owned by one pi-thread
#[derive(Debug, Default)]
pub struct Clock {
    value: AtomicCounter,
}

impl Clock {
    pub const fn new() -> Self {
        Self { value: AtomicCounter::new(0) }
    }

    /// Current epoch
    #[inline]
    pub fn value(&self) -> i64 {
        self.value.get()
    }

    /// Unconditionally move to the next epoch, returning it
    #[inline]
    pub fn tick(&self) -> i64 {
        self.value.incr()
    }

    /// Move from `expected` to `expected + 1`
    ///
    /// Exactly one caller can win for a given `expected`; the winner owns
    /// the choice that was open in that epoch.
    #[inline]
    pub fn advance_from(&self, expected: i64) -> bool {
        self.value.compare_and_swap(expected, expected + 1)
    }

    /// True while no one has advanced past `stamp`
    #[inline]
    pub fn is_current(&self, stamp: i64) -> bool {
        self.value() == stamp
    }
}
