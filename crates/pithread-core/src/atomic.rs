//! Thin atomic wrappers
//!
//! Every shared counter or flag in the runtime goes through these two
//! types so the memory orderings are chosen in exactly one place.

use core::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// Atomic signed counter with compare-and-swap
#[derive(Debug, Default)]
pub struct AtomicCounter {
    value: AtomicI64,
}

impl AtomicCounter {
    #[inline]
    pub const fn new(value: i64) -> Self {
        Self { value: AtomicI64::new(value) }
    }

    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Add one, returning the new value
    #[inline]
    pub fn incr(&self) -> i64 {
        self.value.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Subtract one, returning the new value
    #[inline]
    pub fn decr(&self) -> i64 {
        self.value.fetch_sub(1, Ordering::AcqRel) - 1
    }

    /// Replace `expected` with `new`; true on success
    #[inline]
    pub fn compare_and_swap(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Atomic boolean with compare-and-swap
#[derive(Debug, Default)]
pub struct AtomicFlag {
    value: AtomicBool,
}

impl AtomicFlag {
    #[inline]
    pub const fn new(value: bool) -> Self {
        Self { value: AtomicBool::new(value) }
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: bool) {
        self.value.store(value, Ordering::Release);
    }

    /// Store `value`, returning the previous one
    #[inline]
    pub fn swap(&self, value: bool) -> bool {
        self.value.swap(value, Ordering::AcqRel)
    }

    #[inline]
    pub fn compare_and_swap(&self, expected: bool, new: bool) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
