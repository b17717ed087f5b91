//! Ready queue
//!
//! Mutex-protected deque. `len` mirrors the deque length so empty polls
//! skip the lock; `size` takes the lock and is exact.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Runnable work, popped from the head
pub struct ReadyQueue<T> {
    queue: Mutex<VecDeque<T>>,
    len: AtomicUsize,
}

impl<T> ReadyQueue<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            len: AtomicUsize::new(0),
        }
    }

    fn locked(&self) -> MutexGuard<'_, VecDeque<T>> {
        // A panicking worker cannot leave the deque half-updated
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert at the head (runs next)
    pub fn push(&self, item: T) {
        let mut q = self.locked();
        q.push_front(item);
        self.len.store(q.len(), Ordering::Release);
    }

    /// Append at the tail (runs after everything already queued)
    pub fn add(&self, item: T) {
        let mut q = self.locked();
        q.push_back(item);
        self.len.store(q.len(), Ordering::Release);
    }

    pub fn pop(&self) -> Option<T> {
        if self.len.load(Ordering::Acquire) == 0 {
            return None;
        }
        let mut q = self.locked();
        let item = q.pop_front();
        self.len.store(q.len(), Ordering::Release);
        item
    }

    /// Exact size, read under the lock
    pub fn size(&self) -> usize {
        self.locked().len()
    }

    /// Approximate size without locking
    #[inline]
    pub fn len_hint(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Remove everything, head first
    pub fn drain(&self) -> Vec<T> {
        let mut q = self.locked();
        let items: Vec<T> = q.drain(..).collect();
        self.len.store(0, Ordering::Release);
        items
    }
}

impl<T> Default for ReadyQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
