//! Pi-threads and their locked handle
//!
//! A `PiThread` is shared (`Arc`) between the queue or worker holding it
//! and every commitment it has registered. Its mutable record is only
//! reachable through a `LockedThread`, the RAII handle returned by
//! `lock`/`try_lock`. Dropping the handle releases the lock.

use crate::commit::CommitList;
use crate::knownset::KnownSet;
use crate::procedure::{Label, ProcRef};
use crate::sys::low_level_yield;
use crate::value::Value;
use pithread_core::{pi_err, ErrorKind, PiResult};
use pithread_core::{Clock, PiThreadId, ThreadStatus};
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Mutable record of a pi-thread
pub struct ThreadState {
    pub status: ThreadStatus,
    /// Guard flags for the branches of the next choice
    pub enabled: Vec<bool>,
    pub env: Vec<Value>,
    pub commits: CommitList,
    pub proc: ProcRef,
    pub pc: Label,
    pub fuel: u32,
    pub knowns: KnownSet,
}

impl ThreadState {
    pub fn get(&self, slot: usize) -> PiResult<&Value> {
        self.env
            .get(slot)
            .ok_or_else(|| pi_err!(ErrorKind::Contract, "env slot {} out of range ({})", slot, self.env.len()))
    }

    /// Store a value, registering any channel it carries
    pub fn bind(&mut self, slot: usize, value: Value) -> PiResult<()> {
        if slot >= self.env.len() {
            return Err(pi_err!(ErrorKind::Contract, "env slot {} out of range ({})", slot, self.env.len()));
        }
        if let Value::Channel(ch) = &value {
            self.knowns.acquire(ch)?;
        }
        self.env[slot] = value;
        Ok(())
    }

    /// Grow the environment to at least `size` slots
    pub fn reserve_env(&mut self, size: usize) -> PiResult<()> {
        if size > self.env.len() {
            self.env.try_reserve(size - self.env.len())?;
            self.env.resize(size, Value::NoValue);
        }
        Ok(())
    }

    /// Give back every channel reference and commitment
    pub fn release(&mut self) -> PiResult<()> {
        self.commits.retire()?;
        self.knowns.release_all()?;
        self.env.clear();
        self.enabled.clear();
        Ok(())
    }
}

/// A schedulable pi-thread
pub struct PiThread {
    id: PiThreadId,
    clock: Arc<Clock>,
    locked: AtomicBool,
    state: UnsafeCell<ThreadState>,
}

// SAFETY: `state` is only reached through a `LockedThread`, which exists
// only while `locked` is held.
unsafe impl Send for PiThread {}
unsafe impl Sync for PiThread {}

impl PiThread {
    /// Create a runnable thread at label 0 of `proc`
    pub fn new(proc: ProcRef, fuel: u32) -> PiResult<Arc<Self>> {
        let size = proc.env_size();
        let mut env = Vec::new();
        env.try_reserve(size)?;
        env.resize(size, Value::NoValue);
        Ok(Arc::new(Self {
            id: PiThreadId::next(),
            clock: Arc::new(Clock::new()),
            locked: AtomicBool::new(false),
            state: UnsafeCell::new(ThreadState {
                status: ThreadStatus::Run,
                enabled: Vec::new(),
                env,
                commits: CommitList::new(),
                proc,
                pc: 0,
                fuel,
                knowns: KnownSet::new(),
            }),
        }))
    }

    #[inline]
    pub fn id(&self) -> PiThreadId {
        self.id
    }

    #[inline]
    pub fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    pub fn try_lock(self: &Arc<Self>) -> Option<LockedThread> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(LockedThread { thread: self.clone() })
        } else {
            None
        }
    }

    /// Spin until the lock is ours, yielding to the OS between attempts
    pub fn lock(self: &Arc<Self>) -> LockedThread {
        loop {
            if let Some(locked) = self.try_lock() {
                return locked;
            }
            while self.is_locked() {
                low_level_yield();
            }
        }
    }
}

impl fmt::Debug for PiThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PiThread")
            .field("id", &self.id)
            .field("clock", &self.clock.value())
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// Exclusive access to a pi-thread's record
pub struct LockedThread {
    thread: Arc<PiThread>,
}

impl LockedThread {
    #[inline]
    pub fn thread(&self) -> &Arc<PiThread> {
        &self.thread
    }

    #[inline]
    pub fn id(&self) -> PiThreadId {
        self.thread.id
    }

    #[inline]
    pub fn clock(&self) -> &Arc<Clock> {
        &self.thread.clock
    }
}

impl Deref for LockedThread {
    type Target = ThreadState;

    #[inline]
    fn deref(&self) -> &ThreadState {
        // SAFETY: we hold the lock
        unsafe { &*self.thread.state.get() }
    }
}

impl DerefMut for LockedThread {
    #[inline]
    fn deref_mut(&mut self) -> &mut ThreadState {
        // SAFETY: we hold the lock
        unsafe { &mut *self.thread.state.get() }
    }
}

impl Drop for LockedThread {
    fn drop(&mut self) {
        if !self.thread.locked.swap(false, Ordering::Release) {
            panic!("{} violation: {} released while unlocked", ErrorKind::LockDiscipline, self.thread.id);
        }
    }
}

impl fmt::Debug for LockedThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockedThread")
            .field("id", &self.id())
            .field("status", &self.status)
            .field("pc", &self.pc)
            .finish()
    }
}
