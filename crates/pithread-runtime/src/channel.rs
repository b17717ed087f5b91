//! Rendezvous channels
//!
//! A channel is a meeting point: it holds the pending input and output
//! commitments offered on it, oldest first, and a global reference count.
//! The count starts at 1 (owned by the creating thread). When it drops to
//! zero the channel is reclaimed exactly once: its commitment lists are
//! cleared and the optional reclaimer hook runs.
//!
//! Commitment lists use lazy deletion. Stale entries are discarded while
//! scanning, and a scan that meets too many of them compacts both lists.

use crate::commit::{Commitment, Polarity};
use pithread_core::{kdebug, ktrace, pi_err};
use pithread_core::{AtomicCounter, AtomicFlag, ChannelId, ErrorKind, PiResult, SpinLock, SpinLockGuard};
use std::collections::VecDeque;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Hook run once when a channel is reclaimed
pub type Reclaimer = Box<dyn Fn(ChannelId) + Send + Sync>;

/// Outcome of a reference-count decrement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RcOutcome {
    /// Still referenced, with this many references left
    Live(i64),
    /// The count reached zero and the channel was reclaimed
    Reclaimed,
}

/// Pending commitments of one channel, oldest at the front
#[derive(Default)]
pub struct CommitLists {
    pub inputs: VecDeque<Arc<Commitment>>,
    pub outputs: VecDeque<Arc<Commitment>>,
}

impl CommitLists {
    pub fn list(&self, polarity: Polarity) -> &VecDeque<Arc<Commitment>> {
        match polarity {
            Polarity::Input => &self.inputs,
            Polarity::Output => &self.outputs,
        }
    }

    pub fn list_mut(&mut self, polarity: Polarity) -> &mut VecDeque<Arc<Commitment>> {
        match polarity {
            Polarity::Input => &mut self.inputs,
            Polarity::Output => &mut self.outputs,
        }
    }

    /// Keep only valid commitments in both lists. Returns entries dropped.
    pub fn compact(&mut self) -> usize {
        let before = self.inputs.len() + self.outputs.len();
        self.inputs.retain(|c| c.is_valid());
        self.outputs.retain(|c| c.is_valid());
        before - (self.inputs.len() + self.outputs.len())
    }

    /// Drop stale entries sitting at the front of one list
    pub fn prune_front(&mut self, polarity: Polarity) -> usize {
        let list = self.list_mut(polarity);
        let mut dropped = 0;
        while list.front().is_some_and(|c| !c.is_valid()) {
            list.pop_front();
            dropped += 1;
        }
        dropped
    }

    fn clear(&mut self) -> usize {
        let n = self.inputs.len() + self.outputs.len();
        self.inputs.clear();
        self.outputs.clear();
        n
    }
}

/// Channel state shared by every holder of a `ChannelRef`
pub struct Channel {
    id: ChannelId,
    global_rc: AtomicCounter,
    lists: SpinLock<CommitLists>,
    reclaimed: AtomicFlag,
    reclaimer: Option<Reclaimer>,
}

/// Shared handle to a channel
///
/// Cloning the handle does not touch the global reference count; the
/// count tracks logical owners (known sets and commitments), not Rust
/// handles.
#[derive(Clone)]
pub struct ChannelRef(Arc<Channel>);

impl ChannelRef {
    /// Create a channel with `global_rc = 1`
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a channel whose reclamation runs `hook`
    pub fn with_reclaimer<F>(hook: F) -> Self
    where
        F: Fn(ChannelId) + Send + Sync + 'static,
    {
        Self::build(Some(Box::new(hook)))
    }

    fn build(reclaimer: Option<Reclaimer>) -> Self {
        let id = ChannelId::next();
        ktrace!("new channel {}", id);
        Self(Arc::new(Channel {
            id,
            global_rc: AtomicCounter::new(1),
            lists: SpinLock::new(CommitLists::default()),
            reclaimed: AtomicFlag::new(false),
            reclaimer,
        }))
    }

    #[inline]
    pub fn id(&self) -> ChannelId {
        self.0.id
    }

    /// Current global reference count
    #[inline]
    pub fn ref_count(&self) -> i64 {
        self.0.global_rc.get()
    }

    #[inline]
    pub fn is_reclaimed(&self) -> bool {
        self.0.reclaimed.get()
    }

    /// True if no other party can ever hold this channel
    #[inline]
    pub fn is_private(&self) -> bool {
        self.ref_count() == 1
    }

    /// Atomically add one reference. Returns the new count.
    pub fn incr_ref_count(&self) -> PiResult<i64> {
        if self.is_reclaimed() {
            return Err(pi_err!(ErrorKind::Contract, "{} referenced after reclamation", self.id()));
        }
        Ok(self.0.global_rc.incr())
    }

    /// Atomically drop one reference, reclaiming the channel at zero
    pub fn dec_ref_count(&self) -> PiResult<RcOutcome> {
        let n = self.0.global_rc.decr();
        if n > 0 {
            return Ok(RcOutcome::Live(n));
        }
        if n < 0 {
            return Err(pi_err!(ErrorKind::Contract, "{} reference count dropped below zero", self.id()));
        }
        self.reclaim()?;
        Ok(RcOutcome::Reclaimed)
    }

    fn reclaim(&self) -> PiResult<()> {
        if self.0.reclaimed.swap(true) {
            return Err(pi_err!(ErrorKind::Contract, "{} reclaimed twice", self.id()));
        }
        let dropped = self.0.lists.lock().clear();
        kdebug!("reclaimed {} ({} pending commitments dropped)", self.id(), dropped);
        if let Some(hook) = &self.0.reclaimer {
            hook(self.id());
        }
        Ok(())
    }

    /// Lock the commitment lists
    #[inline]
    pub fn lists(&self) -> SpinLockGuard<'_, CommitLists> {
        self.0.lists.lock()
    }

    pub fn nb_inputs(&self) -> usize {
        self.lists().inputs.len()
    }

    pub fn nb_outputs(&self) -> usize {
        self.lists().outputs.len()
    }

    /// Compact both commitment lists. Returns entries dropped.
    pub fn compact(&self) -> usize {
        self.lists().compact()
    }
}

impl Default for ChannelRef {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ChannelRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ChannelRef {}

impl Hash for ChannelRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id())
            .field("rc", &self.ref_count())
            .field("reclaimed", &self.is_reclaimed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counted() -> (ChannelRef, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let ch = ChannelRef::with_reclaimer(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (ch, hits)
    }

    #[test]
    fn test_new_channel() {
        let ch = ChannelRef::new();
        assert_eq!(ch.ref_count(), 1);
        assert!(ch.is_private());
        assert_eq!(ch.nb_inputs(), 0);
        assert_eq!(ch.nb_outputs(), 0);
        assert!(!ch.is_reclaimed());
    }

    #[test]
    fn test_reclaimed_exactly_at_zero() {
        let (ch, hits) = counted();
        assert_eq!(ch.incr_ref_count().unwrap(), 2);
        assert_eq!(ch.incr_ref_count().unwrap(), 3);
        assert_eq!(ch.dec_ref_count().unwrap(), RcOutcome::Live(2));
        assert_eq!(ch.dec_ref_count().unwrap(), RcOutcome::Live(1));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(ch.dec_ref_count().unwrap(), RcOutcome::Reclaimed);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(ch.is_reclaimed());
    }

    #[test]
    fn test_underflow_is_error_and_hook_not_rerun() {
        let (ch, hits) = counted();
        ch.dec_ref_count().unwrap();
        let err = ch.dec_ref_count().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Contract);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(ch.incr_ref_count().is_err());
    }

    #[test]
    fn test_concurrent_refcount_reclaims_once() {
        let (ch, hits) = counted();
        for _ in 0..8 * 1000 {
            ch.incr_ref_count().unwrap();
        }
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ch = ch.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        ch.dec_ref_count().unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ch.ref_count(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(ch.dec_ref_count().unwrap(), RcOutcome::Reclaimed);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_identity() {
        let a = ChannelRef::new();
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());
        assert_ne!(a, ChannelRef::new());
    }
}
