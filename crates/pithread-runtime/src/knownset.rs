//! Per-thread channel reference tracking
//!
//! A pi-thread owns at most one global reference per distinct channel it
//! knows about. The known set records which channels those are and
//! whether a reference is being given up during the current step:
//!
//! ```text
//!  Unknown --acquire--> Known --forget--> Forget --sweep--> Unknown
//!                         ^                  |
//!                         +----acquire-------+
//! ```
//!
//! Only `acquire` from `Unknown` increments the channel count and only
//! `sweep` of a `Forget` entry (or `release_all`) decrements it.

use crate::channel::ChannelRef;
use pithread_core::{ChannelId, PiResult};
use std::collections::HashMap;

/// Lifecycle of one channel within a known set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownState {
    Unknown,
    Known,
    Forget,
}

struct KnownEntry {
    channel: ChannelRef,
    state: KnownState,
}

/// Channels referenced by one pi-thread
#[derive(Default)]
pub struct KnownSet {
    entries: HashMap<ChannelId, KnownEntry>,
}

impl KnownSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, ch: &ChannelRef) -> KnownState {
        self.entries
            .get(&ch.id())
            .map(|e| e.state)
            .unwrap_or(KnownState::Unknown)
    }

    /// Take ownership of a freshly created channel
    ///
    /// The creator's reference is the channel's initial count, so nothing
    /// is incremented.
    pub fn adopt(&mut self, ch: &ChannelRef) -> PiResult<()> {
        self.entries.try_reserve(1)?;
        self.entries.insert(ch.id(), KnownEntry { channel: ch.clone(), state: KnownState::Known });
        Ok(())
    }

    /// Register a channel that became reachable from this thread
    ///
    /// Returns true when a new global reference was taken.
    pub fn acquire(&mut self, ch: &ChannelRef) -> PiResult<bool> {
        if let Some(entry) = self.entries.get_mut(&ch.id()) {
            match entry.state {
                KnownState::Known => return Ok(false),
                KnownState::Forget => {
                    entry.state = KnownState::Known;
                    return Ok(false);
                }
                KnownState::Unknown => {
                    ch.incr_ref_count()?;
                    entry.state = KnownState::Known;
                    return Ok(true);
                }
            }
        }
        self.entries.try_reserve(1)?;
        ch.incr_ref_count()?;
        self.entries.insert(ch.id(), KnownEntry { channel: ch.clone(), state: KnownState::Known });
        Ok(true)
    }

    /// Mark a known channel for release at the end of this step
    ///
    /// Returns false if the channel was not known.
    pub fn forget(&mut self, ch: &ChannelRef) -> bool {
        match self.entries.get_mut(&ch.id()) {
            Some(entry) if entry.state == KnownState::Known => {
                entry.state = KnownState::Forget;
                true
            }
            _ => false,
        }
    }

    /// Apply pending `Forget` transitions. Returns references released.
    pub fn sweep(&mut self) -> PiResult<usize> {
        let mut released = 0;
        for entry in self.entries.values_mut() {
            if entry.state == KnownState::Forget {
                entry.state = KnownState::Unknown;
                entry.channel.dec_ref_count()?;
                released += 1;
            }
        }
        self.entries.retain(|_, e| e.state != KnownState::Unknown);
        Ok(released)
    }

    /// Drop every reference this thread holds. Returns references released.
    pub fn release_all(&mut self) -> PiResult<usize> {
        let mut released = 0;
        for (_, entry) in self.entries.drain() {
            if entry.state != KnownState::Unknown {
                entry.channel.dec_ref_count()?;
                released += 1;
            }
        }
        Ok(released)
    }

    /// Channels this thread currently holds a reference to
    pub fn held(&self) -> impl Iterator<Item = &ChannelRef> + '_ {
        self.entries
            .values()
            .filter(|e| e.state != KnownState::Unknown)
            .map(|e| &e.channel)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_counts_once_per_channel() {
        let ch = ChannelRef::new();
        let mut ks = KnownSet::new();
        assert!(ks.acquire(&ch).unwrap());
        assert!(!ks.acquire(&ch).unwrap());
        assert_eq!(ch.ref_count(), 2);
        assert_eq!(ks.state(&ch), KnownState::Known);
    }

    #[test]
    fn test_adopt_does_not_increment() {
        let ch = ChannelRef::new();
        let mut ks = KnownSet::new();
        ks.adopt(&ch).unwrap();
        assert_eq!(ch.ref_count(), 1);
        assert!(!ks.acquire(&ch).unwrap());
        assert_eq!(ch.ref_count(), 1);
    }

    #[test]
    fn test_forget_then_sweep_releases() {
        let ch = ChannelRef::new();
        let mut ks = KnownSet::new();
        ks.acquire(&ch).unwrap();
        assert!(ks.forget(&ch));
        assert_eq!(ks.state(&ch), KnownState::Forget);
        assert_eq!(ch.ref_count(), 2);
        assert_eq!(ks.sweep().unwrap(), 1);
        assert_eq!(ks.state(&ch), KnownState::Unknown);
        assert_eq!(ch.ref_count(), 1);
        assert!(ks.is_empty());
    }

    #[test]
    fn test_reacquire_cancels_forget() {
        let ch = ChannelRef::new();
        let mut ks = KnownSet::new();
        ks.acquire(&ch).unwrap();
        ks.forget(&ch);
        assert!(!ks.acquire(&ch).unwrap());
        assert_eq!(ks.sweep().unwrap(), 0);
        assert_eq!(ch.ref_count(), 2);
    }

    #[test]
    fn test_forget_unknown_is_noop() {
        let ch = ChannelRef::new();
        let mut ks = KnownSet::new();
        assert!(!ks.forget(&ch));
        assert_eq!(ks.sweep().unwrap(), 0);
    }

    #[test]
    fn test_release_all_reclaims_adopted() {
        let a = ChannelRef::new();
        let b = ChannelRef::new();
        b.incr_ref_count().unwrap();
        let mut ks = KnownSet::new();
        ks.adopt(&a).unwrap();
        ks.acquire(&b).unwrap();
        ks.forget(&b);
        assert_eq!(ks.held().count(), 2);
        assert_eq!(ks.release_all().unwrap(), 2);
        assert!(a.is_reclaimed());
        assert_eq!(b.ref_count(), 2);
        assert!(ks.is_empty());
    }
}
