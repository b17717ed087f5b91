//! Cycle sweep over parked threads
//!
//! Reference counting cannot free a group of parked threads that only
//! reference each other through channels. The sweep finds such groups by
//! trial deletion over the wait queue's old generation:
//!
//! 1. rotate generations and lock up to `budget` old threads;
//! 2. count, per channel, the references held by those candidates
//!    (known-set entries and commitments);
//! 3. a channel whose global count is higher is reachable from outside,
//!    and so is every candidate touching it, and every channel of a
//!    live candidate, until nothing changes;
//! 4. the remaining candidates are withdrawn and released, which drives
//!    their channels to zero.

use crate::channel::ChannelRef;
use crate::pithread::{LockedThread, PiThread};
use crate::queue::WaitQueue;
use pithread_core::{kdebug, ChannelId, PiResult, ThreadStatus};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub reclaimed: usize,
}

/// Sweep at most `budget` old-generation threads of `wait`
pub fn sweep(wait: &WaitQueue<Arc<PiThread>>, budget: usize) -> PiResult<SweepReport> {
    wait.max_active_reset();

    let mut candidates: Vec<LockedThread> = Vec::new();
    while candidates.len() < budget {
        // Threads locked elsewhere are being awakened; leave them queued
        match wait.take_old(|t| t.try_lock()) {
            Some((_, locked)) => candidates.push(locked),
            None => break,
        }
    }

    let live = find_live(&candidates);
    let mut report = SweepReport { examined: candidates.len(), reclaimed: 0 };

    for (mut cand, is_live) in candidates.into_iter().zip(live) {
        if !is_live && withdraw(&cand) {
            kdebug!("sweep reclaims {} ({} commitments)", cand.id(), cand.commits.len());
            cand.status = ThreadStatus::Blocked;
            cand.release()?;
            report.reclaimed += 1;
        } else {
            wait.push_old(cand.thread().clone());
        }
    }
    Ok(report)
}

/// Claim a parked thread's open choice so nobody can awake it
fn withdraw(cand: &LockedThread) -> bool {
    match cand.commits.iter().next() {
        Some(c) => cand.clock().advance_from(c.clockval()),
        None => false,
    }
}

fn channels_of(cand: &LockedThread) -> impl Iterator<Item = &ChannelRef> {
    cand.knowns.held().chain(cand.commits.iter().map(|c| c.channel()))
}

fn find_live(candidates: &[LockedThread]) -> Vec<bool> {
    let mut internal: HashMap<ChannelId, (&ChannelRef, i64)> = HashMap::new();
    let mut touches: Vec<Vec<ChannelId>> = Vec::with_capacity(candidates.len());
    for cand in candidates {
        let mut ids = Vec::new();
        for ch in channels_of(cand) {
            internal.entry(ch.id()).or_insert((ch, 0)).1 += 1;
            ids.push(ch.id());
        }
        touches.push(ids);
    }

    let mut live_channels: HashSet<ChannelId> = internal
        .iter()
        .filter(|(_, (ch, refs))| ch.ref_count() > *refs)
        .map(|(id, _)| *id)
        .collect();

    let mut live = vec![false; candidates.len()];
    loop {
        let mut changed = false;
        for (i, ids) in touches.iter().enumerate() {
            if !live[i] && ids.iter().any(|id| live_channels.contains(id)) {
                live[i] = true;
                live_channels.extend(ids.iter().copied());
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    live
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::register_input_commitment;
    use crate::pithread::tests::thread;

    /// Two threads waiting to receive on a channel only they know
    fn parked_pair(wait: &WaitQueue<Arc<PiThread>>) -> (ChannelRef, Vec<Arc<PiThread>>) {
        let ch = ChannelRef::new();
        let a = thread(1);
        let b = thread(1);
        {
            let mut la = a.lock();
            la.knowns.adopt(&ch).unwrap();
            register_input_commitment(&mut la, &ch, 0, 1).unwrap();
            let mut lb = b.lock();
            lb.knowns.acquire(&ch).unwrap();
            register_input_commitment(&mut lb, &ch, 0, 1).unwrap();
        }
        wait.push(a.clone());
        wait.push(b.clone());
        (ch, vec![a, b])
    }

    #[test]
    fn test_isolated_cycle_reclaimed() {
        let wait = WaitQueue::new();
        let (ch, threads) = parked_pair(&wait);
        assert_eq!(ch.ref_count(), 4);
        let report = sweep(&wait, 16).unwrap();
        assert_eq!(report, SweepReport { examined: 2, reclaimed: 2 });
        assert!(ch.is_reclaimed());
        assert!(wait.is_empty());
        for t in threads {
            assert_eq!(t.lock().status, ThreadStatus::Blocked);
        }
    }

    #[test]
    fn test_external_reference_keeps_group() {
        let wait = WaitQueue::new();
        let (ch, _threads) = parked_pair(&wait);
        ch.incr_ref_count().unwrap();
        let report = sweep(&wait, 16).unwrap();
        assert_eq!(report, SweepReport { examined: 2, reclaimed: 0 });
        assert_eq!(wait.old_len(), 2);
        assert_eq!(ch.ref_count(), 5);
    }

    #[test]
    fn test_liveness_propagates_through_channels() {
        let wait = WaitQueue::new();
        let (inner, _threads) = parked_pair(&wait);
        let outer = ChannelRef::new();
        outer.incr_ref_count().unwrap();
        // A third thread knows both the private pair channel and one held outside
        let c = thread(2);
        {
            let mut lc = c.lock();
            lc.knowns.acquire(&inner).unwrap();
            lc.knowns.acquire(&outer).unwrap();
            register_input_commitment(&mut lc, &outer, 0, 1).unwrap();
        }
        wait.push(c);
        let report = sweep(&wait, 16).unwrap();
        assert_eq!(report.reclaimed, 0);
        assert!(!inner.is_reclaimed());
    }

    #[test]
    fn test_busy_thread_skipped() {
        let wait = WaitQueue::new();
        let (ch, threads) = parked_pair(&wait);
        let held = threads[0].lock();
        let report = sweep(&wait, 16).unwrap();
        assert_eq!(report.examined, 1);
        // the busy one still holds the channel, so its partner stays
        assert_eq!(report.reclaimed, 0);
        drop(held);
        assert_eq!(wait.size(), 2);
        assert!(!ch.is_reclaimed());
    }

    #[test]
    fn test_claimed_thread_not_reclaimed() {
        let wait = WaitQueue::new();
        let (_ch, threads) = parked_pair(&wait);
        // a partner already owns the first thread's choice
        assert!(threads[0].clock().advance_from(0));
        let report = sweep(&wait, 16).unwrap();
        assert_eq!(report.reclaimed, 1);
        assert!(wait.fetch(&threads[0].id()).is_some());
    }

    #[test]
    fn test_budget_limits_examined() {
        let wait = WaitQueue::new();
        parked_pair(&wait);
        parked_pair(&wait);
        let report = sweep(&wait, 2).unwrap();
        assert_eq!(report.examined, 2);
        assert_eq!(wait.size(), 2);
    }
}
