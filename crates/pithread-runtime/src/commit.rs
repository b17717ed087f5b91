//! Commitments and the rendezvous protocol
//!
//! A commitment is a thread's standing offer to input or output on one
//! channel, stamped with the thread's clock value at registration. It is
//! valid while that clock has not moved. Whoever advances the clock from
//! the stamped value owns the offer:
//!
//! - a partner that matches it (`can_awake`) advances it and so claims the
//!   whole choice the offer belongs to;
//! - the owner advances it to withdraw its offers before taking another
//!   thread's offer, so it can never be claimed twice.
//!
//! Lock order: a channel's lists are held only while scanning or
//! registering, and are released before spinning on a partner's lock.

use crate::channel::{ChannelRef, CommitLists};
use crate::pithread::{LockedThread, PiThread, ThreadState};
use crate::procedure::Label;
use crate::scheduler::SchedPool;
use crate::value::Value;
use pithread_core::constants::DEFAULT_COMPACT_THRESHOLD;
use pithread_core::{kdebug, ktrace, pi_err};
use pithread_core::{Clock, ErrorKind, PiResult, PiThreadId, SpinLockGuard, ThreadStatus};
use std::fmt;
use std::sync::Arc;

/// Computes the value an output sends, from the sender's state
pub type EvalFn = fn(&ThreadState) -> PiResult<Value>;

/// Direction of a channel action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Input,
    Output,
}

impl Polarity {
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Polarity::Input => Polarity::Output,
            Polarity::Output => Polarity::Input,
        }
    }
}

/// What the owner does when the offer is taken
#[derive(Clone, Copy)]
pub enum CommitKind {
    /// Bind the received value into this env slot
    Input { slot: usize },
    /// Send the value computed by `eval`
    Output { eval: EvalFn },
}

impl CommitKind {
    #[inline]
    pub fn polarity(&self) -> Polarity {
        match self {
            CommitKind::Input { .. } => Polarity::Input,
            CommitKind::Output { .. } => Polarity::Output,
        }
    }
}

impl fmt::Debug for CommitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitKind::Input { slot } => write!(f, "Input {{ slot: {} }}", slot),
            CommitKind::Output { .. } => write!(f, "Output"),
        }
    }
}

/// A pending offer registered on a channel
pub struct Commitment {
    thread: Arc<PiThread>,
    clock: Arc<Clock>,
    clockval: i64,
    cont_pc: Label,
    channel: ChannelRef,
    kind: CommitKind,
}

impl Commitment {
    #[inline]
    pub fn thread(&self) -> &Arc<PiThread> {
        &self.thread
    }

    #[inline]
    pub fn owner_id(&self) -> PiThreadId {
        self.thread.id()
    }

    #[inline]
    pub fn clockval(&self) -> i64 {
        self.clockval
    }

    #[inline]
    pub fn cont_pc(&self) -> Label {
        self.cont_pc
    }

    #[inline]
    pub fn channel(&self) -> &ChannelRef {
        &self.channel
    }

    #[inline]
    pub fn kind(&self) -> &CommitKind {
        &self.kind
    }

    #[inline]
    pub fn polarity(&self) -> Polarity {
        self.kind.polarity()
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        is_valid_commit(self)
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Commitment")
            .field("owner", &self.owner_id())
            .field("channel", &self.channel.id())
            .field("kind", &self.kind)
            .field("clockval", &self.clockval)
            .field("cont_pc", &self.cont_pc)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// True while the owner's clock is the stamped clock at the stamped value
#[inline]
pub fn is_valid_commit(commit: &Commitment) -> bool {
    Arc::ptr_eq(&commit.clock, commit.thread.clock()) && commit.clock.is_current(commit.clockval)
}

/// Commitments a thread registered during its current choice
///
/// Each entry holds one global reference on its channel, given back when
/// the list is retired.
#[derive(Default)]
pub struct CommitList {
    entries: Vec<Arc<Commitment>>,
}

impl CommitList {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Commitment>> {
        self.entries.iter()
    }

    fn push(&mut self, commit: Arc<Commitment>) -> PiResult<()> {
        self.entries.try_reserve(1)?;
        self.entries.push(commit);
        Ok(())
    }

    /// Drop every entry and its channel reference. Returns entries retired.
    ///
    /// Entries still sitting in channel lists are left there; once the
    /// owner's clock has moved they are discarded by the next scan.
    pub fn retire(&mut self) -> PiResult<usize> {
        let n = self.entries.len();
        for commit in self.entries.drain(..) {
            commit.channel.dec_ref_count()?;
        }
        Ok(n)
    }
}

/// A matched partner, locked and claimed
pub struct Rendezvous {
    pub partner: LockedThread,
    pub commit: Arc<Commitment>,
}

/// Outcome of trying one channel action
pub enum TryResult<'a> {
    /// A partner offer was claimed; transfer the value and awake it
    Enabled(Rendezvous),
    /// Nobody else can hold the channel
    Disabled,
    /// No partner; register an offer through the slot
    Commit(CommitSlot<'a>),
    /// Our own choice was claimed by another thread first; park
    Claimed,
}

impl TryResult<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            TryResult::Enabled(_) => "enabled",
            TryResult::Disabled => "disabled",
            TryResult::Commit(_) => "commit",
            TryResult::Claimed => "claimed",
        }
    }
}

impl fmt::Debug for TryResult<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Registration right handed back by a try that found no partner
///
/// Holds the channel's list lock, so no partner can slip in between the
/// failed try and the registration.
pub struct CommitSlot<'a> {
    channel: &'a ChannelRef,
    lists: SpinLockGuard<'a, CommitLists>,
    polarity: Polarity,
}

impl CommitSlot<'_> {
    #[inline]
    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// Register `me`'s offer for the choice opened at `epoch` and release
    /// the channel
    ///
    /// The offer is stamped with `epoch`, not the current clock value: if
    /// the choice was claimed meanwhile, the new offer is dead on arrival.
    pub fn register(
        mut self,
        me: &mut LockedThread,
        kind: CommitKind,
        cont_pc: Label,
        epoch: i64,
    ) -> PiResult<Arc<Commitment>> {
        if kind.polarity() != self.polarity {
            return Err(pi_err!(
                ErrorKind::Contract,
                "{:?} offer registered in a {:?} slot on {}",
                kind.polarity(),
                self.polarity,
                self.channel.id()
            ));
        }
        append(me, self.channel, &mut self.lists, kind, cont_pc, epoch)
    }
}

/// Knobs for a single try
#[derive(Debug, Clone, Copy)]
pub struct TryOptions {
    /// Epoch to withdraw from before claiming a partner, if this thread
    /// already registered offers in the current choice
    pub withdraw: Option<i64>,
    /// Stale entries met in one scan that trigger compaction
    pub compact_threshold: usize,
}

impl Default for TryOptions {
    fn default() -> Self {
        Self { withdraw: None, compact_threshold: DEFAULT_COMPACT_THRESHOLD }
    }
}

pub fn try_input_action<'a>(me: &LockedThread, ch: &'a ChannelRef, mut opts: TryOptions) -> PiResult<TryResult<'a>> {
    try_action(me, ch, Polarity::Input, &mut opts)
}

pub fn try_output_action<'a>(me: &LockedThread, ch: &'a ChannelRef, mut opts: TryOptions) -> PiResult<TryResult<'a>> {
    try_action(me, ch, Polarity::Output, &mut opts)
}

/// Look for the oldest valid partner offer and claim it
///
/// `opts.withdraw` is cleared once this thread's own offers have been
/// withdrawn, so the caller can tell its own clock bump from a claim.
pub fn try_action<'a>(
    me: &LockedThread,
    ch: &'a ChannelRef,
    polarity: Polarity,
    opts: &mut TryOptions,
) -> PiResult<TryResult<'a>> {
    if ch.is_reclaimed() {
        return Err(pi_err!(ErrorKind::Contract, "{} used after reclamation", ch.id()));
    }
    loop {
        if ch.is_private() {
            return Ok(TryResult::Disabled);
        }

        let mut lists = ch.lists();
        let (candidate, stale) = take_oldest(&mut lists, polarity.opposite(), me.id());
        if stale > opts.compact_threshold {
            let dropped = lists.compact();
            kdebug!("compacted {} ({} stale seen, {} more dropped)", ch.id(), stale, dropped);
        }
        let Some(commit) = candidate else {
            return Ok(TryResult::Commit(CommitSlot { channel: ch, lists, polarity }));
        };
        drop(lists);

        if let Some(epoch) = opts.withdraw.take() {
            if !me.clock().advance_from(epoch) {
                // The candidate was never claimed; put it back in line
                ch.lists().list_mut(polarity.opposite()).push_front(commit);
                ktrace!("{} claimed while trying {}", me.id(), ch.id());
                return Ok(TryResult::Claimed);
            }
        }

        if let Some(partner) = can_awake(&commit) {
            ktrace!("{} matched {} on {}", me.id(), partner.id(), ch.id());
            return Ok(TryResult::Enabled(Rendezvous { partner, commit }));
        }
    }
}

/// Remove the oldest valid offer not owned by `me`, discarding stale ones
fn take_oldest(lists: &mut CommitLists, polarity: Polarity, me: PiThreadId) -> (Option<Arc<Commitment>>, usize) {
    let list = lists.list_mut(polarity);
    let mut stale = 0;
    let mut i = 0;
    while i < list.len() {
        if !list[i].is_valid() {
            list.remove(i);
            stale += 1;
        } else if list[i].owner_id() == me {
            i += 1;
        } else {
            return (list.remove(i), stale);
        }
    }
    (None, stale)
}

fn append(
    me: &mut LockedThread,
    ch: &ChannelRef,
    lists: &mut CommitLists,
    kind: CommitKind,
    cont_pc: Label,
    clockval: i64,
) -> PiResult<Arc<Commitment>> {
    let polarity = kind.polarity();
    lists.list_mut(polarity).try_reserve(1)?;
    let commit = Arc::new(Commitment {
        thread: me.thread().clone(),
        clock: me.clock().clone(),
        clockval,
        cont_pc,
        channel: ch.clone(),
        kind,
    });
    me.commits.push(commit.clone())?;
    ch.incr_ref_count()?;
    lists.prune_front(polarity);
    lists.list_mut(polarity).push_back(commit.clone());
    ktrace!("{} offers {:?} on {} (epoch {})", me.id(), polarity, ch.id(), commit.clockval);
    Ok(commit)
}

/// Offer to receive on `ch` into env slot `slot`, resuming at `cont_pc`
pub fn register_input_commitment(
    me: &mut LockedThread,
    ch: &ChannelRef,
    slot: usize,
    cont_pc: Label,
) -> PiResult<Arc<Commitment>> {
    let mut lists = ch.lists();
    let epoch = me.clock().value();
    append(me, ch, &mut lists, CommitKind::Input { slot }, cont_pc, epoch)
}

/// Offer to send `eval`'s value on `ch`, resuming at `cont_pc`
pub fn register_output_commitment(
    me: &mut LockedThread,
    ch: &ChannelRef,
    eval: EvalFn,
    cont_pc: Label,
) -> PiResult<Arc<Commitment>> {
    let mut lists = ch.lists();
    let epoch = me.clock().value();
    append(me, ch, &mut lists, CommitKind::Output { eval }, cont_pc, epoch)
}

/// Claim the owner of `commit` and lock it
///
/// The claim is the clock CAS: it fails if the owner has moved on or
/// someone else got there first. Once claimed, the owner's lock is
/// awaited by spinning; the holder releases it as soon as its step
/// finishes parking.
pub fn can_awake(commit: &Commitment) -> Option<LockedThread> {
    if !Arc::ptr_eq(&commit.clock, commit.thread.clock()) || !commit.clock.advance_from(commit.clockval) {
        return None;
    }
    Some(commit.thread.lock())
}

/// Resume a claimed thread at the commitment's continuation
///
/// Moves it from the wait queue to the front of the ready queue and
/// releases its lock.
pub fn awake(pool: &SchedPool, mut partner: LockedThread, commit: &Commitment) -> PiResult<()> {
    if partner.id() != commit.owner_id() {
        return Err(pi_err!(
            ErrorKind::Contract,
            "awaking {} with a commitment of {}",
            partner.id(),
            commit.owner_id()
        ));
    }
    partner.pc = commit.cont_pc;
    partner.status = ThreadStatus::Run;
    let thread = pool
        .wait_queue()
        .fetch(&partner.id())
        .ok_or_else(|| pi_err!(ErrorKind::Contract, "{} awakened but not parked", partner.id()))?;
    pool.ready_queue().push(thread);
    drop(partner);
    pool.signal_work();
    Ok(())
}
