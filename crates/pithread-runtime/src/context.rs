//! What generated procedures see while they run
//!
//! `StepContext` wraps the locked thread for one step. It gives access to
//! the environment, channel creation and release, spawning, and
//! `choice`, the guarded-choice driver:
//!
//! 1. spend one unit of fuel, or yield with the pc unchanged when empty;
//! 2. retire the commitments of the previous choice;
//! 3. try every enabled branch in order, registering an offer on each
//!    channel without a partner;
//! 4. on the first match transfer the value, awake the partner and
//!    continue at the branch's label; otherwise park or block.

use crate::channel::ChannelRef;
use crate::commit::{awake, try_action, CommitKind, Commitment, EvalFn, Polarity, TryOptions, TryResult};
use crate::pithread::{LockedThread, ThreadState};
use crate::procedure::{Label, ProcRef, StepResult};
use crate::scheduler::SchedPool;
use crate::value::Value;
use pithread_core::{pi_err, ErrorKind, PiResult, PiThreadId};

/// One arm of a guarded choice
#[derive(Clone)]
pub struct Branch {
    pub channel: ChannelRef,
    pub action: CommitKind,
    pub cont: Label,
}

impl Branch {
    /// Receive on `channel` into env slot `slot`, then go to `cont`
    pub fn input(channel: ChannelRef, slot: usize, cont: Label) -> Self {
        Self { channel, action: CommitKind::Input { slot }, cont }
    }

    /// Send `eval`'s value on `channel`, then go to `cont`
    pub fn output(channel: ChannelRef, eval: EvalFn, cont: Label) -> Self {
        Self { channel, action: CommitKind::Output { eval }, cont }
    }

    #[inline]
    pub fn polarity(&self) -> Polarity {
        self.action.polarity()
    }
}

/// A running step of one pi-thread
pub struct StepContext<'a> {
    pool: &'a SchedPool,
    thread: &'a mut LockedThread,
}

impl<'a> StepContext<'a> {
    pub fn new(pool: &'a SchedPool, thread: &'a mut LockedThread) -> Self {
        Self { pool, thread }
    }

    #[inline]
    pub fn pool(&self) -> &SchedPool {
        self.pool
    }

    #[inline]
    pub fn pc(&self) -> Label {
        self.thread.pc
    }

    #[inline]
    pub fn thread_id(&self) -> PiThreadId {
        self.thread.id()
    }

    #[inline]
    pub fn state(&self) -> &ThreadState {
        &**self.thread
    }

    /// The locked thread, for the low-level commitment primitives
    #[inline]
    pub fn locked(&mut self) -> &mut LockedThread {
        &mut *self.thread
    }

    pub fn get(&self, slot: usize) -> PiResult<&Value> {
        self.thread.get(slot)
    }

    pub fn int(&self, slot: usize) -> PiResult<i64> {
        self.get(slot)?.as_int()
    }

    pub fn channel(&self, slot: usize) -> PiResult<ChannelRef> {
        self.get(slot)?.as_channel().cloned()
    }

    /// Store a value; a channel value becomes known to this thread
    pub fn set(&mut self, slot: usize, value: impl Into<Value>) -> PiResult<()> {
        self.thread.bind(slot, value.into())
    }

    /// Create a channel owned by this thread and store it in `slot`
    pub fn new_channel(&mut self, slot: usize) -> PiResult<ChannelRef> {
        let ch = ChannelRef::new();
        self.thread.knowns.adopt(&ch)?;
        self.thread.bind(slot, Value::Channel(ch.clone()))?;
        Ok(ch)
    }

    /// Drop the channel in `slot` at the end of this step
    pub fn forget(&mut self, slot: usize) -> PiResult<()> {
        let ch = self.channel(slot)?;
        if !self.thread.knowns.forget(&ch) {
            return Err(pi_err!(ErrorKind::Contract, "{} forgets {} it does not hold", self.thread_id(), ch.id()));
        }
        self.thread.env[slot] = Value::NoValue;
        Ok(())
    }

    /// Start a new thread running `proc` with `args` as its first slots
    pub fn spawn(&mut self, proc: &ProcRef, args: Vec<Value>) -> PiResult<PiThreadId> {
        self.pool.spawn(proc.clone(), args)
    }

    /// Guard flags for the branches of the next `choice`; unset means enabled
    pub fn set_enabled(&mut self, guards: &[bool]) {
        self.thread.enabled.clear();
        self.thread.enabled.extend_from_slice(guards);
    }

    /// Single input action
    pub fn input(&mut self, channel: ChannelRef, slot: usize, cont: Label) -> PiResult<StepResult> {
        self.choice(&[Branch::input(channel, slot, cont)])
    }

    /// Single output action
    pub fn output(&mut self, channel: ChannelRef, eval: EvalFn, cont: Label) -> PiResult<StepResult> {
        self.choice(&[Branch::output(channel, eval, cont)])
    }

    /// Run a guarded choice over `branches`
    pub fn choice(&mut self, branches: &[Branch]) -> PiResult<StepResult> {
        let pool = self.pool;
        let me = &mut *self.thread;

        if me.fuel == 0 {
            me.fuel = pool.config().fuel;
            return Ok(StepResult::Yield);
        }
        me.fuel -= 1;

        me.commits.retire()?;
        let guards = std::mem::take(&mut me.enabled);
        let compact_threshold = pool.config().compact_threshold;

        'attempt: loop {
            let epoch = me.clock().value();
            let mut registered = 0usize;

            for (i, branch) in branches.iter().enumerate() {
                if !guards.get(i).copied().unwrap_or(true) {
                    continue;
                }
                let mut opts = TryOptions { withdraw: (registered > 0).then_some(epoch), compact_threshold };
                let result = try_action(me, &branch.channel, branch.polarity(), &mut opts)?;
                let withdrawn = registered > 0 && opts.withdraw.is_none();
                let slot = match result {
                    TryResult::Enabled(rv) => {
                        if !withdrawn {
                            me.clock().tick();
                        }
                        me.commits.retire()?;
                        let mut partner = rv.partner;
                        transfer(me, &mut partner, branch, &rv.commit)?;
                        awake(pool, partner, &rv.commit)?;
                        return Ok(StepResult::Continue(branch.cont));
                    }
                    TryResult::Claimed => return Ok(StepResult::Wait),
                    TryResult::Disabled => None,
                    TryResult::Commit(slot) => Some(slot),
                };
                if withdrawn {
                    // Offers withdrawn for a partner that got away
                    drop(slot);
                    me.commits.retire()?;
                    continue 'attempt;
                }
                if me.clock().value() != epoch {
                    // Claimed through an earlier offer; the claimer awakes us
                    return Ok(StepResult::Wait);
                }
                if let Some(slot) = slot {
                    slot.register(me, branch.action, branch.cont, epoch)?;
                    registered += 1;
                }
            }

            return Ok(if registered == 0 { StepResult::Blocked } else { StepResult::Wait });
        }
    }
}

/// Move the sent value into the receiver's env slot
fn transfer(me: &mut LockedThread, partner: &mut LockedThread, branch: &Branch, commit: &Commitment) -> PiResult<()> {
    match (branch.action, *commit.kind()) {
        (CommitKind::Input { slot }, CommitKind::Output { eval }) => {
            let value = eval(partner)?;
            me.bind(slot, value)
        }
        (CommitKind::Output { eval }, CommitKind::Input { slot }) => {
            let value = eval(me)?;
            partner.bind(slot, value)
        }
        _ => Err(pi_err!(
            ErrorKind::Contract,
            "{:?} branch matched a {:?} offer on {}",
            branch.polarity(),
            commit.polarity(),
            commit.channel().id()
        )),
    }
}
