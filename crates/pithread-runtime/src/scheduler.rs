//! The scheduler pool
//!
//! One master loop (on the caller of `run`) and `num_workers - 1` slave
//! loops pop pi-threads from the ready queue and run them until the next
//! scheduling decision. All loops share one shape:
//!
//! ```text
//!   pop ready ──> lock thread ──> step (trampolined Call/Continue)
//!       │                           ├─ Yield   -> ready tail
//!       │                           ├─ Wait    -> wait queue
//!       │                           ├─ Blocked -> released (deadlock report if safe)
//!       │                           └─ Ended   -> released
//!       └─ empty ──> park on the pool condvar
//! ```
//!
//! The master also hands work to parked slaves, runs the cycle sweep when
//! idle, and detects quiescence: nothing ready and every slave parked.

use crate::collector::{self, SweepReport};
use crate::config::SchedulerConfig;
use crate::context::StepContext;
use crate::pithread::{LockedThread, PiThread};
use crate::procedure::{ProcRef, StepResult};
use crate::queue::{ReadyQueue, WaitQueue};
use crate::value::Value;
use crate::worker::{clear_current_worker_id, set_current_worker_id, WorkerPool, MASTER_ID};
use crossbeam_queue::SegQueue;
use pithread_core::kprint::{self, LogLevel};
use pithread_core::{kdebug, kerror, kinfo, ktrace, kwarn, pi_err};
use pithread_core::{AtomicCounter, AtomicFlag, ErrorKind, PiError, PiResult, PiThreadId, ResultExt, SpinLock, ThreadStatus};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Worker-count bookkeeping guarded by the pool lock
struct Parking {
    nb_waiting_slaves: usize,
}

#[derive(Default)]
struct PoolStats {
    spawned: AtomicU64,
    ended: AtomicU64,
    blocked: AtomicU64,
    sweeps: AtomicU64,
    swept: AtomicU64,
}

/// Summary of a completed run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub spawned: u64,
    pub ended: u64,
    pub blocked: u64,
    /// Threads still parked on the wait queue at quiescence
    pub parked_at_exit: usize,
    pub deadlocks: Vec<PiError>,
    pub sweeps: u64,
    pub swept: u64,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.deadlocks.is_empty() && self.parked_at_exit == 0
    }
}

/// Process-wide scheduler state
pub struct SchedPool {
    config: SchedulerConfig,
    ready: ReadyQueue<Arc<PiThread>>,
    wait: WaitQueue<Arc<PiThread>>,
    parking: Mutex<Parking>,
    cond: Condvar,
    nb_slaves: usize,
    waiting: AtomicCounter,
    master_idle: AtomicFlag,
    running: AtomicFlag,
    started: AtomicFlag,
    fatal: SpinLock<Option<PiError>>,
    deadlocks: SegQueue<PiError>,
    stats: PoolStats,
}

impl SchedPool {
    pub fn new(config: SchedulerConfig) -> PiResult<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            nb_slaves: config.num_workers - 1,
            config,
            ready: ReadyQueue::new(),
            wait: WaitQueue::new(),
            parking: Mutex::new(Parking { nb_waiting_slaves: 0 }),
            cond: Condvar::new(),
            waiting: AtomicCounter::new(0),
            master_idle: AtomicFlag::new(false),
            running: AtomicFlag::new(false),
            started: AtomicFlag::new(false),
            fatal: SpinLock::new(None),
            deadlocks: SegQueue::new(),
            stats: PoolStats::default(),
        }))
    }

    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    #[inline]
    pub fn ready_queue(&self) -> &ReadyQueue<Arc<PiThread>> {
        &self.ready
    }

    #[inline]
    pub fn wait_queue(&self) -> &WaitQueue<Arc<PiThread>> {
        &self.wait
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    #[inline]
    pub fn nb_slaves(&self) -> usize {
        self.nb_slaves
    }

    pub fn nb_waiting_slaves(&self) -> usize {
        self.parking_lock().nb_waiting_slaves
    }

    fn parking_lock(&self) -> MutexGuard<'_, Parking> {
        self.parking.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a thread running `proc` from label 0 with `args` in its
    /// first env slots, and put it at the head of the ready queue
    pub fn spawn(&self, proc: ProcRef, args: Vec<Value>) -> PiResult<PiThreadId> {
        let thread = PiThread::new(proc, self.config.fuel)?;
        {
            let mut t = thread.lock();
            for (slot, arg) in args.into_iter().enumerate() {
                if let Err(e) = t.bind(slot, arg) {
                    t.release()?;
                    return Err(e.push(ErrorKind::Contract, format!("spawning {}", t.proc.name()), file!(), line!()));
                }
            }
            ktrace!("spawn {} ({})", thread.id(), t.proc.name());
        }
        let id = thread.id();
        self.ready.push(thread);
        self.stats.spawned.fetch_add(1, Ordering::Relaxed);
        self.signal_work();
        Ok(id)
    }

    /// Wake a parked worker if anyone is parked
    pub fn signal_work(&self) {
        if self.waiting.get() > 0 || self.master_idle.get() {
            let _guard = self.parking_lock();
            self.cond.notify_one();
        }
    }

    /// Stop all loops at their next check
    pub fn shutdown(&self) {
        let _guard = self.parking_lock();
        self.running.set(false);
        self.cond.notify_all();
    }

    fn fail(&self, err: PiError) {
        kerror!("fatal: {}", err);
        {
            let mut fatal = self.fatal.lock();
            if fatal.is_none() {
                *fatal = Some(err);
            }
        }
        self.shutdown();
    }

    /// Run until quiescence, then tear down whatever is still parked
    ///
    /// Threads must have been spawned beforehand. A pool runs once.
    pub fn run(self: &Arc<Self>) -> PiResult<RunReport> {
        if !self.started.compare_and_swap(false, true) {
            return Err(pi_err!(ErrorKind::Config, "scheduler pool already ran"));
        }
        self.running.set(true);
        if self.config.wants_debug() {
            if !kprint::level_enabled(LogLevel::Debug) {
                kprint::set_log_level(LogLevel::Debug);
            }
            self.config.print();
        }
        kinfo!("pool starting: {} workers, {} ready", self.config.num_workers, self.ready.size());

        let pool = self.clone();
        let workers = match WorkerPool::start(self.nb_slaves, move |_| pool.slave_loop()) {
            Ok(w) => w,
            Err(e) => {
                self.shutdown();
                return Err(e);
            }
        };

        set_current_worker_id(MASTER_ID);
        self.master_loop();
        clear_current_worker_id();

        workers.join()?;
        let parked = self.teardown()?;
        if let Some(err) = self.fatal.lock().take() {
            return Err(err);
        }
        let report = self.report(parked);
        kinfo!(
            "pool stopped: {} spawned, {} ended, {} blocked, {} parked, {} deadlocks",
            report.spawned,
            report.ended,
            report.blocked,
            report.parked_at_exit,
            report.deadlocks.len()
        );
        Ok(report)
    }

    fn report(&self, parked_at_exit: usize) -> RunReport {
        let mut deadlocks = Vec::new();
        while let Some(d) = self.deadlocks.pop() {
            deadlocks.push(d);
        }
        RunReport {
            spawned: self.stats.spawned.load(Ordering::Relaxed),
            ended: self.stats.ended.load(Ordering::Relaxed),
            blocked: self.stats.blocked.load(Ordering::Relaxed),
            parked_at_exit,
            deadlocks,
            sweeps: self.stats.sweeps.load(Ordering::Relaxed),
            swept: self.stats.swept.load(Ordering::Relaxed),
        }
    }

    fn master_loop(&self) {
        let mut last_sweep_size = usize::MAX;
        while self.running.get() {
            if let Some(thread) = self.ready.pop() {
                if self.ready.len_hint() > 0 && self.waiting.get() > 0 {
                    let _guard = self.parking_lock();
                    self.cond.notify_one();
                }
                self.execute(thread);
                continue;
            }

            self.idle_sweep(&mut last_sweep_size);

            let parking = self.parking_lock();
            if !self.running.get() {
                break;
            }
            if self.ready.size() == 0 && parking.nb_waiting_slaves == self.nb_slaves {
                kdebug!("quiescent: {} parked on wait queue", self.wait.size());
                self.running.set(false);
                self.cond.notify_all();
                break;
            }
            self.master_idle.set(true);
            let _ = self
                .cond
                .wait_timeout(parking, self.config.park_timeout)
                .unwrap_or_else(PoisonError::into_inner);
            self.master_idle.set(false);
        }
    }

    fn slave_loop(&self) {
        while self.running.get() {
            match self.ready.pop() {
                Some(thread) => self.execute(thread),
                None => self.park_slave(),
            }
        }
    }

    fn park_slave(&self) {
        let mut parking = self.parking_lock();
        if !self.running.get() || self.ready.size() > 0 {
            return;
        }
        parking.nb_waiting_slaves += 1;
        self.waiting.set(parking.nb_waiting_slaves as i64);
        if parking.nb_waiting_slaves == self.nb_slaves {
            // Last one in; let the master check for quiescence
            self.cond.notify_all();
        }
        while self.running.get() && self.ready.size() == 0 {
            parking = self
                .cond
                .wait_timeout(parking, self.config.park_timeout)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        parking.nb_waiting_slaves -= 1;
        self.waiting.set(parking.nb_waiting_slaves as i64);
    }

    fn idle_sweep(&self, last_sweep_size: &mut usize) {
        let threshold = self.config.gc_threshold;
        if threshold == 0 {
            return;
        }
        let size = self.wait.size();
        if size < threshold || size == *last_sweep_size {
            return;
        }
        match self.sweep_cycles() {
            Ok(_) => *last_sweep_size = self.wait.size(),
            Err(e) => self.fail(e),
        }
    }

    /// Run one cycle sweep over the wait queue's old generation
    pub fn sweep_cycles(&self) -> PiResult<SweepReport> {
        let report = collector::sweep(&self.wait, self.config.gc_budget)?;
        self.stats.sweeps.fetch_add(1, Ordering::Relaxed);
        self.stats.swept.fetch_add(report.reclaimed as u64, Ordering::Relaxed);
        kdebug!("sweep: {} examined, {} reclaimed", report.examined, report.reclaimed);
        Ok(report)
    }

    fn execute(&self, thread: Arc<PiThread>) {
        let id = thread.id();
        match catch_unwind(AssertUnwindSafe(|| self.run_thread(thread))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.fail(e),
            Err(_) => self.fail(pi_err!(ErrorKind::Worker, "worker panicked while running {}", id)),
        }
    }

    /// Run one worker turn of `thread`
    pub fn run_thread(&self, thread: Arc<PiThread>) -> PiResult<()> {
        let mut me = thread.lock();
        let err = match self.drive(&thread, &mut me) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        match me.release() {
            Ok(()) => Err(err),
            Err(second) => {
                kwarn!("{} release after failure also failed: {}", thread.id(), second.root());
                Err(err.push(
                    second.kind(),
                    format!("releasing {} after failure: {}", thread.id(), second.root()),
                    file!(),
                    line!(),
                ))
            }
        }
    }

    fn drive(&self, thread: &Arc<PiThread>, me: &mut LockedThread) -> PiResult<()> {
        loop {
            let proc = me.proc.clone();
            let pc = me.pc;
            let result = {
                let mut ctx = StepContext::new(self, me);
                proc.step(&mut ctx)
            }
            .with_context(ErrorKind::Worker, || format!("{} in {} at label {}", thread.id(), proc.name(), pc))?;
            ktrace!("{} {}@{} -> {:?}", thread.id(), proc.name(), pc, result);

            match result {
                StepResult::Continue(label) => me.pc = label,
                StepResult::Call(callee, label) => {
                    me.status = ThreadStatus::Call;
                    me.reserve_env(callee.env_size())?;
                    me.proc = callee;
                    me.pc = label;
                }
                StepResult::Yield => {
                    me.status = ThreadStatus::Run;
                    me.knowns.sweep()?;
                    self.ready.add(thread.clone());
                    self.signal_work();
                    return Ok(());
                }
                StepResult::Wait => {
                    me.status = ThreadStatus::Wait;
                    me.knowns.sweep()?;
                    self.wait.push(thread.clone());
                    return Ok(());
                }
                StepResult::Blocked => {
                    me.status = ThreadStatus::Blocked;
                    if proc.is_safe_choice(pc) {
                        self.report_deadlock(thread.id(), proc.name(), pc);
                    }
                    me.release()?;
                    self.stats.blocked.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                StepResult::Ended => {
                    me.status = ThreadStatus::Ended;
                    me.release()?;
                    self.stats.ended.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
            }
        }
    }

    fn report_deadlock(&self, id: PiThreadId, name: &str, label: u32) {
        let err = pi_err!(ErrorKind::Deadlock, "{} blocked forever in {} at label {}", id, name, label);
        kerror!("{}", err);
        self.deadlocks.push(err);
    }

    /// Release every thread left on the queues. Returns how many were parked.
    fn teardown(&self) -> PiResult<usize> {
        let parked = self.wait.drain();
        let n = parked.len();
        for thread in parked.into_iter().chain(self.ready.drain()) {
            thread.lock().release()?;
        }
        if n > 0 {
            kdebug!("released {} parked threads", n);
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pithread::tests::Nop;
    use crate::procedure::Procedure;

    fn pool(workers: usize) -> Arc<SchedPool> {
        SchedPool::new(SchedulerConfig::new().num_workers(workers).gc_threshold(0)).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let err = SchedPool::new(SchedulerConfig::new().num_workers(0)).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_spawn_pushes_to_head() {
        let p = pool(1);
        let a = p.spawn(Arc::new(Nop(0)), vec![]).unwrap();
        let b = p.spawn(Arc::new(Nop(0)), vec![]).unwrap();
        assert_eq!(p.ready_queue().size(), 2);
        assert_eq!(p.ready_queue().pop().unwrap().id(), b);
        assert_eq!(p.ready_queue().pop().unwrap().id(), a);
    }

    #[test]
    fn test_spawn_rejects_extra_args() {
        let p = pool(1);
        let err = p.spawn(Arc::new(Nop(1)), vec![Value::Int(1), Value::Int(2)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Contract);
        assert_eq!(p.ready_queue().size(), 0);
    }

    #[test]
    fn test_empty_pool_quiesces() {
        let p = pool(4);
        let report = p.run().unwrap();
        assert_eq!(report.spawned, 0);
        assert!(!p.is_running());
        assert!(report.is_clean());
    }

    #[test]
    fn test_runs_to_end() {
        let p = pool(3);
        for _ in 0..50 {
            p.spawn(Arc::new(Nop(0)), vec![]).unwrap();
        }
        let report = p.run().unwrap();
        assert_eq!(report.spawned, 50);
        assert_eq!(report.ended, 50);
        assert_eq!(p.nb_waiting_slaves(), 0);
    }

    /// Gives away its own channel reference, then fails
    struct Overdraw;

    impl Procedure for Overdraw {
        fn name(&self) -> &str {
            "Overdraw"
        }
        fn env_size(&self) -> usize {
            1
        }
        fn step(&self, ctx: &mut StepContext<'_>) -> PiResult<StepResult> {
            let ch = ctx.new_channel(0)?;
            ch.dec_ref_count()?;
            Err(pi_err!(ErrorKind::Contract, "step gave up"))
        }
    }

    #[test]
    fn test_failed_release_is_reported() {
        let p = pool(1);
        p.spawn(Arc::new(Overdraw), vec![]).unwrap();
        let err = p.run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Contract);
        assert_eq!(err.root().message, "step gave up");
        let last = err.frames().last().unwrap();
        assert!(last.message.contains("releasing"), "got: {}", err);
        assert!(last.message.contains("below zero"), "got: {}", err);
    }

    #[test]
    fn test_runs_once() {
        let p = pool(1);
        p.run().unwrap();
        assert_eq!(p.run().unwrap_err().kind(), ErrorKind::Config);
    }
}
