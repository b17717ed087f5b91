//! # pithread - Pi-calculus Thread Runtime
//!
//! Runs many lightweight pi-threads on a fixed pool of OS workers. Threads
//! talk only through synchronous rendezvous channels, and a thread may
//! offer several actions at once as a guarded choice of which exactly one
//! fires.
//!
//! ## Quick Start
//!
//! ```ignore
//! use pithread::{Procedure, StepContext, StepResult, PiResult};
//! use std::sync::Arc;
//!
//! struct Hello;
//!
//! impl Procedure for Hello {
//!     fn name(&self) -> &str { "Hello" }
//!     fn env_size(&self) -> usize { 0 }
//!     fn step(&self, _ctx: &mut StepContext<'_>) -> PiResult<StepResult> {
//!         println!("hello from a pi-thread");
//!         Ok(StepResult::Ended)
//!     }
//! }
//!
//! fn main() {
//!     let report = pithread::exit_on_error(pithread::main(4, Arc::new(Hello)));
//!     assert_eq!(report.ended, 1);
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Procedures (step code)                   │
//! │        pc dispatch, choice(&[Branch]), spawn, forget        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SchedPool                           │
//! │     ready queue, wait queue (active/old), cycle sweep       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌───────────┐      ┌───────────┐
//!    │  Master   │      │  Slave 1  │      │  Slave n  │
//!    │ (caller)  │      │  thread   │      │  thread   │
//!    └───────────┘      └───────────┘      └───────────┘
//!          │                   │                   │
//!          └───────────────────┼───────────────────┘
//!                              ▼
//!    ┌─────────────────────────────────────────────────────────┐
//!    │                       Channels                          │
//!    │   input/output commitment lists, global refcount        │
//!    └─────────────────────────────────────────────────────────┘
//! ```

// Re-export core types
pub use pithread_core::{
    ChannelId,
    PiThreadId,
    ThreadStatus,
    Clock,
    ErrorKind,
    Frame,
    PiError,
    PiResult,
    ResultExt,
    pi_err,
};

// Re-export kprint macros for debug logging
pub use pithread_core::{kprint, kprintln, kerror, kwarn, kinfo, kdebug, ktrace};
pub use pithread_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use pithread_core::{env_get, env_get_bool, env_get_opt};

// Re-export runtime types
pub use pithread_runtime::{
    Branch,
    ChannelRef,
    CommitKind,
    Commitment,
    EvalFn,
    KnownState,
    Label,
    ProcRef,
    Procedure,
    RunReport,
    SchedPool,
    SchedulerConfig,
    StepContext,
    StepResult,
    SweepReport,
    ThreadState,
    Value,
    low_level_yield,
};

use std::sync::Arc;

/// Runtime handle owning one scheduler pool
///
/// Threads spawned before `run` are seeded into the ready queue in
/// spawn order, the most recent one running first.
pub struct Runtime {
    pool: Arc<SchedPool>,
}

impl Runtime {
    /// Create a runtime with the given configuration
    ///
    /// Worker threads are not started until `run`.
    pub fn new(config: SchedulerConfig) -> PiResult<Self> {
        let pool = SchedPool::new(config).context(ErrorKind::Config, "creating runtime")?;
        Ok(Self { pool })
    }

    /// Runtime configured from `PIT_*` environment variables
    pub fn from_env() -> PiResult<Self> {
        Self::new(SchedulerConfig::from_env())
    }

    /// Seed a thread running `proc` with `args` bound to its first slots
    pub fn spawn(&self, proc: ProcRef, args: Vec<Value>) -> PiResult<PiThreadId> {
        self.pool.spawn(proc, args)
    }

    pub fn pool(&self) -> &Arc<SchedPool> {
        &self.pool
    }

    /// Run on the calling thread as master until quiescence
    pub fn run(self) -> PiResult<RunReport> {
        self.pool.run()
    }
}

/// Bootstrap: run `entry` on `nb_worker_threads` workers until quiescence
///
/// The caller becomes the master and `nb_worker_threads - 1` slaves are
/// started. Other tuning comes from the environment.
pub fn main(nb_worker_threads: usize, entry: ProcRef) -> PiResult<RunReport> {
    let config = SchedulerConfig::from_env().num_workers(nb_worker_threads);
    let runtime = Runtime::new(config)?;
    runtime
        .spawn(entry, Vec::new())
        .context(ErrorKind::Contract, "spawning entry procedure")?;
    runtime.run()
}

/// Print the error chain, innermost cause first
pub fn report_error(err: &PiError) {
    kprintln!("pithread: fatal {}", err.kind());
    for (depth, frame) in err.frames().iter().enumerate() {
        kprintln!("  #{} {}", depth, frame);
    }
}

/// Unwrap a result or print its causal chain and exit with status 1
pub fn exit_on_error<T>(res: PiResult<T>) -> T {
    match res {
        Ok(v) => v,
        Err(e) => {
            report_error(&e);
            std::process::exit(1);
        }
    }
}
