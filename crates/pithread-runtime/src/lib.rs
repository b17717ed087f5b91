//! # pithread-runtime
//!
//! Scheduler and rendezvous protocol for pi-threads.
//!
//! ## Modules
//!
//! - `channel` - reference-counted rendezvous channels
//! - `commit` - commitments, try/register/claim/awake
//! - `knownset` - per-thread channel ownership
//! - `pithread` - pi-threads and their locked handle
//! - `procedure` - the generated-code contract
//! - `context` - step context and the guarded-choice driver
//! - `queue` - ready and wait queues
//! - `scheduler` - the worker pool loops
//! - `collector` - cycle sweep over parked threads
//! - `config` - scheduler configuration
//! - `worker` - slave thread management
//! - `sys` - OS hooks

pub mod sys;
pub mod value;
pub mod channel;
pub mod knownset;
pub mod commit;
pub mod pithread;
pub mod procedure;
pub mod context;
pub mod queue;
pub mod config;
pub mod worker;
pub mod scheduler;
pub mod collector;

pub use channel::{ChannelRef, RcOutcome};
pub use collector::SweepReport;
pub use commit::{
    awake, can_awake, is_valid_commit, register_input_commitment, register_output_commitment, try_input_action,
    try_output_action, CommitKind, CommitList, Commitment, EvalFn, Polarity, Rendezvous, TryOptions, TryResult,
};
pub use config::SchedulerConfig;
pub use context::{Branch, StepContext};
pub use knownset::{KnownSet, KnownState};
pub use pithread::{LockedThread, PiThread, ThreadState};
pub use procedure::{Label, ProcRef, Procedure, StepResult};
pub use scheduler::{RunReport, SchedPool};
pub use sys::low_level_yield;
pub use value::Value;

// Re-export core types
pub use pithread_core::{ChannelId, ErrorKind, PiError, PiResult, PiThreadId, ResultExt, ThreadStatus};
