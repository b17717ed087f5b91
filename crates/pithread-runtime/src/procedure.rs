//! The contract between the runtime and generated process code
//!
//! Each process definition compiles to a `Procedure`: a state machine
//! keyed by an integer label. The scheduler calls `step` with the
//! thread's current label in `ctx.pc()` and acts on the returned
//! `StepResult`.

use crate::context::StepContext;
use pithread_core::PiResult;
use std::fmt;
use std::sync::Arc;

/// Resumption point within a procedure
pub type Label = u32;

/// Shared handle to a procedure
pub type ProcRef = Arc<dyn Procedure>;

/// A compiled process definition
pub trait Procedure: Send + Sync {
    /// Name for log lines and deadlock reports
    fn name(&self) -> &str;

    /// Number of environment slots this procedure addresses
    fn env_size(&self) -> usize;

    /// Run from `ctx.pc()` until the next scheduling decision
    fn step(&self, ctx: &mut StepContext<'_>) -> PiResult<StepResult>;

    /// True if the choice at `label` can never be unblocked from outside
    ///
    /// A thread that blocks on such a choice is reported as deadlocked.
    fn is_safe_choice(&self, _label: Label) -> bool {
        false
    }
}

/// What the scheduler should do after a step
pub enum StepResult {
    /// Jump to a label and keep running in this worker turn
    Continue(Label),
    /// Fuel ran out; go to the back of the ready queue, same label
    Yield,
    /// Commitments registered; park on the wait queue
    Wait,
    /// No branch can ever fire
    Blocked,
    /// Tail-call another procedure at a label, same worker turn
    Call(ProcRef, Label),
    /// Done
    Ended,
}

impl StepResult {
    pub fn name(&self) -> &'static str {
        match self {
            StepResult::Continue(_) => "continue",
            StepResult::Yield => "yield",
            StepResult::Wait => "wait",
            StepResult::Blocked => "blocked",
            StepResult::Call(..) => "call",
            StepResult::Ended => "ended",
        }
    }
}

impl fmt::Debug for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepResult::Continue(l) => write!(f, "Continue({})", l),
            StepResult::Call(p, l) => write!(f, "Call({}, {})", p.name(), l),
            other => write!(f, "{}", other.name()),
        }
    }
}

impl PartialEq for StepResult {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StepResult::Continue(a), StepResult::Continue(b)) => a == b,
            (StepResult::Call(p, a), StepResult::Call(q, b)) => Arc::ptr_eq(p, q) && a == b,
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}
