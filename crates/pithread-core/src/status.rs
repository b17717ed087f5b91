//! Pi-thread status

use core::fmt;

/// Scheduling status of a pi-thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadStatus {
    /// Runnable: in the ready queue or executing on a worker
    Run = 0,

    /// Tail-called into another procedure; resumed in the same worker turn
    Call = 1,

    /// Parked on the wait queue with registered commitments
    Wait = 2,

    /// Finished; its references have been released
    Ended = 3,

    /// No enabled branch and nothing registered; can never be woken
    Blocked = 4,
}

impl ThreadStatus {
    #[inline]
    pub const fn is_terminated(&self) -> bool {
        matches!(self, ThreadStatus::Ended | ThreadStatus::Blocked)
    }

    #[inline]
    pub const fn is_parked(&self) -> bool {
        matches!(self, ThreadStatus::Wait)
    }
}

impl Default for ThreadStatus {
    fn default() -> Self {
        ThreadStatus::Run
    }
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadStatus::Run => write!(f, "RUN"),
            ThreadStatus::Call => write!(f, "CALL"),
            ThreadStatus::Wait => write!(f, "WAIT"),
            ThreadStatus::Ended => write!(f, "ENDED"),
            ThreadStatus::Blocked => write!(f, "BLOCKED"),
        }
    }
}
