//! Error stack for the pi-thread runtime
//!
//! A `PiError` is a stack of frames, innermost cause first. Each frame
//! records what went wrong and where, and callers push outer frames as
//! the error travels up through constructors and worker loops.
//!
//! ```ignore
//! use pithread_core::{pi_err, ErrorKind, PiResult, ResultExt};
//!
//! fn slot(env: &[i64], i: usize) -> PiResult<i64> {
//!     env.get(i).copied().ok_or_else(|| pi_err!(ErrorKind::Contract, "slot {} out of range", i))
//! }
//!
//! fn step(env: &[i64]) -> PiResult<i64> {
//!     slot(env, 3).context(ErrorKind::Contract, "evaluating output")
//! }
//! ```

use core::fmt;
use std::panic::Location;

/// Result type for runtime operations
pub type PiResult<T> = Result<T, PiError>;

/// What kind of failure a frame describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Allocation failed; the runtime has no recovery strategy
    OutOfMemory,

    /// Broken invariant or null/type check in generated code or the runtime
    Contract,

    /// A thread blocked on a provably safe choice
    Deadlock,

    /// A lock was released while not held
    LockDiscipline,

    /// Invalid scheduler configuration
    Config,

    /// Worker thread could not be spawned or panicked
    Worker,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::OutOfMemory => write!(f, "out of memory"),
            ErrorKind::Contract => write!(f, "contract violation"),
            ErrorKind::Deadlock => write!(f, "deadlock"),
            ErrorKind::LockDiscipline => write!(f, "lock discipline"),
            ErrorKind::Config => write!(f, "configuration"),
            ErrorKind::Worker => write!(f, "worker"),
        }
    }
}

/// One entry of the causal chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: ErrorKind,
    pub message: String,
    pub file: &'static str,
    pub line: u32,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.kind, self.file, self.line)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// Stack of error frames, innermost first
#[derive(Clone, PartialEq, Eq)]
pub struct PiError {
    frames: Vec<Frame>,
}

impl PiError {
    /// Start a new stack with a single frame
    pub fn new(kind: ErrorKind, message: impl Into<String>, file: &'static str, line: u32) -> Self {
        Self {
            frames: vec![Frame { kind, message: message.into(), file, line }],
        }
    }

    /// Start a new stack located at the caller
    #[track_caller]
    pub fn here(kind: ErrorKind, message: impl Into<String>) -> Self {
        let loc = Location::caller();
        Self::new(kind, message, loc.file(), loc.line())
    }

    /// Push an outer frame
    pub fn push(mut self, kind: ErrorKind, message: impl Into<String>, file: &'static str, line: u32) -> Self {
        self.frames.push(Frame { kind, message: message.into(), file, line });
        self
    }

    /// Kind of the innermost (root) cause
    pub fn kind(&self) -> ErrorKind {
        self.root().kind
    }

    pub fn root(&self) -> &Frame {
        &self.frames[0]
    }

    /// All frames, innermost first
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// True if any frame carries `kind`
    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        self.frames.iter().any(|f| f.kind == kind)
    }
}

impl fmt::Display for PiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (depth, frame) in self.frames.iter().enumerate() {
            if depth > 0 {
                writeln!(f)?;
                write!(f, "  ")?;
            }
            write!(f, "#{} {}", depth, frame)?;
        }
        Ok(())
    }
}

impl fmt::Debug for PiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.frames.iter()).finish()
    }
}

impl std::error::Error for PiError {}

impl From<std::collections::TryReserveError> for PiError {
    #[track_caller]
    fn from(e: std::collections::TryReserveError) -> Self {
        PiError::here(ErrorKind::OutOfMemory, e.to_string())
    }
}

/// Add an outer frame to a failing `PiResult`
pub trait ResultExt<T> {
    fn context(self, kind: ErrorKind, msg: &str) -> PiResult<T>;

    fn with_context<F>(self, kind: ErrorKind, f: F) -> PiResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for PiResult<T> {
    #[track_caller]
    fn context(self, kind: ErrorKind, msg: &str) -> PiResult<T> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => {
                let loc = Location::caller();
                Err(e.push(kind, msg, loc.file(), loc.line()))
            }
        }
    }

    #[track_caller]
    fn with_context<F>(self, kind: ErrorKind, f: F) -> PiResult<T>
    where
        F: FnOnce() -> String,
    {
        match self {
            Ok(v) => Ok(v),
            Err(e) => {
                let loc = Location::caller();
                Err(e.push(kind, f(), loc.file(), loc.line()))
            }
        }
    }
}

/// Build a one-frame `PiError` at the current source location
///
/// ```ignore
/// return Err(pi_err!(ErrorKind::Contract, "slot {} is not a channel", slot));
/// ```
#[macro_export]
macro_rules! pi_err {
    ($kind:expr, $($arg:tt)*) => {
        $crate::error::PiError::new($kind, format!($($arg)*), file!(), line!())
    };
}
