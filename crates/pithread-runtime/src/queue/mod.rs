//! Ready and wait queues
//!
//! - `ReadyQueue` - runnable threads; `push` at the head for work that
//!   should run soon, `add` at the tail for fairness
//! - `WaitQueue` - parked threads in two generations, "active" and "old",
//!   so the cycle sweep can scan survivors incrementally
//!
//! Both are generic over the stored item so their ordering rules can be
//! checked without building pi-threads.

mod ready;
mod wait;

pub use ready::ReadyQueue;
pub use wait::WaitQueue;

use crate::pithread::PiThread;
use pithread_core::PiThreadId;
use std::sync::Arc;

/// Items that can be fetched out of a queue by identity
pub trait Keyed {
    type Key: PartialEq;

    fn key(&self) -> Self::Key;
}

impl Keyed for Arc<PiThread> {
    type Key = PiThreadId;

    #[inline]
    fn key(&self) -> PiThreadId {
        self.id()
    }
}
