//! Worker thread management
//!
//! Slaves are named OS threads running the pool's worker loop; the master
//! loop runs on the thread that called `SchedPool::run`.

use crate::sys::os_thread_id;
use pithread_core::kprint;
use pithread_core::{kdebug, pi_err, ErrorKind, PiResult};
use std::cell::Cell;
use std::thread::{self, JoinHandle};

/// Worker index of the master loop
pub const MASTER_ID: usize = 0;

thread_local! {
    static CURRENT_WORKER_ID: Cell<usize> = const { Cell::new(usize::MAX) };
}

/// Set the current worker ID for this thread
pub fn set_current_worker_id(id: usize) {
    CURRENT_WORKER_ID.with(|cell| cell.set(id));
    kprint::set_worker_id(id as u32);
}

/// Forget the worker ID (the thread leaves the pool)
pub fn clear_current_worker_id() {
    CURRENT_WORKER_ID.with(|cell| cell.set(usize::MAX));
    kprint::clear_worker_id();
}

/// Get the current worker ID for this thread
#[inline]
pub fn current_worker_id() -> Option<usize> {
    let id = CURRENT_WORKER_ID.with(|cell| cell.get());
    (id != usize::MAX).then_some(id)
}

/// Pool of slave threads
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `num_slaves` threads numbered from 1, each running `worker_fn(id)`
    pub fn start<F>(num_slaves: usize, worker_fn: F) -> PiResult<Self>
    where
        F: Fn(usize) + Send + Sync + Clone + 'static,
    {
        let mut handles = Vec::with_capacity(num_slaves);
        for i in 1..=num_slaves {
            let worker_fn = worker_fn.clone();
            let handle = thread::Builder::new()
                .name(format!("pithread-worker-{}", i))
                .spawn(move || {
                    set_current_worker_id(i);
                    kdebug!("started (os thread {:#x})", os_thread_id());
                    worker_fn(i);
                    kdebug!("exiting");
                    clear_current_worker_id();
                })
                .map_err(|e| pi_err!(ErrorKind::Worker, "failed to spawn worker {}: {}", i, e))?;
            handles.push(handle);
        }
        Ok(Self { handles })
    }

    /// Wait for all workers to finish
    pub fn join(self) -> PiResult<()> {
        let mut panicked = 0;
        for handle in self.handles {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            return Err(pi_err!(ErrorKind::Worker, "{} worker thread(s) panicked", panicked));
        }
        Ok(())
    }

    #[inline]
    pub fn num_workers(&self) -> usize {
        self.handles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_start_and_join() {
        let sum = Arc::new(AtomicUsize::new(0));
        let s = sum.clone();
        let pool = WorkerPool::start(3, move |id| {
            assert_eq!(current_worker_id(), Some(id));
            s.fetch_add(id, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(pool.num_workers(), 3);
        pool.join().unwrap();
        assert_eq!(sum.load(Ordering::SeqCst), 1 + 2 + 3);
    }

    #[test]
    fn test_panic_reported() {
        let pool = WorkerPool::start(1, |_| panic!("boom")).unwrap();
        assert_eq!(pool.join().unwrap_err().kind(), ErrorKind::Worker);
    }

    #[test]
    fn test_worker_id_unset_outside_pool() {
        std::thread::spawn(|| assert_eq!(current_worker_id(), None)).join().unwrap();
    }
}
