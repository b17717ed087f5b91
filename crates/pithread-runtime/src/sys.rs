//! OS hooks used by the runtime
//!
//! Only two things are needed from the platform: a non-blocking hint to
//! the OS scheduler while spinning on a pi-thread lock, and a thread id
//! for log lines.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        /// Give up the rest of this OS thread's time slice
        ///
        /// Used while spin-retrying a pi-thread lock held by another worker.
        #[inline]
        pub fn low_level_yield() {
            // sched_yield(2) cannot fail on Linux; elsewhere fall back
            if nix::sched::sched_yield().is_err() {
                std::thread::yield_now();
            }
        }

        /// Native id of the calling OS thread
        #[inline]
        pub fn os_thread_id() -> u64 {
            // SAFETY: pthread_self has no preconditions
            unsafe { libc::pthread_self() as u64 }
        }
    } else {
        #[inline]
        pub fn low_level_yield() {
            std::thread::yield_now();
        }

        #[inline]
        pub fn os_thread_id() -> u64 {
            0
        }
    }
}

/// Number of CPUs available to this process
pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
