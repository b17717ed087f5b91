//! Scheduler configuration

use crate::sys::num_cpus;
use pithread_core::constants::{
    DEFAULT_COMPACT_THRESHOLD, DEFAULT_FUEL, DEFAULT_GC_BUDGET, DEFAULT_GC_THRESHOLD, MAX_WORKERS,
};
use pithread_core::{env_get, env_get_bool, kprintln, pi_err, ErrorKind, PiResult};
use std::time::Duration;

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of worker threads, master included (defaults to CPU count)
    pub num_workers: usize,

    /// Choices a thread may complete before it must yield
    pub fuel: u32,

    /// Wait-queue size at which idle time triggers a cycle sweep (0 = never)
    pub gc_threshold: usize,

    /// Old-generation entries examined per sweep
    pub gc_budget: usize,

    /// Stale commitments met in one scan before a channel is compacted
    pub compact_threshold: usize,

    /// How long a parked worker sleeps before rechecking (default: 10ms)
    pub park_timeout: Duration,

    /// Enable debug logging
    pub debug_logging: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus().min(MAX_WORKERS),
            fuel: DEFAULT_FUEL,
            gc_threshold: DEFAULT_GC_THRESHOLD,
            gc_budget: DEFAULT_GC_BUDGET,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            park_timeout: Duration::from_millis(10),
            debug_logging: false,
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `PIT_*` environment variables
    ///
    /// - `PIT_WORKERS`, `PIT_FUEL`, `PIT_GC_THRESHOLD`, `PIT_GC_BUDGET`,
    ///   `PIT_COMPACT_THRESHOLD`, `PIT_PARK_TIMEOUT_MS`, `PIT_DEBUG`
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            num_workers: env_get("PIT_WORKERS", d.num_workers),
            fuel: env_get("PIT_FUEL", d.fuel),
            gc_threshold: env_get("PIT_GC_THRESHOLD", d.gc_threshold),
            gc_budget: env_get("PIT_GC_BUDGET", d.gc_budget),
            compact_threshold: env_get("PIT_COMPACT_THRESHOLD", d.compact_threshold),
            park_timeout: Duration::from_millis(env_get("PIT_PARK_TIMEOUT_MS", d.park_timeout.as_millis() as u64)),
            debug_logging: env_get_bool("PIT_DEBUG", d.debug_logging),
        }
    }

    /// Set number of worker threads
    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn fuel(mut self, fuel: u32) -> Self {
        self.fuel = fuel;
        self
    }

    pub fn gc_threshold(mut self, n: usize) -> Self {
        self.gc_threshold = n;
        self
    }

    pub fn gc_budget(mut self, n: usize) -> Self {
        self.gc_budget = n;
        self
    }

    pub fn compact_threshold(mut self, n: usize) -> Self {
        self.compact_threshold = n;
        self
    }

    pub fn park_timeout(mut self, d: Duration) -> Self {
        self.park_timeout = d;
        self
    }

    /// Enable debug logging
    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> PiResult<()> {
        if self.num_workers == 0 {
            return Err(pi_err!(ErrorKind::Config, "num_workers must be at least 1"));
        }
        if self.num_workers > MAX_WORKERS {
            return Err(pi_err!(ErrorKind::Config, "num_workers {} exceeds maximum {}", self.num_workers, MAX_WORKERS));
        }
        if self.fuel == 0 {
            return Err(pi_err!(ErrorKind::Config, "fuel must be at least 1"));
        }
        if self.gc_threshold > 0 && self.gc_budget == 0 {
            return Err(pi_err!(ErrorKind::Config, "gc_budget must be at least 1 when sweeping is enabled"));
        }
        Ok(())
    }

    /// Debug logging requested here or compiled in with `debug-logging`
    pub fn wants_debug(&self) -> bool {
        self.debug_logging || cfg!(feature = "debug-logging")
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        kprintln!("PiThread Configuration:");
        kprintln!("  num_workers:        {}", self.num_workers);
        kprintln!("  fuel:               {}", self.fuel);
        kprintln!("  gc_threshold:       {}", self.gc_threshold);
        kprintln!("  gc_budget:          {}", self.gc_budget);
        kprintln!("  compact_threshold:  {}", self.compact_threshold);
        kprintln!("  park_timeout:       {:?}", self.park_timeout);
        kprintln!("  debug_logging:      {}", self.debug_logging);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let cfg = SchedulerConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.fuel, DEFAULT_FUEL);
        assert!(cfg.num_workers >= 1 && cfg.num_workers <= MAX_WORKERS);
    }

    #[test]
    fn test_builder() {
        let cfg = SchedulerConfig::new()
            .num_workers(2)
            .fuel(3)
            .gc_threshold(0)
            .compact_threshold(4)
            .park_timeout(Duration::from_millis(1));
        assert_eq!(cfg.num_workers, 2);
        assert_eq!(cfg.fuel, 3);
        assert_eq!(cfg.gc_threshold, 0);
        assert_eq!(cfg.compact_threshold, 4);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects() {
        for cfg in [
            SchedulerConfig::new().num_workers(0),
            SchedulerConfig::new().num_workers(MAX_WORKERS + 1),
            SchedulerConfig::new().fuel(0),
            SchedulerConfig::new().gc_threshold(8).gc_budget(0),
        ] {
            assert_eq!(cfg.validate().unwrap_err().kind(), ErrorKind::Config);
        }
    }

    #[test]
    fn test_from_env_overlay() {
        std::env::set_var("PIT_FUEL", "7");
        std::env::set_var("PIT_PARK_TIMEOUT_MS", "3");
        let cfg = SchedulerConfig::from_env();
        std::env::remove_var("PIT_FUEL");
        std::env::remove_var("PIT_PARK_TIMEOUT_MS");
        assert_eq!(cfg.fuel, 7);
        assert_eq!(cfg.park_timeout, Duration::from_millis(3));
    }
}
