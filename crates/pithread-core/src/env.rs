//! Environment variable helpers
//!
//! Runtime tuning knobs (`PIT_WORKERS`, `PIT_FUEL`, ...) are plain
//! integers read from the environment with a fallback.
//!
//! ```ignore
//! use pithread_core::env::{env_get, env_get_bool};
//!
//! let workers: usize = env_get("PIT_WORKERS", 4);
//! let debug = env_get_bool("PIT_DEBUG", false);
//! ```

use std::str::FromStr;

/// Get an environment variable parsed as `T`, or `default`
///
/// Unset and unparsable values both fall back to `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get an environment variable as boolean
///
/// "1", "true", "yes", "on" (any case) are true; any other set value is false.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// `Some(T)` if set and parsable
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
