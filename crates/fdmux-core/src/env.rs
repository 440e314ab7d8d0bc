//! Environment variable helpers
//!
//! Only `MuxConfig::from_env()` and the logger read the environment; the
//! multiplexers themselves never do.
//!
//! ```ignore
//! use fdmux_core::env::{env_get, env_get_bool};
//!
//! let batch: usize = env_get("FDMUX_EPOLL_BATCH", 16);
//! let flush = env_get_bool("FDMUX_FLUSH_LOG", false);
//! ```

use std::str::FromStr;

/// Parse `key` as `T`, falling back to `default` when unset or unparsable.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Parse `key` as `T`; `None` when unset or unparsable.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// "1", "true", "yes", "on" (any case) are true; any other value is false.
/// Unset returns `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}
