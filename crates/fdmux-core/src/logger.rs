//! Stderr logger for fdmux applications
//!
//! The library crates only log through the `log` facade. Binaries that want
//! to see that output install this logger once at startup.
//!
//! # Environment Variables
//!
//! - `FDMUX_LOG_LEVEL=<level>` - off, error, warn, info, debug, trace (or 0..5)
//! - `FDMUX_FLUSH_LOG=1` - flush stderr after every line
//!
//! # Usage
//!
//! ```ignore
//! fdmux_core::logger::init();
//! log::info!("smoke test starting");
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::env::{env_get_bool, env_get_opt};

static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

fn prefix(level: Level) -> &'static str {
    match level {
        Level::Error => "[ERROR]",
        Level::Warn => "[WARN] ",
        Level::Info => "[INFO] ",
        Level::Debug => "[DEBUG]",
        Level::Trace => "[TRACE]",
    }
}

/// Parse a level name or its numeric form.
pub fn parse_level(raw: &str) -> Option<LevelFilter> {
    match raw.trim().to_lowercase().as_str() {
        "off" | "0" => Some(LevelFilter::Off),
        "error" | "1" => Some(LevelFilter::Error),
        "warn" | "2" => Some(LevelFilter::Warn),
        "info" | "3" => Some(LevelFilter::Info),
        "debug" | "4" => Some(LevelFilter::Debug),
        "trace" | "5" => Some(LevelFilter::Trace),
        _ => None,
    }
}

impl Log for StderrLogger {
    #[inline]
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let stderr = std::io::stderr();
        let mut handle = stderr.lock();
        let _ = writeln!(
            handle,
            "{} {}: {}",
            prefix(record.level()),
            record.target(),
            record.args()
        );
        if FLUSH_ENABLED.load(Ordering::Relaxed) {
            let _ = handle.flush();
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Install the stderr logger. Level defaults to `info`.
///
/// Safe to call more than once; only the first call installs.
pub fn init() {
    let level: Option<String> = env_get_opt("FDMUX_LOG_LEVEL");
    let level = level
        .as_deref()
        .and_then(parse_level)
        .unwrap_or(LevelFilter::Info);
    init_with_level(level);
}

/// Install the stderr logger at an explicit level.
pub fn init_with_level(level: LevelFilter) {
    FLUSH_ENABLED.store(env_get_bool("FDMUX_FLUSH_LOG", false), Ordering::Relaxed);
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

/// Change the level after `init`.
pub fn set_log_level(level: LevelFilter) {
    log::set_max_level(level);
}
