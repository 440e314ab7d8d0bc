//! Multiplexer configuration
//!
//! Constructor-time only. `MuxConfig::default()` is pure library defaults;
//! applications that want environment overrides opt in with `from_env()`.
//!
//! ```rust,ignore
//! use fdmux_core::config::MuxConfig;
//! use fdmux_core::BackendKind;
//!
//! let config = MuxConfig::default()
//!     .backend(BackendKind::Poll);
//!
//! // Or honour FDMUX_* variables
//! let config = MuxConfig::from_env();
//! ```

use crate::env::{env_get, env_get_opt};
use crate::mux::BackendKind;

/// Library defaults
pub mod defaults {
    /// Initial length of the select backend's per-fd byte array
    pub const SELECT_INITIAL_SLOTS: usize = 32;
    /// Records fetched per `epoll_wait` call
    pub const EPOLL_BATCH: usize = 16;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxConfig {
    /// Native mechanism to construct
    pub backend: BackendKind,
    /// Initial per-fd slot count for the select backend (doubles on demand)
    pub select_initial_slots: usize,
    /// Kernel batch buffer size for the epoll backend
    pub epoll_batch: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::platform_default(),
            select_initial_slots: defaults::SELECT_INITIAL_SLOTS,
            epoll_batch: defaults::EPOLL_BATCH,
        }
    }
}

impl MuxConfig {
    /// Library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `FDMUX_BACKEND` - `select`, `poll` or `epoll`
    /// - `FDMUX_SELECT_SLOTS` - initial select slot count
    /// - `FDMUX_EPOLL_BATCH` - epoll batch buffer size
    ///
    /// Unparsable values keep the default.
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            backend: env_get_opt("FDMUX_BACKEND").unwrap_or(base.backend),
            select_initial_slots: env_get("FDMUX_SELECT_SLOTS", base.select_initial_slots),
            epoll_batch: env_get("FDMUX_EPOLL_BATCH", base.epoll_batch),
        }
        .normalized()
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn select_initial_slots(mut self, slots: usize) -> Self {
        self.select_initial_slots = slots;
        self.normalized()
    }

    pub fn epoll_batch(mut self, batch: usize) -> Self {
        self.epoll_batch = batch;
        self.normalized()
    }

    /// Zero-sized buffers are bumped to 1.
    fn normalized(mut self) -> Self {
        self.select_initial_slots = self.select_initial_slots.max(1);
        self.epoll_batch = self.epoll_batch.max(1);
        self
    }
}
