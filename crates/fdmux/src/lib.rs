//! # fdmux
//!
//! Native readiness multiplexers behind the `fdmux_core::Multiplexer`
//! contract.
//!
//! | Backend  | Native call     | Registration state            |
//! |----------|-----------------|-------------------------------|
//! | `Select` | `select(2)`     | per-fd bytes + three fd sets  |
//! | `Poll`   | `poll(2)`       | dense `pollfd` array          |
//! | `Epoll`  | `epoll_wait(2)` | kernel, plus a local fd map   |
//!
//! Pick one at construction time with `open()`; the choice never changes
//! afterwards.
//!
//! ```rust,ignore
//! use fdmux::{open, Interest, MuxConfig, WAIT_FOREVER};
//!
//! let mut mux = open(&MuxConfig::default())?;
//! mux.insert(sock_fd, Interest::READABLE)?;
//! let pair = mux.wait(WAIT_FOREVER)?;
//! ```

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod sys;
        pub mod select;
        pub mod poll;
        pub mod permissive;

        pub use select::Select;
        pub use poll::Poll;
        pub use permissive::Permissive;
    } else {
        compile_error!("fdmux supports unix targets only");
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        pub mod epoll;
        pub use epoll::Epoll;
    }
}

#[cfg(test)]
mod contract_tests;

pub use fdmux_core::{
    BackendKind, ErrorKind, Interest, MuxConfig, MuxError, MuxResult, Multiplexer, ReadyPair,
    ReadyQueue, WAIT_FOREVER, WAIT_NONE,
};

/// Kinds that can be constructed on this platform
pub fn available_backends() -> Vec<BackendKind> {
    BackendKind::ALL
        .into_iter()
        .filter(|kind| is_available(*kind))
        .collect()
}

fn is_available(kind: BackendKind) -> bool {
    match kind {
        BackendKind::Select | BackendKind::Poll => true,
        BackendKind::Epoll => cfg!(any(target_os = "linux", target_os = "android")),
    }
}

/// Construct the backend named by `config`.
pub fn open(config: &MuxConfig) -> MuxResult<Box<dyn Multiplexer>> {
    log::debug!("fdmux: opening {} backend", config.backend);
    match config.backend {
        BackendKind::Select => Ok(Box::new(Select::with_slots(config.select_initial_slots))),
        BackendKind::Poll => Ok(Box::new(Poll::new())),
        BackendKind::Epoll => open_epoll(config.epoll_batch),
    }
}

/// Construct `kind` with default tuning.
pub fn open_kind(kind: BackendKind) -> MuxResult<Box<dyn Multiplexer>> {
    open(&MuxConfig::default().backend(kind))
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        fn open_epoll(batch: usize) -> MuxResult<Box<dyn Multiplexer>> {
            Ok(Box::new(Epoll::with_batch(batch)?))
        }
    } else {
        fn open_epoll(_batch: usize) -> MuxResult<Box<dyn Multiplexer>> {
            Err(MuxError::Unsupported(BackendKind::Epoll))
        }
    }
}
