//! # fdmux-core
//!
//! Core types and traits for fdmux, an I/O readiness multiplexer.
//!
//! This crate contains no OS calls. The native backends (select, poll,
//! epoll) live in the `fdmux` crate and implement the `Multiplexer` trait
//! defined here.
//!
//! ## Modules
//!
//! - `interest` - Interest / readiness bit set
//! - `event` - `ReadyPair` and the timeout sentinel
//! - `queue` - O(1) ready-event queue keyed by fd
//! - `mux` - `Multiplexer` contract, `BackendKind`, shared validation
//! - `error` - Error types
//! - `config` - Constructor-time configuration
//! - `env` - Environment variable helpers
//! - `logger` - Stderr `log` backend for binaries

pub mod interest;
pub mod event;
pub mod queue;
pub mod mux;
pub mod error;
pub mod config;
pub mod env;
pub mod logger;

// Re-exports for convenience
pub use interest::Interest;
pub use event::ReadyPair;
pub use queue::ReadyQueue;
pub use mux::{BackendKind, Multiplexer, WAIT_FOREVER, WAIT_NONE};
pub use error::{ErrorKind, MuxError, MuxResult, NativeOp};
pub use config::MuxConfig;
