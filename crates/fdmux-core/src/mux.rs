//! Multiplexer contract
//!
//! Every backend implements `Multiplexer` with identical observable
//! behavior. Argument validation is shared here so the checks run in the
//! same order, before any state or native call is touched:
//!
//! 1. closed            -> `Closed`
//! 2. negative fd       -> `InvalidFd`
//! 3. interest mask     -> `EmptyInterest` / `UnsupportedInterest`
//! 4. registration      -> `AlreadyRegistered` / `NotRegistered`
//!
//! # Implementors
//!
//! - `Select` (bitmask): `select(2)` over three fd sets
//! - `Poll` (dense array): `poll(2)` over a `pollfd` array
//! - `Epoll` (kernel-resident, Linux): `epoll_ctl(2)` / `epoll_wait(2)`

use core::fmt;
use core::str::FromStr;
use std::os::unix::io::RawFd;

use crate::error::{MuxError, MuxResult};
use crate::event::ReadyPair;
use crate::interest::Interest;

/// Block until something is ready.
pub const WAIT_FOREVER: i32 = -1;

/// Return immediately.
pub const WAIT_NONE: i32 = 0;

/// Which native mechanism backs a multiplexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// `select(2)`
    Select,
    /// `poll(2)`
    Poll,
    /// `epoll(7)`
    Epoll,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::Select, BackendKind::Poll, BackendKind::Epoll];

    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Select => "select",
            BackendKind::Poll => "poll",
            BackendKind::Epoll => "epoll",
        }
    }

    /// Best backend for the current platform.
    pub fn platform_default() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(any(target_os = "linux", target_os = "android"))] {
                BackendKind::Epoll
            } else {
                BackendKind::Poll
            }
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "select" => Ok(BackendKind::Select),
            "poll" => Ok(BackendKind::Poll),
            "epoll" => Ok(BackendKind::Epoll),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// I/O readiness multiplexer.
///
/// **Contract:**
/// - At most one registration per fd; `insert` never merges.
/// - A registered fd always has a non-empty interest mask.
/// - `wait` returns exactly one `ReadyPair`, or `ReadyPair::TIMEOUT`.
///   Pairs buffered by an earlier native call are returned first, without
///   another native call.
/// - `erase` drops any buffered pair for the fd.
/// - After `close`, everything except `is_open`/`close` fails with `Closed`.
/// - The multiplexer never closes the descriptors it watches.
///
/// Not thread-safe: calls on one instance must be serialized by the caller.
pub trait Multiplexer: Send {
    /// Native mechanism behind this instance
    fn backend(&self) -> BackendKind;

    /// Start watching `fd` for `interest`.
    fn insert(&mut self, fd: RawFd, interest: Interest) -> MuxResult<()>;

    /// Stop watching `fd`.
    fn erase(&mut self, fd: RawFd) -> MuxResult<()>;

    /// Replace the interest mask of a registered `fd`.
    ///
    /// A pair already buffered for `fd` is delivered unchanged.
    fn modify(&mut self, fd: RawFd, interest: Interest) -> MuxResult<()>;

    /// Registered interest for `fd`; `None` if unregistered or closed.
    fn interest(&self, fd: RawFd) -> Option<Interest>;

    /// Number of registered descriptors
    fn size(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Number of ready pairs buffered from earlier native calls
    fn pending(&self) -> usize;

    /// Remove every registration and buffered pair. Stays open.
    fn clear(&mut self);

    /// Wait up to `timeout_ms` (-1 = forever, 0 = poll) for one ready fd.
    fn wait(&mut self, timeout_ms: i32) -> MuxResult<ReadyPair>;

    /// Append every currently ready pair to `out`.
    ///
    /// Blocks like `wait` for the first one, then drains whatever the
    /// backend has buffered. Returns the number appended (0 on timeout).
    fn wait_batch(&mut self, out: &mut Vec<ReadyPair>, timeout_ms: i32) -> MuxResult<usize> {
        let first = self.wait(timeout_ms)?;
        if first.is_timeout() {
            return Ok(0);
        }
        out.push(first);
        let mut n = 1;
        while self.pending() > 0 {
            let pair = self.wait(WAIT_NONE)?;
            if pair.is_timeout() {
                break;
            }
            out.push(pair);
            n += 1;
        }
        Ok(n)
    }

    fn is_open(&self) -> bool;

    /// Release native resources and all state. Idempotent.
    fn close(&mut self);
}

impl<M: Multiplexer + ?Sized> Multiplexer for Box<M> {
    fn backend(&self) -> BackendKind {
        (**self).backend()
    }
    fn insert(&mut self, fd: RawFd, interest: Interest) -> MuxResult<()> {
        (**self).insert(fd, interest)
    }
    fn erase(&mut self, fd: RawFd) -> MuxResult<()> {
        (**self).erase(fd)
    }
    fn modify(&mut self, fd: RawFd, interest: Interest) -> MuxResult<()> {
        (**self).modify(fd, interest)
    }
    fn interest(&self, fd: RawFd) -> Option<Interest> {
        (**self).interest(fd)
    }
    fn size(&self) -> usize {
        (**self).size()
    }
    fn pending(&self) -> usize {
        (**self).pending()
    }
    fn clear(&mut self) {
        (**self).clear()
    }
    fn wait(&mut self, timeout_ms: i32) -> MuxResult<ReadyPair> {
        (**self).wait(timeout_ms)
    }
    fn wait_batch(&mut self, out: &mut Vec<ReadyPair>, timeout_ms: i32) -> MuxResult<usize> {
        (**self).wait_batch(out, timeout_ms)
    }
    fn is_open(&self) -> bool {
        (**self).is_open()
    }
    fn close(&mut self) {
        (**self).close()
    }
}

// ============================================================================
// Shared argument validation
// ============================================================================

#[inline]
pub fn check_open(open: bool) -> MuxResult<()> {
    if open {
        Ok(())
    } else {
        Err(MuxError::Closed)
    }
}

#[inline]
pub fn check_fd(fd: RawFd) -> MuxResult<()> {
    if fd < 0 {
        return Err(MuxError::InvalidFd(fd));
    }
    Ok(())
}

/// Registration masks must be non-empty and within `Interest::WATCHABLE`.
#[inline]
pub fn check_interest(interest: Interest) -> MuxResult<()> {
    if interest.is_empty() {
        return Err(MuxError::EmptyInterest);
    }
    let extra = interest - Interest::WATCHABLE;
    if !extra.is_empty() {
        return Err(MuxError::UnsupportedInterest(extra.bits()));
    }
    Ok(())
}

#[inline]
pub fn check_timeout(timeout_ms: i32) -> MuxResult<()> {
    if timeout_ms < WAIT_FOREVER {
        return Err(MuxError::InvalidTimeout(timeout_ms));
    }
    Ok(())
}

/// Checks shared by `wait`: open, valid timeout, something registered.
#[inline]
pub fn check_wait(open: bool, size: usize, timeout_ms: i32) -> MuxResult<()> {
    check_open(open)?;
    check_timeout(timeout_ms)?;
    if size == 0 {
        return Err(MuxError::NothingToWait);
    }
    Ok(())
}
