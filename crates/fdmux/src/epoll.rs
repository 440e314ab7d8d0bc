//! `Epoll`: kernel-resident backend over `epoll(7)` (Linux only).
//!
//! The kernel owns the interest set. Locally we keep an fd -> interest map so
//! duplicate inserts and unknown fds are reported as usage errors instead of
//! raw `EEXIST`/`ENOENT`, and so stale kernel records for an fd erased after
//! the batch was fetched are dropped.
//!
//! `epoll_wait` fills a fixed batch buffer. `wait` queues the whole batch and
//! hands it out one pair at a time; `wait_batch` keeps re-invoking with a zero
//! timeout while the buffer comes back full.

use std::collections::HashMap;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::io::RawFd;

use fdmux_core::config::defaults;
use fdmux_core::error::{MuxError, MuxResult, NativeOp};
use fdmux_core::mux::{self, BackendKind, Multiplexer};
use fdmux_core::{Interest, ReadyPair, ReadyQueue};

use crate::sys;

const EPOLLIN: u32 = libc::EPOLLIN as u32;
const EPOLLPRI: u32 = libc::EPOLLPRI as u32;
const EPOLLOUT: u32 = libc::EPOLLOUT as u32;
const EPOLLERR: u32 = libc::EPOLLERR as u32;
const EPOLLHUP: u32 = libc::EPOLLHUP as u32;

fn to_events(interest: Interest) -> u32 {
    let mut events = 0;
    if interest.is_readable() {
        events |= EPOLLIN;
    }
    if interest.is_priority() {
        events |= EPOLLPRI;
    }
    if interest.is_writable() {
        events |= EPOLLOUT;
    }
    events
}

fn from_events(events: u32) -> Interest {
    let mut ready = Interest::empty();
    if events & EPOLLIN != 0 {
        ready |= Interest::READABLE;
    }
    if events & EPOLLPRI != 0 {
        ready |= Interest::PRIORITY;
    }
    if events & EPOLLOUT != 0 {
        ready |= Interest::WRITABLE;
    }
    if events & EPOLLERR != 0 {
        ready |= Interest::ERROR;
    }
    if events & EPOLLHUP != 0 {
        ready |= Interest::HANGUP;
    }
    ready
}

/// Kernel-resident multiplexer.
pub struct Epoll {
    epfd: Option<OwnedFd>,
    registered: HashMap<RawFd, Interest>,
    queue: ReadyQueue,
    events: Vec<libc::epoll_event>,
}

impl Epoll {
    pub fn new() -> MuxResult<Self> {
        Self::with_batch(defaults::EPOLL_BATCH)
    }

    /// Create an epoll instance fetching up to `batch` records per call.
    pub fn with_batch(batch: usize) -> MuxResult<Self> {
        let raw = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if raw < 0 {
            return Err(sys::last_os_error(NativeOp::Create));
        }
        let epfd = unsafe { OwnedFd::from_raw_fd(raw) };
        let batch = batch.clamp(1, i32::MAX as usize);
        log::debug!("epoll: created epfd={} batch={}", raw, batch);
        Ok(Self {
            epfd: Some(epfd),
            registered: HashMap::new(),
            queue: ReadyQueue::new(),
            events: vec![libc::epoll_event { events: 0, u64: 0 }; batch],
        })
    }

    /// Records fetched per `epoll_wait`
    pub fn batch(&self) -> usize {
        self.events.len()
    }

    fn raw_epfd(&self) -> MuxResult<RawFd> {
        self.epfd
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or(MuxError::Closed)
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, interest: Interest) -> MuxResult<()> {
        let epfd = self.raw_epfd()?;
        let mut ev = libc::epoll_event {
            events: to_events(interest),
            u64: fd as u64,
        };
        let ret = unsafe { libc::epoll_ctl(epfd, op, fd, &mut ev) };
        if ret < 0 {
            let native = match op {
                libc::EPOLL_CTL_ADD => NativeOp::Insert,
                libc::EPOLL_CTL_DEL => NativeOp::Erase,
                _ => NativeOp::Modify,
            };
            return Err(sys::last_os_error(native));
        }
        Ok(())
    }

    /// One `epoll_wait` into the batch buffer; queue what came back.
    ///
    /// Returns the number of kernel records, so callers can tell a full
    /// buffer from a partial one.
    fn fill(&mut self, timeout_ms: i32) -> MuxResult<usize> {
        let epfd = self.raw_epfd()?;
        let n = unsafe {
            libc::epoll_wait(
                epfd,
                self.events.as_mut_ptr(),
                self.events.len() as libc::c_int,
                timeout_ms,
            )
        };
        if n < 0 {
            return Err(sys::last_os_error(NativeOp::Wait));
        }
        let n = n as usize;
        log::trace!("epoll: {} records (batch {})", n, self.events.len());

        for i in 0..n {
            let ev = self.events[i];
            let fd = ev.u64 as RawFd;
            let Some(interest) = self.registered.get(&fd) else {
                continue;
            };
            let ready = from_events(ev.events) & (*interest | Interest::CONDITIONS);
            if !ready.is_empty() {
                self.queue.push(fd, ready);
            }
        }
        Ok(n)
    }
}

impl Multiplexer for Epoll {
    fn backend(&self) -> BackendKind {
        BackendKind::Epoll
    }

    fn insert(&mut self, fd: RawFd, interest: Interest) -> MuxResult<()> {
        mux::check_open(self.is_open())?;
        mux::check_fd(fd)?;
        mux::check_interest(interest)?;
        if self.registered.contains_key(&fd) {
            return Err(MuxError::AlreadyRegistered(fd));
        }

        self.ctl(libc::EPOLL_CTL_ADD, fd, interest)?;
        self.registered.insert(fd, interest);
        log::debug!("epoll: insert fd={} {}", fd, interest);
        Ok(())
    }

    fn erase(&mut self, fd: RawFd) -> MuxResult<()> {
        mux::check_open(self.is_open())?;
        mux::check_fd(fd)?;
        let interest = *self.registered.get(&fd).ok_or(MuxError::NotRegistered(fd))?;

        self.ctl(libc::EPOLL_CTL_DEL, fd, interest)?;
        self.registered.remove(&fd);
        self.queue.erase(fd);
        log::debug!("epoll: erase fd={}", fd);
        Ok(())
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> MuxResult<()> {
        mux::check_open(self.is_open())?;
        mux::check_fd(fd)?;
        mux::check_interest(interest)?;
        if !self.registered.contains_key(&fd) {
            return Err(MuxError::NotRegistered(fd));
        }

        self.ctl(libc::EPOLL_CTL_MOD, fd, interest)?;
        self.registered.insert(fd, interest);
        log::debug!("epoll: modify fd={} {}", fd, interest);
        Ok(())
    }

    fn interest(&self, fd: RawFd) -> Option<Interest> {
        if !self.is_open() {
            return None;
        }
        self.registered.get(&fd).copied()
    }

    fn size(&self) -> usize {
        self.registered.len()
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }

    fn clear(&mut self) {
        if let Ok(epfd) = self.raw_epfd() {
            for &fd in self.registered.keys() {
                // The fd may already be closed; the kernel dropped it then.
                let mut ev = libc::epoll_event { events: 0, u64: 0 };
                unsafe { libc::epoll_ctl(epfd, libc::EPOLL_CTL_DEL, fd, &mut ev) };
            }
        }
        self.registered.clear();
        self.queue.clear();
    }

    fn wait(&mut self, timeout_ms: i32) -> MuxResult<ReadyPair> {
        mux::check_wait(self.is_open(), self.size(), timeout_ms)?;
        if self.queue.is_empty() {
            self.fill(timeout_ms)?;
        }
        Ok(self.queue.pop().unwrap_or(ReadyPair::TIMEOUT))
    }

    fn wait_batch(&mut self, out: &mut Vec<ReadyPair>, timeout_ms: i32) -> MuxResult<usize> {
        mux::check_wait(self.is_open(), self.size(), timeout_ms)?;
        if self.queue.is_empty() {
            let mut n = self.fill(timeout_ms)?;
            while n == self.batch() && self.queue.len() < self.registered.len() {
                let before = self.queue.len();
                n = self.fill(mux::WAIT_NONE)?;
                if self.queue.len() == before {
                    break;
                }
            }
        }
        let start = out.len();
        out.extend(self.queue.drain());
        Ok(out.len() - start)
    }

    fn is_open(&self) -> bool {
        self.epfd.is_some()
    }

    fn close(&mut self) {
        if self.is_open() {
            self.clear();
            self.events = Vec::new();
            // dropping the OwnedFd closes the epoll descriptor
            if let Some(epfd) = self.epfd.take() {
                log::debug!("epoll: closing epfd={}", epfd.as_raw_fd());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_translation() {
        let all = Interest::WATCHABLE;
        assert_eq!(from_events(to_events(all)), all);
        assert_eq!(to_events(Interest::WRITABLE), EPOLLOUT);
        assert_eq!(
            from_events(EPOLLIN | EPOLLERR | EPOLLHUP),
            Interest::READABLE | Interest::ERROR | Interest::HANGUP
        );
    }

    #[test]
    fn test_batch_size() {
        assert_eq!(Epoll::new().unwrap().batch(), 16);
        assert_eq!(Epoll::with_batch(0).unwrap().batch(), 1);
        assert_eq!(Epoll::with_batch(3).unwrap().batch(), 3);
    }

    #[test]
    fn test_kernel_rejection_leaves_state() {
        let mut ep = Epoll::new().unwrap();
        // Far above any fd this process opens.
        let bogus: RawFd = 1 << 20;
        let err = ep.insert(bogus, Interest::READABLE).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
        assert!(!err.is_usage());
        assert_eq!(ep.size(), 0);
        assert_eq!(ep.interest(bogus), None);
        assert_eq!(ep.erase(bogus), Err(MuxError::NotRegistered(bogus)));
    }

    #[test]
    fn test_close_releases_epfd() {
        let mut ep = Epoll::new().unwrap();
        ep.insert(0, Interest::READABLE).ok();
        ep.close();
        assert!(!ep.is_open());
        assert_eq!(ep.raw_epfd(), Err(MuxError::Closed));
        assert_eq!(ep.batch(), 0);
        assert!(ep.is_empty());
        ep.close();
    }
}
