//! `Poll`: dense-array backend over `poll(2)`.
//!
//! Registrations live in a contiguous `pollfd` array with an fd -> index map
//! beside it. Erase swaps the last record into the hole so the array stays
//! dense and every operation except `wait` is O(1).

use std::collections::HashMap;
use std::os::unix::io::RawFd;

use fdmux_core::error::{MuxError, MuxResult, NativeOp};
use fdmux_core::mux::{self, BackendKind, Multiplexer};
use fdmux_core::{Interest, ReadyPair, ReadyQueue};

use crate::sys;

/// Interest -> `pollfd.events`
fn to_events(interest: Interest) -> libc::c_short {
    let mut events = 0;
    if interest.is_readable() {
        events |= libc::POLLIN;
    }
    if interest.is_priority() {
        events |= libc::POLLPRI;
    }
    if interest.is_writable() {
        events |= libc::POLLOUT;
    }
    events
}

/// `pollfd.revents` -> readiness
pub(crate) fn from_revents(revents: libc::c_short) -> Interest {
    let mut ready = Interest::empty();
    if revents & libc::POLLIN != 0 {
        ready |= Interest::READABLE;
    }
    if revents & libc::POLLPRI != 0 {
        ready |= Interest::PRIORITY;
    }
    if revents & libc::POLLOUT != 0 {
        ready |= Interest::WRITABLE;
    }
    if revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
        ready |= Interest::ERROR;
    }
    if revents & libc::POLLHUP != 0 {
        ready |= Interest::HANGUP;
    }
    ready
}

/// Dense-array multiplexer.
pub struct Poll {
    fds: Vec<libc::pollfd>,
    index: HashMap<RawFd, usize>,
    queue: ReadyQueue,
    open: bool,
}

impl Poll {
    pub fn new() -> Self {
        Self {
            fds: Vec::new(),
            index: HashMap::new(),
            queue: ReadyQueue::new(),
            open: true,
        }
    }

    fn slot_of(&self, fd: RawFd) -> MuxResult<usize> {
        self.index.get(&fd).copied().ok_or(MuxError::NotRegistered(fd))
    }

    /// Run `poll` once and queue every ready record.
    fn fill(&mut self, timeout_ms: i32) -> MuxResult<()> {
        let ret = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        if ret < 0 {
            return Err(sys::last_os_error(NativeOp::Wait));
        }
        log::trace!("poll: {} of {} records ready", ret, self.fds.len());

        let mut remaining = ret as usize;
        for rec in self.fds.iter_mut() {
            if remaining == 0 {
                break;
            }
            if rec.revents == 0 {
                continue;
            }
            remaining -= 1;
            let registered = from_revents(rec.events);
            let ready = from_revents(rec.revents) & (registered | Interest::CONDITIONS);
            rec.revents = 0;
            if !ready.is_empty() {
                self.queue.push(rec.fd, ready);
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn records(&self) -> &[libc::pollfd] {
        &self.fds
    }
}

impl Default for Poll {
    fn default() -> Self {
        Self::new()
    }
}

impl Multiplexer for Poll {
    fn backend(&self) -> BackendKind {
        BackendKind::Poll
    }

    fn insert(&mut self, fd: RawFd, interest: Interest) -> MuxResult<()> {
        mux::check_open(self.open)?;
        mux::check_fd(fd)?;
        mux::check_interest(interest)?;
        if self.index.contains_key(&fd) {
            return Err(MuxError::AlreadyRegistered(fd));
        }

        self.index.insert(fd, self.fds.len());
        self.fds.push(libc::pollfd {
            fd,
            events: to_events(interest),
            revents: 0,
        });
        log::debug!("poll: insert fd={} {}", fd, interest);
        Ok(())
    }

    fn erase(&mut self, fd: RawFd) -> MuxResult<()> {
        mux::check_open(self.open)?;
        mux::check_fd(fd)?;
        let slot = self.slot_of(fd)?;

        self.fds.swap_remove(slot);
        self.index.remove(&fd);
        if let Some(moved) = self.fds.get(slot) {
            self.index.insert(moved.fd, slot);
        }
        self.queue.erase(fd);
        log::debug!("poll: erase fd={}", fd);
        Ok(())
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> MuxResult<()> {
        mux::check_open(self.open)?;
        mux::check_fd(fd)?;
        mux::check_interest(interest)?;
        let slot = self.slot_of(fd)?;

        self.fds[slot].events = to_events(interest);
        log::debug!("poll: modify fd={} {}", fd, interest);
        Ok(())
    }

    fn interest(&self, fd: RawFd) -> Option<Interest> {
        if !self.open {
            return None;
        }
        let slot = *self.index.get(&fd)?;
        Some(from_revents(self.fds[slot].events))
    }

    fn size(&self) -> usize {
        self.fds.len()
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }

    fn clear(&mut self) {
        self.fds.clear();
        self.index.clear();
        self.queue.clear();
    }

    fn wait(&mut self, timeout_ms: i32) -> MuxResult<ReadyPair> {
        mux::check_wait(self.open, self.size(), timeout_ms)?;
        if self.queue.is_empty() {
            self.fill(timeout_ms)?;
        }
        Ok(self.queue.pop().unwrap_or(ReadyPair::TIMEOUT))
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        if self.open {
            self.clear();
            self.fds.shrink_to_fit();
            self.open = false;
        }
    }
}
