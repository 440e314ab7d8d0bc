//! `Select`: bitmask backend over `select(2)`.
//!
//! State:
//! - `slots`: one byte per fd holding its interest bits (0 = unregistered).
//!   Starts at `select_initial_slots` and doubles when an fd does not fit.
//! - three `fd_set`s (read / write / except) kept in sync with `slots`
//! - per-category registration counts, so a set nobody watches is passed
//!   to `select` as NULL
//! - `max_fd`, the highest registered fd, which bounds both the native call
//!   and the result scan
//!
//! `select` rewrites its inputs, so each wait works on copies of the sets.
//! Every ready fd found by one call is pushed onto a `ReadyQueue` and handed
//! out one per `wait`.

use std::mem::MaybeUninit;
use std::os::unix::io::RawFd;
use std::ptr;

use fdmux_core::config::defaults;
use fdmux_core::error::{MuxError, MuxResult, NativeOp};
use fdmux_core::mux::{self, BackendKind, Multiplexer};
use fdmux_core::{Interest, ReadyPair, ReadyQueue};

use crate::sys;

const READ: usize = 0;
const WRITE: usize = 1;
const EXCEPT: usize = 2;

/// Category handled by each fd_set, in set order.
const CATEGORIES: [Interest; 3] = [Interest::READABLE, Interest::WRITABLE, Interest::PRIORITY];

/// Largest fd an `fd_set` can hold, plus one.
#[inline]
fn fd_setsize() -> usize {
    libc::FD_SETSIZE as usize
}

fn empty_fd_set() -> libc::fd_set {
    let mut set = MaybeUninit::<libc::fd_set>::zeroed();
    unsafe {
        libc::FD_ZERO(set.as_mut_ptr());
        set.assume_init()
    }
}

/// Bitmask multiplexer.
pub struct Select {
    slots: Vec<u8>,
    max_fd: RawFd,
    size: usize,
    counts: [usize; 3],
    sets: [libc::fd_set; 3],
    queue: ReadyQueue,
    open: bool,
}

impl Select {
    pub fn new() -> Self {
        Self::with_slots(defaults::SELECT_INITIAL_SLOTS)
    }

    /// Start with room for fds below `slots` before the first growth.
    pub fn with_slots(slots: usize) -> Self {
        Self {
            slots: vec![0; slots.clamp(1, fd_setsize())],
            max_fd: -1,
            size: 0,
            counts: [0; 3],
            sets: [empty_fd_set(); 3],
            queue: ReadyQueue::new(),
            open: true,
        }
    }

    /// Registered bits for `fd` (0 = unregistered).
    #[inline]
    fn slot(&self, fd: RawFd) -> u8 {
        self.slots.get(fd as usize).copied().unwrap_or(0)
    }

    /// Double the slot array until `fd` fits.
    fn grow_to(&mut self, fd: RawFd) {
        let need = fd as usize + 1;
        if need <= self.slots.len() {
            return;
        }
        let mut len = self.slots.len();
        while len < need {
            len <<= 1;
        }
        let len = len.min(fd_setsize());
        log::trace!("select: slots {} -> {}", self.slots.len(), len);
        self.slots.resize(len, 0);
    }

    /// Add (`on`) or remove the categories in `mask` for `fd`.
    fn apply(&mut self, fd: RawFd, mask: Interest, on: bool) {
        for (i, category) in CATEGORIES.iter().enumerate() {
            if !mask.contains(*category) {
                continue;
            }
            let set: *mut libc::fd_set = &mut self.sets[i];
            if on {
                unsafe { libc::FD_SET(fd, set) };
                self.counts[i] += 1;
            } else {
                unsafe { libc::FD_CLR(fd, set) };
                self.counts[i] -= 1;
            }
        }
    }

    /// Reject fds an `fd_set` cannot represent.
    fn check_fd(fd: RawFd) -> MuxResult<()> {
        mux::check_fd(fd)?;
        if fd as usize >= fd_setsize() {
            return Err(MuxError::InvalidFd(fd));
        }
        Ok(())
    }

    /// Run `select` once and queue every ready fd.
    fn fill(&mut self, timeout_ms: i32) -> MuxResult<()> {
        let mut work = self.sets;
        let mut ptrs: [*mut libc::fd_set; 3] = [ptr::null_mut(); 3];
        for (i, set) in work.iter_mut().enumerate() {
            if self.counts[i] > 0 {
                ptrs[i] = set;
            }
        }

        let mut tv = sys::timeval_from_ms(timeout_ms);
        let tv_ptr = tv
            .as_mut()
            .map_or(ptr::null_mut(), |t| t as *mut libc::timeval);

        let ret = unsafe {
            libc::select(self.max_fd + 1, ptrs[READ], ptrs[WRITE], ptrs[EXCEPT], tv_ptr)
        };
        if ret < 0 {
            return Err(sys::last_os_error(NativeOp::Wait));
        }
        log::trace!("select: {} ready bits (max_fd={})", ret, self.max_fd);

        // `ret` counts bits across all three sets, not fds.
        let mut remaining = ret as u32;
        let mut fd: RawFd = 0;
        while remaining > 0 && fd <= self.max_fd {
            if self.slot(fd) != 0 {
                let mut ready = Interest::empty();
                for (i, category) in CATEGORIES.iter().enumerate() {
                    if !ptrs[i].is_null() && unsafe { libc::FD_ISSET(fd, ptrs[i]) } {
                        ready |= *category;
                    }
                }
                if !ready.is_empty() {
                    remaining = remaining.saturating_sub(ready.category_count());
                    self.queue.push(fd, ready);
                }
            }
            fd += 1;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn max_fd(&self) -> RawFd {
        self.max_fd
    }

    #[cfg(test)]
    pub(crate) fn in_native_set(&self, fd: RawFd, category: Interest) -> bool {
        let i = CATEGORIES
            .iter()
            .position(|c| *c == category)
            .expect("single watchable category");
        unsafe { libc::FD_ISSET(fd, &self.sets[i]) }
    }

    #[cfg(test)]
    pub(crate) fn category_counts(&self) -> [usize; 3] {
        self.counts
    }

    #[cfg(test)]
    pub(crate) fn slot_capacity(&self) -> usize {
        self.slots.len()
    }
}

impl Default for Select {
    fn default() -> Self {
        Self::new()
    }
}

impl Multiplexer for Select {
    fn backend(&self) -> BackendKind {
        BackendKind::Select
    }

    fn insert(&mut self, fd: RawFd, interest: Interest) -> MuxResult<()> {
        mux::check_open(self.open)?;
        Self::check_fd(fd)?;
        mux::check_interest(interest)?;
        if self.slot(fd) != 0 {
            return Err(MuxError::AlreadyRegistered(fd));
        }

        self.grow_to(fd);
        self.slots[fd as usize] = interest.bits() as u8;
        self.apply(fd, interest, true);
        self.size += 1;
        if fd > self.max_fd {
            self.max_fd = fd;
        }
        log::debug!("select: insert fd={} {}", fd, interest);
        Ok(())
    }

    fn erase(&mut self, fd: RawFd) -> MuxResult<()> {
        mux::check_open(self.open)?;
        Self::check_fd(fd)?;
        let old = self.slot(fd);
        if old == 0 {
            return Err(MuxError::NotRegistered(fd));
        }

        self.apply(fd, Interest::from_bits_truncate(old as u32), false);
        self.slots[fd as usize] = 0;
        self.size -= 1;
        self.queue.erase(fd);

        if self.size == 0 {
            self.max_fd = -1;
        } else if fd == self.max_fd {
            while self.max_fd > 0 && self.slot(self.max_fd) == 0 {
                self.max_fd -= 1;
            }
        }
        log::debug!("select: erase fd={}", fd);
        Ok(())
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> MuxResult<()> {
        mux::check_open(self.open)?;
        Self::check_fd(fd)?;
        mux::check_interest(interest)?;
        let old = Interest::from_bits_truncate(self.slot(fd) as u32);
        if old.is_empty() {
            return Err(MuxError::NotRegistered(fd));
        }

        self.apply(fd, old - interest, false);
        self.apply(fd, interest - old, true);
        self.slots[fd as usize] = interest.bits() as u8;
        log::debug!("select: modify fd={} {} -> {}", fd, old, interest);
        Ok(())
    }

    fn interest(&self, fd: RawFd) -> Option<Interest> {
        if !self.open || fd < 0 {
            return None;
        }
        match self.slot(fd) {
            0 => None,
            bits => Some(Interest::from_bits_truncate(bits as u32)),
        }
    }

    fn size(&self) -> usize {
        self.size
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }

    fn clear(&mut self) {
        if !self.open {
            return;
        }
        self.slots.iter_mut().for_each(|s| *s = 0);
        self.sets = [empty_fd_set(); 3];
        self.counts = [0; 3];
        self.size = 0;
        self.max_fd = -1;
        self.queue.clear();
    }

    fn wait(&mut self, timeout_ms: i32) -> MuxResult<ReadyPair> {
        mux::check_wait(self.open, self.size, timeout_ms)?;
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
            self.slots = Vec::new();
            self.open = false;
        }
    }
}
