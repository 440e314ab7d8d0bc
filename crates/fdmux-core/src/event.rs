//! Ready pair returned by `Multiplexer::wait`

use core::fmt;
use std::os::unix::io::RawFd;

use crate::interest::Interest;

/// A descriptor together with the categories it is ready for.
///
/// `ReadyPair::TIMEOUT` (fd = -1, empty mask) means the wait elapsed with
/// nothing ready.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReadyPair {
    pub fd: RawFd,
    pub ready: Interest,
}

impl ReadyPair {
    /// Sentinel: timeout elapsed, nothing became ready.
    pub const TIMEOUT: ReadyPair = ReadyPair {
        fd: -1,
        ready: Interest::empty(),
    };

    #[inline]
    pub const fn new(fd: RawFd, ready: Interest) -> Self {
        Self { fd, ready }
    }

    #[inline]
    pub fn is_timeout(&self) -> bool {
        self.fd < 0
    }

    /// `None` for the timeout sentinel.
    #[inline]
    pub fn into_option(self) -> Option<ReadyPair> {
        if self.is_timeout() {
            None
        } else {
            Some(self)
        }
    }

    /// The `(fd, bits)` tuple form.
    #[inline]
    pub fn as_tuple(&self) -> (RawFd, u32) {
        (self.fd, self.ready.bits())
    }
}

impl From<ReadyPair> for (RawFd, Interest) {
    fn from(pair: ReadyPair) -> Self {
        (pair.fd, pair.ready)
    }
}

impl fmt::Debug for ReadyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_timeout() {
            write!(f, "ReadyPair(timeout)")
        } else {
            write!(f, "ReadyPair(fd={}, {})", self.fd, self.ready)
        }
    }
}
