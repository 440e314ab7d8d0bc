//! Interest and readiness masks
//!
//! The same bit set is used both for what a caller registers (interest) and
//! for what a wait reports (readiness). Only the three `WATCHABLE` categories
//! may be registered; `ERROR` and `HANGUP` are conditions a backend may add
//! to a ready mask when the native primitive reports them.

use core::fmt;

bitflags::bitflags! {
    /// Readiness categories for a descriptor.
    ///
    /// The numeric values match the Linux `POLL*`/`EPOLL*` bits, but every
    /// backend translates explicitly rather than relying on that.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Interest: u32 {
        /// Data can be read without blocking.
        const READABLE = 0x01;
        /// Priority / out-of-band data, or an exceptional condition.
        const PRIORITY = 0x02;
        /// Data can be written without blocking.
        const WRITABLE = 0x04;
        /// Error condition (ready masks only).
        const ERROR = 0x08;
        /// Peer hung up (ready masks only).
        const HANGUP = 0x10;
    }
}

impl Interest {
    /// Categories a caller may register.
    pub const WATCHABLE: Interest = Interest::READABLE
        .union(Interest::PRIORITY)
        .union(Interest::WRITABLE);

    /// Conditions only ever reported, never registered.
    pub const CONDITIONS: Interest = Interest::ERROR.union(Interest::HANGUP);

    /// Number of watchable categories set in this mask.
    #[inline]
    pub fn category_count(self) -> u32 {
        (self & Self::WATCHABLE).bits().count_ones()
    }

    #[inline]
    pub fn is_readable(self) -> bool {
        self.contains(Self::READABLE)
    }

    #[inline]
    pub fn is_writable(self) -> bool {
        self.contains(Self::WRITABLE)
    }

    #[inline]
    pub fn is_priority(self) -> bool {
        self.contains(Self::PRIORITY)
    }

    #[inline]
    pub fn is_error(self) -> bool {
        self.contains(Self::ERROR)
    }

    #[inline]
    pub fn is_hangup(self) -> bool {
        self.contains(Self::HANGUP)
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "(empty)");
        }
        bitflags::parser::to_writer(self, f)
    }
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = "";
        for (tag, flag) in [
            ("r", Self::READABLE),
            ("p", Self::PRIORITY),
            ("w", Self::WRITABLE),
            ("e", Self::ERROR),
            ("h", Self::HANGUP),
        ] {
            if self.contains(flag) {
                write!(f, "{}{}", sep, tag)?;
                sep = "|";
            }
        }
        if sep.is_empty() {
            write!(f, "-")?;
        }
        Ok(())
    }
}
