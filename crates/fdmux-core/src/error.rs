//! Error types for fdmux

use std::fmt;
use std::io;
use std::os::unix::io::RawFd;

use crate::mux::BackendKind;

/// Result type for multiplexer operations
pub type MuxResult<T> = Result<T, MuxError>;

/// Short category tag carried by every error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller misuse, detected before any native call
    Usage,
    /// The OS primitive itself failed
    Native,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Usage => "usage",
            ErrorKind::Native => "native",
        }
    }
}

/// Native operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeOp {
    Create,
    Insert,
    Erase,
    Modify,
    Wait,
}

impl NativeOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            NativeOp::Create => "create",
            NativeOp::Insert => "insert",
            NativeOp::Erase => "erase",
            NativeOp::Modify => "modify",
            NativeOp::Wait => "wait",
        }
    }
}

/// Errors returned by `Multiplexer` operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxError {
    /// Operation on a closed multiplexer
    Closed,

    /// Negative descriptor, or one the backend cannot represent
    InvalidFd(RawFd),

    /// Interest mask is empty (use erase to stop watching)
    EmptyInterest,

    /// Interest mask has bits outside READABLE|PRIORITY|WRITABLE
    UnsupportedInterest(u32),

    /// Descriptor is already registered (use modify to change it)
    AlreadyRegistered(RawFd),

    /// Descriptor is not registered
    NotRegistered(RawFd),

    /// Wait called with zero registrations
    NothingToWait,

    /// Timeout below -1
    InvalidTimeout(i32),

    /// Backend not available on this platform
    Unsupported(BackendKind),

    /// Native primitive returned an error
    Os { op: NativeOp, errno: i32 },
}

impl MuxError {
    /// Category tag for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            MuxError::Os { .. } => ErrorKind::Native,
            _ => ErrorKind::Usage,
        }
    }

    #[inline]
    pub fn is_usage(&self) -> bool {
        self.kind() == ErrorKind::Usage
    }

    /// OS error number, for native failures
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            MuxError::Os { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}

impl fmt::Display for MuxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MuxError::Closed => write!(f, "multiplexer is closed"),
            MuxError::InvalidFd(fd) => write!(f, "invalid fd {}", fd),
            MuxError::EmptyInterest => {
                write!(f, "interest is empty; use erase to stop watching an fd")
            }
            MuxError::UnsupportedInterest(bits) => {
                write!(f, "unsupported interest bits {:#x}", bits)
            }
            MuxError::AlreadyRegistered(fd) => {
                write!(f, "fd {} already registered; use modify to change it", fd)
            }
            MuxError::NotRegistered(fd) => write!(f, "fd {} is not registered", fd),
            MuxError::NothingToWait => write!(f, "no fds registered"),
            MuxError::InvalidTimeout(ms) => write!(f, "invalid timeout {}ms", ms),
            MuxError::Unsupported(kind) => {
                write!(f, "{} is not available on this platform", kind)
            }
            MuxError::Os { op, errno } => write!(
                f,
                "{}: {}",
                op.as_str(),
                io::Error::from_raw_os_error(*errno)
            ),
        }
    }
}

impl std::error::Error for MuxError {}

impl From<MuxError> for io::Error {
    fn from(e: MuxError) -> Self {
        match e {
            MuxError::Os { errno, .. } => io::Error::from_raw_os_error(errno),
            MuxError::Unsupported(_) => io::Error::new(io::ErrorKind::Unsupported, e),
            MuxError::NotRegistered(_) => io::Error::new(io::ErrorKind::NotFound, e),
            MuxError::AlreadyRegistered(_) => io::Error::new(io::ErrorKind::AlreadyExists, e),
            _ => io::Error::new(io::ErrorKind::InvalidInput, e),
        }
    }
}
