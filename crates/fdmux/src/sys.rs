//! Small helpers around the raw libc calls shared by the backends.

use fdmux_core::error::{MuxError, NativeOp};
use nix::errno::Errno;

/// Build a native failure from the current `errno`.
///
/// Must be called right after the failing libc call.
#[inline]
pub(crate) fn last_os_error(op: NativeOp) -> MuxError {
    let errno = Errno::last();
    log::debug!("{} failed: {}", op.as_str(), errno);
    MuxError::Os {
        op,
        errno: errno as i32,
    }
}

/// Convert a millisecond timeout to a `timeval`. `None` for -1 (forever).
#[inline]
pub(crate) fn timeval_from_ms(timeout_ms: i32) -> Option<libc::timeval> {
    if timeout_ms < 0 {
        return None;
    }
    Some(libc::timeval {
        tv_sec: (timeout_ms / 1000) as libc::time_t,
        tv_usec: ((timeout_ms % 1000) * 1000) as libc::suseconds_t,
    })
}
