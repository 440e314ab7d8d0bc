//! Boolean-result adapter.
//!
//! Some callers prefer `false`/`None` over a `Result` for every call. Wrapping
//! a backend in `Permissive` gives that API without changing backend
//! behavior: a failed call leaves the backend untouched and the error is kept
//! for `last_error()`.

use std::os::unix::io::RawFd;

use fdmux_core::{BackendKind, Interest, Multiplexer, MuxError, MuxResult, ReadyPair};

pub struct Permissive<M: Multiplexer> {
    inner: M,
    last_error: Option<MuxError>,
}

impl<M: Multiplexer> Permissive<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            last_error: None,
        }
    }

    /// Error from the most recent failed call, cleared by the next success.
    pub fn last_error(&self) -> Option<&MuxError> {
        self.last_error.as_ref()
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn into_inner(self) -> M {
        self.inner
    }

    fn record<T>(&mut self, result: MuxResult<T>) -> Option<T> {
        match result {
            Ok(v) => {
                self.last_error = None;
                Some(v)
            }
            Err(e) => {
                log::debug!("{}: {} rejected ({})", self.inner.backend(), e, e.kind().as_str());
                self.last_error = Some(e);
                None
            }
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.inner.backend()
    }

    pub fn insert(&mut self, fd: RawFd, interest: Interest) -> bool {
        let r = self.inner.insert(fd, interest);
        self.record(r).is_some()
    }

    pub fn erase(&mut self, fd: RawFd) -> bool {
        let r = self.inner.erase(fd);
        self.record(r).is_some()
    }

    pub fn modify(&mut self, fd: RawFd, interest: Interest) -> bool {
        let r = self.inner.modify(fd, interest);
        self.record(r).is_some()
    }

    pub fn interest(&self, fd: RawFd) -> Option<Interest> {
        self.inner.interest(fd)
    }

    pub fn size(&self) -> usize {
        self.inner.size()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// `None` on failure; `Some(ReadyPair::TIMEOUT)` when nothing became ready.
    pub fn wait(&mut self, timeout_ms: i32) -> Option<ReadyPair> {
        let r = self.inner.wait(timeout_ms);
        self.record(r)
    }

    /// Number of pairs appended, or `None` on failure.
    pub fn wait_batch(&mut self, out: &mut Vec<ReadyPair>, timeout_ms: i32) -> Option<usize> {
        let r = self.inner.wait_batch(out, timeout_ms);
        self.record(r)
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    pub fn close(&mut self) {
        self.inner.close();
    }
}
