//! Scenarios every backend must pass identically.
//!
//! Readiness is driven with `UnixStream` pairs: writing to one end makes the
//! other readable, filling a nonblocking end's send buffer makes it
//! unwritable, and dropping one end hangs up the other. Priority readiness
//! needs TCP urgent data, so that scenario uses a loopback connection.

use std::collections::HashSet;
use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use super::*;

const R: Interest = Interest::READABLE;
const W: Interest = Interest::WRITABLE;

fn each_backend(mut f: impl FnMut(Box<dyn Multiplexer>)) {
    for kind in available_backends() {
        let mux = open_kind(kind).unwrap();
        f(mux);
    }
}

fn pair() -> (UnixStream, UnixStream) {
    UnixStream::pair().unwrap()
}

/// Pair whose first end already has data to read.
fn readable_pair() -> (UnixStream, UnixStream) {
    let (a, mut b) = pair();
    b.write_all(b"x").unwrap();
    (a, b)
}

/// Fill `s`'s send buffer until the kernel refuses more.
fn fill_send_buffer(s: &mut UnixStream) {
    s.set_nonblocking(true).unwrap();
    let chunk = [0u8; 4096];
    loop {
        match s.write(&chunk) {
            Ok(_) => continue,
            Err(e) if e.kind() == IoErrorKind::WouldBlock => break,
            Err(e) => panic!("write: {}", e),
        }
    }
}

fn drain_input(s: &mut UnixStream) {
    s.set_nonblocking(true).unwrap();
    let mut buf = [0u8; 256];
    while let Ok(n) = s.read(&mut buf) {
        if n == 0 {
            break;
        }
    }
}

#[test]
fn test_end_to_end_scenario() {
    each_backend(|mut mux| {
        let kind = mux.backend();
        let (d1, mut p1) = pair();
        let (mut d2, _p2) = pair();
        fill_send_buffer(&mut d2);

        mux.insert(d1.as_raw_fd(), R).unwrap();
        mux.insert(d2.as_raw_fd(), W).unwrap();
        assert_eq!(mux.size(), 2, "{}", kind);

        p1.write_all(b"ping").unwrap();
        let got = mux.wait(WAIT_FOREVER).unwrap();
        assert_eq!(got, ReadyPair::new(d1.as_raw_fd(), R), "{}", kind);

        let mut d1 = d1;
        drain_input(&mut d1);
        assert_eq!(mux.wait(WAIT_NONE).unwrap(), ReadyPair::TIMEOUT, "{}", kind);

        mux.erase(d2.as_raw_fd()).unwrap();
        assert_eq!(mux.size(), 1, "{}", kind);

        mux.close();
        assert!(!mux.is_open());
        assert_eq!(mux.insert(d1.as_raw_fd(), R), Err(MuxError::Closed), "{}", kind);
    });
}

#[test]
fn test_registration_is_unique() {
    each_backend(|mut mux| {
        let (a, _b) = pair();
        let fd = a.as_raw_fd();
        mux.insert(fd, R).unwrap();
        assert_eq!(mux.insert(fd, W), Err(MuxError::AlreadyRegistered(fd)));
        assert_eq!(mux.interest(fd), Some(R));
        assert_eq!(mux.size(), 1);

        mux.erase(fd).unwrap();
        assert_eq!(mux.erase(fd), Err(MuxError::NotRegistered(fd)));
        assert_eq!(mux.modify(fd, W), Err(MuxError::NotRegistered(fd)));
        mux.insert(fd, W).unwrap();
        assert_eq!(mux.interest(fd), Some(W));
    });
}

#[test]
fn test_interest_round_trip() {
    each_backend(|mut mux| {
        let (a, _b) = pair();
        let fd = a.as_raw_fd();
        let masks = [R, W, Interest::PRIORITY, R | W, Interest::WATCHABLE];
        mux.insert(fd, masks[0]).unwrap();
        for mask in masks {
            mux.modify(fd, mask).unwrap();
            assert_eq!(mux.interest(fd), Some(mask), "{}", mux.backend());
        }
        assert_eq!(mux.interest(fd + 1000), None);
    });
}

#[test]
fn test_usage_errors() {
    each_backend(|mut mux| {
        assert_eq!(mux.wait(WAIT_NONE), Err(MuxError::NothingToWait));
        assert_eq!(mux.wait(-5), Err(MuxError::InvalidTimeout(-5)));

        let (a, _b) = pair();
        let fd = a.as_raw_fd();
        assert_eq!(mux.insert(-1, R), Err(MuxError::InvalidFd(-1)));
        assert_eq!(mux.insert(fd, Interest::empty()), Err(MuxError::EmptyInterest));
        assert_eq!(
            mux.insert(fd, R | Interest::HANGUP),
            Err(MuxError::UnsupportedInterest(Interest::HANGUP.bits()))
        );
        assert_eq!(mux.erase(-3), Err(MuxError::InvalidFd(-3)));
        assert_eq!(mux.modify(-3, R), Err(MuxError::InvalidFd(-3)));
        assert!(mux.is_empty());

        mux.insert(fd, R).unwrap();
        assert_eq!(mux.modify(fd, Interest::empty()), Err(MuxError::EmptyInterest));
        assert_eq!(mux.interest(fd), Some(R));
        assert_eq!(mux.wait(-2), Err(MuxError::InvalidTimeout(-2)));

        for err in [MuxError::NothingToWait, MuxError::InvalidFd(-1), MuxError::Closed] {
            assert!(err.is_usage());
        }
    });
}

#[test]
fn test_timeout_returns_sentinel() {
    each_backend(|mut mux| {
        let (a, _b) = pair();
        mux.insert(a.as_raw_fd(), R).unwrap();

        let start = Instant::now();
        let got = mux.wait(50).unwrap();
        let elapsed = start.elapsed();
        assert!(got.is_timeout(), "{}", mux.backend());
        assert_eq!(got.as_tuple(), (-1, 0));
        assert!(elapsed >= Duration::from_millis(30), "{}: {:?}", mux.backend(), elapsed);
        assert!(elapsed < Duration::from_secs(5));
    });
}

#[test]
fn test_batch_drains_without_native_call() {
    each_backend(|mut mux| {
        let kind = mux.backend();
        let mut streams: Vec<_> = (0..3).map(|_| readable_pair()).collect();
        let fds: HashSet<RawFd> = streams.iter().map(|(a, _)| a.as_raw_fd()).collect();
        for fd in &fds {
            mux.insert(*fd, R).unwrap();
        }

        let first = mux.wait(WAIT_FOREVER).unwrap();
        assert_eq!(mux.pending(), 2, "{}", kind);

        // Nothing is readable any more; the buffered pairs still come out.
        for (a, _) in streams.iter_mut() {
            drain_input(a);
        }
        let mut seen = HashSet::new();
        seen.insert(first.fd);
        for left in (0..2).rev() {
            let pair = mux.wait(WAIT_NONE).unwrap();
            assert_eq!(pair.ready, R, "{}", kind);
            assert!(seen.insert(pair.fd), "{}: {:?} delivered twice", kind, pair);
            assert_eq!(mux.pending(), left);
        }
        assert_eq!(seen, fds);
        assert_eq!(mux.wait(WAIT_NONE).unwrap(), ReadyPair::TIMEOUT, "{}", kind);
    });
}

#[test]
fn test_erase_drops_buffered_pair() {
    each_backend(|mut mux| {
        let kind = mux.backend();
        let (a1, _b1) = readable_pair();
        let (a2, _b2) = readable_pair();
        mux.insert(a1.as_raw_fd(), R).unwrap();
        mux.insert(a2.as_raw_fd(), R).unwrap();

        let first = mux.wait(WAIT_FOREVER).unwrap();
        assert_eq!(mux.pending(), 1, "{}", kind);
        let other = if first.fd == a1.as_raw_fd() {
            a2.as_raw_fd()
        } else {
            a1.as_raw_fd()
        };

        mux.erase(other).unwrap();
        assert_eq!(mux.pending(), 0, "{}", kind);
        for _ in 0..3 {
            let got = mux.wait(WAIT_NONE).unwrap();
            assert_eq!(got.fd, first.fd, "{}: erased fd delivered", kind);
        }
    });
}

#[test]
fn test_modify_keeps_buffered_pair() {
    each_backend(|mut mux| {
        let kind = mux.backend();
        let (a1, _b1) = readable_pair();
        let (a2, _b2) = readable_pair();
        mux.insert(a1.as_raw_fd(), R).unwrap();
        mux.insert(a2.as_raw_fd(), R).unwrap();

        let first = mux.wait(WAIT_FOREVER).unwrap();
        let queued = if first.fd == a1.as_raw_fd() {
            a2.as_raw_fd()
        } else {
            a1.as_raw_fd()
        };
        mux.modify(queued, W).unwrap();
        assert_eq!(mux.wait(WAIT_NONE).unwrap(), ReadyPair::new(queued, R), "{}", kind);
    });
}

#[test]
fn test_modify_changes_what_is_reported() {
    each_backend(|mut mux| {
        let kind = mux.backend();
        let (a, mut b) = pair();
        let fd = a.as_raw_fd();
        mux.insert(fd, W).unwrap();
        assert_eq!(mux.wait(WAIT_NONE).unwrap(), ReadyPair::new(fd, W), "{}", kind);

        mux.modify(fd, R).unwrap();
        assert_eq!(mux.wait(WAIT_NONE).unwrap(), ReadyPair::TIMEOUT, "{}", kind);

        b.write_all(b"data").unwrap();
        assert_eq!(mux.wait(WAIT_FOREVER).unwrap(), ReadyPair::new(fd, R), "{}", kind);

        mux.modify(fd, R | W).unwrap();
        assert_eq!(mux.wait(WAIT_NONE).unwrap(), ReadyPair::new(fd, R | W), "{}", kind);
    });
}

#[test]
fn test_hangup_is_readable() {
    each_backend(|mut mux| {
        let kind = mux.backend();
        let (a, b) = pair();
        mux.insert(a.as_raw_fd(), R).unwrap();
        drop(b);

        let got = mux.wait(WAIT_FOREVER).unwrap();
        assert_eq!(got.fd, a.as_raw_fd());
        assert!(got.ready.is_readable(), "{}: {:?}", kind, got);
        assert!((R | Interest::CONDITIONS).contains(got.ready), "{}: {:?}", kind, got);
        assert!(!got.ready.is_error(), "{}: {:?}", kind, got);
        // select has no hangup bit; the others report it.
        if kind != BackendKind::Select {
            assert!(got.ready.is_hangup(), "{}: {:?}", kind, got);
        }
    });
}

/// Connected loopback TCP pair: (accepted end, connecting end).
fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (server, _) = listener.accept().unwrap();
    (server, client)
}

fn send_urgent(s: &TcpStream) {
    let byte = [b'!'];
    let ret = unsafe {
        libc::send(s.as_raw_fd(), byte.as_ptr() as *const libc::c_void, 1, libc::MSG_OOB)
    };
    assert_eq!(ret, 1, "send(MSG_OOB): {}", std::io::Error::last_os_error());
}

#[test]
fn test_urgent_data_is_priority() {
    each_backend(|mut mux| {
        let kind = mux.backend();
        let (server, client) = tcp_pair();
        let fd = server.as_raw_fd();
        mux.insert(fd, Interest::PRIORITY).unwrap();
        assert_eq!(mux.wait(WAIT_NONE).unwrap(), ReadyPair::TIMEOUT, "{}", kind);

        send_urgent(&client);
        let got = mux.wait(WAIT_FOREVER).unwrap();
        assert_eq!(got, ReadyPair::new(fd, Interest::PRIORITY), "{}", kind);
        assert!(got.ready.is_priority());
        assert!(!got.ready.is_readable());
    });
}

#[test]
fn test_clear_keeps_open() {
    each_backend(|mut mux| {
        let (a1, _b1) = readable_pair();
        let (a2, _b2) = readable_pair();
        mux.insert(a1.as_raw_fd(), R).unwrap();
        mux.insert(a2.as_raw_fd(), R).unwrap();
        mux.wait(WAIT_FOREVER).unwrap();

        mux.clear();
        assert!(mux.is_open());
        assert_eq!(mux.size(), 0);
        assert_eq!(mux.pending(), 0);
        assert_eq!(mux.interest(a1.as_raw_fd()), None);
        assert_eq!(mux.wait(WAIT_NONE), Err(MuxError::NothingToWait));

        mux.insert(a1.as_raw_fd(), R).unwrap();
        assert_eq!(mux.wait(WAIT_NONE).unwrap().fd, a1.as_raw_fd());
    });
}

#[test]
fn test_closed_rejects_everything() {
    each_backend(|mut mux| {
        let (a, _b) = readable_pair();
        let fd = a.as_raw_fd();
        mux.insert(fd, R).unwrap();
        mux.close();

        assert!(!mux.is_open());
        assert_eq!(mux.size(), 0);
        assert_eq!(mux.interest(fd), None);
        assert_eq!(mux.insert(fd, R), Err(MuxError::Closed));
        assert_eq!(mux.erase(fd), Err(MuxError::Closed));
        assert_eq!(mux.modify(fd, R), Err(MuxError::Closed));
        assert_eq!(mux.wait(WAIT_NONE), Err(MuxError::Closed));
        assert_eq!(mux.wait(-9), Err(MuxError::Closed));
        let mut out = Vec::new();
        assert_eq!(mux.wait_batch(&mut out, WAIT_NONE), Err(MuxError::Closed));

        mux.clear();
        mux.close();
        assert!(!mux.is_open());
    });
}

#[test]
fn test_watched_fd_stays_open() {
    each_backend(|mut mux| {
        let (mut a, mut b) = pair();
        mux.insert(a.as_raw_fd(), R).unwrap();
        mux.close();

        b.write_all(b"still here").unwrap();
        let mut buf = [0u8; 10];
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"still here");
    });
}

#[test]
fn test_wait_batch() {
    each_backend(|mut mux| {
        let kind = mux.backend();
        let mut streams: Vec<_> = (0..4).map(|_| readable_pair()).collect();
        for (a, _) in &streams {
            mux.insert(a.as_raw_fd(), R).unwrap();
        }

        let mut out = Vec::new();
        assert_eq!(mux.wait_batch(&mut out, WAIT_FOREVER).unwrap(), 4, "{}", kind);
        let fds: HashSet<RawFd> = out.iter().map(|p| p.fd).collect();
        assert_eq!(fds.len(), 4);
        assert!(out.iter().all(|p| p.ready == R));
        assert_eq!(mux.pending(), 0);

        for (a, _) in streams.iter_mut() {
            drain_input(a);
        }
        out.clear();
        assert_eq!(mux.wait_batch(&mut out, 10).unwrap(), 0, "{}", kind);
        assert!(out.is_empty());
    });
}

#[test]
fn test_wait_batch_after_single_wait() {
    each_backend(|mut mux| {
        let streams: Vec<_> = (0..3).map(|_| readable_pair()).collect();
        for (a, _) in &streams {
            mux.insert(a.as_raw_fd(), R).unwrap();
        }
        let first = mux.wait(WAIT_FOREVER).unwrap();

        let mut out = vec![first];
        assert_eq!(mux.wait_batch(&mut out, WAIT_NONE).unwrap(), 2);
        let fds: HashSet<RawFd> = out.iter().map(|p| p.fd).collect();
        assert_eq!(fds.len(), 3);
    });
}

#[test]
fn test_select_reaches_high_fds() {
    let mut mux = Select::with_slots(1);
    let streams: Vec<_> = (0..8).map(|_| readable_pair()).collect();
    for (a, _) in &streams {
        mux.insert(a.as_raw_fd(), R).unwrap();
    }
    let mut out = Vec::new();
    assert_eq!(mux.wait_batch(&mut out, WAIT_FOREVER).unwrap(), 8);
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod epoll_batch {
    use super::*;

    #[test]
    fn test_full_buffer_is_drained() {
        let mut mux = Epoll::with_batch(2).unwrap();
        let streams: Vec<_> = (0..5).map(|_| readable_pair()).collect();
        for (a, _) in &streams {
            mux.insert(a.as_raw_fd(), R).unwrap();
        }

        let mut out = Vec::new();
        assert_eq!(mux.wait_batch(&mut out, WAIT_FOREVER).unwrap(), 5);
        let fds: HashSet<RawFd> = out.iter().map(|p| p.fd).collect();
        assert_eq!(fds.len(), 5);
    }

    #[test]
    fn test_single_wait_buffers_one_batch() {
        let mut mux = Epoll::with_batch(2).unwrap();
        let streams: Vec<_> = (0..5).map(|_| readable_pair()).collect();
        for (a, _) in &streams {
            mux.insert(a.as_raw_fd(), R).unwrap();
        }
        mux.wait(WAIT_FOREVER).unwrap();
        assert_eq!(mux.pending(), 1);
    }
}
