//! fdmux End-to-End Smoke Test
//!
//! Runs against real socket pairs:
//!   Part A: Factory: configured backend, every available backend opens
//!   Part B: Scenario: readable / timeout / erase / close, per backend
//!   Part C: Buffering: one native call, many ready fds, erase mid-queue
//!   Part D: Permissive adapter: bool results and last_error
//!
//! Run: FDMUX_LOG_LEVEL=debug ./target/release/fdmux-smoke
//! (FDMUX_BACKEND picks the backend used in Part A)

use std::collections::HashSet;
use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::Instant;

use fdmux::{available_backends, open, open_kind, Permissive, Poll};
use fdmux_core::{
    logger, BackendKind, Interest, Multiplexer, MuxConfig, MuxError, ReadyPair, WAIT_FOREVER,
    WAIT_NONE,
};

// ── Test harness ──

struct TestRunner {
    total: usize,
    passed: usize,
    failed: usize,
}

const LINE: &str = "────────────────────────────────────────────────────────────";

impl TestRunner {
    fn new() -> Self {
        Self { total: 0, passed: 0, failed: 0 }
    }

    fn section(&self, name: &str) {
        println!("\n{}", LINE);
        println!("  {}", name);
        println!("{}", LINE);
    }

    fn pass(&mut self, name: &str) {
        self.total += 1;
        self.passed += 1;
        println!("  [{:2}] {:<52} PASS", self.total, name);
    }

    fn fail(&mut self, name: &str, reason: &str) {
        self.total += 1;
        self.failed += 1;
        println!("  [{:2}] {:<52} FAIL: {}", self.total, name, reason);
    }

    fn check(&mut self, name: &str, ok: bool, reason: &str) {
        if ok { self.pass(name); } else { self.fail(name, reason); }
    }

    fn summary(&self) {
        println!("\n{}", LINE);
        println!(
            "  Total: {}  Passed: {}  Failed: {}",
            self.total, self.passed, self.failed
        );
        println!("{}", LINE);
    }
}

/// Socket pair, optionally with data already waiting on the first end.
fn socket_pair(with_data: bool) -> std::io::Result<(UnixStream, UnixStream)> {
    let (a, mut b) = UnixStream::pair()?;
    if with_data {
        b.write_all(b"x")?;
    }
    Ok((a, b))
}

/// Make `s` unwritable by filling its send buffer.
fn fill_send_buffer(s: &mut UnixStream) -> std::io::Result<()> {
    s.set_nonblocking(true)?;
    let chunk = [0u8; 4096];
    loop {
        match s.write(&chunk) {
            Ok(_) => {}
            Err(e) if e.kind() == IoErrorKind::WouldBlock => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

fn drain(s: &mut UnixStream) {
    let _ = s.set_nonblocking(true);
    let mut buf = [0u8; 256];
    while let Ok(n) = s.read(&mut buf) {
        if n == 0 {
            break;
        }
    }
}

// ════════════════════════════════════════════════════════════
// Part A: Factory
// ════════════════════════════════════════════════════════════

fn test_factory(t: &mut TestRunner) {
    t.section("Part A: Factory");

    let config = MuxConfig::from_env();
    println!("       config: {:?}", config);
    match open(&config) {
        Ok(mux) => t.check(
            &format!("open configured backend ({})", config.backend),
            mux.backend() == config.backend && mux.is_open(),
            "wrong backend or closed",
        ),
        Err(e) => t.fail("open configured backend", &e.to_string()),
    }

    let kinds = available_backends();
    println!("       available: {:?}", kinds);
    for kind in BackendKind::ALL {
        let name = format!("open_kind({})", kind);
        match open_kind(kind) {
            Ok(mux) => t.check(&name, kinds.contains(&kind) && mux.is_empty(), "unexpected"),
            Err(MuxError::Unsupported(k)) if !kinds.contains(&k) => {
                t.pass(&format!("{} unsupported here", name))
            }
            Err(e) => t.fail(&name, &e.to_string()),
        }
    }
}

// ════════════════════════════════════════════════════════════
// Part B: Scenario
// ════════════════════════════════════════════════════════════

fn test_scenario(t: &mut TestRunner, mut mux: Box<dyn Multiplexer>) -> std::io::Result<()> {
    let kind = mux.backend();
    let (mut d1, mut p1) = socket_pair(false)?;
    let (mut d2, _p2) = socket_pair(false)?;
    fill_send_buffer(&mut d2)?;
    let (fd1, fd2) = (d1.as_raw_fd(), d2.as_raw_fd());

    let ok = mux.insert(fd1, Interest::READABLE).is_ok()
        && mux.insert(fd2, Interest::WRITABLE).is_ok();
    t.check(&format!("{}: insert d1=r d2=w", kind), ok && mux.size() == 2, "insert failed");

    p1.write_all(b"ping")?;
    let got = mux.wait(WAIT_FOREVER);
    t.check(
        &format!("{}: wait(-1) -> (d1, r)", kind),
        got == Ok(ReadyPair::new(fd1, Interest::READABLE)),
        &format!("{:?}", got),
    );

    drain(&mut d1);
    let got = mux.wait(WAIT_NONE);
    t.check(
        &format!("{}: wait(0) -> timeout", kind),
        got == Ok(ReadyPair::TIMEOUT),
        &format!("{:?}", got),
    );

    let start = Instant::now();
    let got = mux.wait(20);
    let waited = start.elapsed().as_millis();
    t.check(
        &format!("{}: wait(20) blocks then times out", kind),
        got == Ok(ReadyPair::TIMEOUT) && waited >= 10,
        &format!("{:?} after {}ms", got, waited),
    );

    let erased = mux.erase(fd2);
    t.check(
        &format!("{}: erase d2 -> size 1", kind),
        erased.is_ok() && mux.size() == 1,
        &format!("{:?} size={}", erased, mux.size()),
    );

    let dup = mux.insert(fd1, Interest::WRITABLE);
    t.check(
        &format!("{}: duplicate insert rejected", kind),
        dup == Err(MuxError::AlreadyRegistered(fd1)),
        &format!("{:?}", dup),
    );

    mux.close();
    let after = mux.insert(fd1, Interest::READABLE);
    t.check(
        &format!("{}: insert after close -> usage error", kind),
        matches!(after, Err(ref e) if e.is_usage()),
        &format!("{:?}", after),
    );
    Ok(())
}

// ════════════════════════════════════════════════════════════
// Part C: Buffering
// ════════════════════════════════════════════════════════════

fn test_buffering(t: &mut TestRunner, mut mux: Box<dyn Multiplexer>) -> std::io::Result<()> {
    let kind = mux.backend();
    let mut streams = Vec::new();
    for _ in 0..4 {
        streams.push(socket_pair(true)?);
    }
    let fds: Vec<RawFd> = streams.iter().map(|(a, _)| a.as_raw_fd()).collect();
    for &fd in &fds {
        if let Err(e) = mux.insert(fd, Interest::READABLE) {
            t.fail(&format!("{}: insert", kind), &e.to_string());
            return Ok(());
        }
    }

    let first = mux.wait(WAIT_FOREVER);
    t.check(
        &format!("{}: one native call buffers 3 more", kind),
        first.is_ok() && mux.pending() == 3,
        &format!("{:?} pending={}", first, mux.pending()),
    );

    // Erase one buffered fd; it must never come out.
    let first_fd = first.map(|p| p.fd).unwrap_or(-1);
    let victim = fds.iter().copied().find(|&fd| fd != first_fd).unwrap_or(-1);
    let erased = mux.erase(victim);
    t.check(
        &format!("{}: erase a buffered fd", kind),
        erased.is_ok() && mux.pending() == 2,
        &format!("{:?} pending={}", erased, mux.pending()),
    );
    for (a, _) in streams.iter_mut() {
        drain(a);
    }

    let mut out = Vec::new();
    let n = mux.wait_batch(&mut out, WAIT_NONE);
    let delivered: HashSet<RawFd> = out.iter().map(|p| p.fd).collect();
    t.check(
        &format!("{}: batch drains the rest, erased fd absent", kind),
        n == Ok(2) && !delivered.contains(&victim) && !delivered.contains(&first_fd),
        &format!("{:?} {:?}", n, out),
    );

    let got = mux.wait(WAIT_NONE);
    t.check(
        &format!("{}: queue empty -> timeout", kind),
        got == Ok(ReadyPair::TIMEOUT),
        &format!("{:?}", got),
    );
    Ok(())
}

// ════════════════════════════════════════════════════════════
// Part D: Permissive adapter
// ════════════════════════════════════════════════════════════

fn test_permissive(t: &mut TestRunner) -> std::io::Result<()> {
    t.section("Part D: Permissive adapter");

    let (a, _b) = socket_pair(false)?;
    let fd = a.as_raw_fd();
    let mut mux = Permissive::new(Poll::new());

    t.check("insert -> true", mux.insert(fd, Interest::READABLE), "false");
    t.check("duplicate insert -> false", !mux.insert(fd, Interest::READABLE), "true");
    t.check(
        "last_error is AlreadyRegistered",
        mux.last_error() == Some(&MuxError::AlreadyRegistered(fd)),
        &format!("{:?}", mux.last_error()),
    );
    t.check(
        "state unchanged after failure",
        mux.interest(fd) == Some(Interest::READABLE) && mux.size() == 1,
        &format!("{:?}", mux.interest(fd)),
    );
    t.check("wait(0) -> Some(timeout)", mux.wait(WAIT_NONE) == Some(ReadyPair::TIMEOUT), "");
    mux.close();
    t.check("wait after close -> None", mux.wait(WAIT_NONE).is_none(), "");
    Ok(())
}

fn main() {
    logger::init();
    println!("=== fdmux End-to-End Smoke Test ===");

    let mut t = TestRunner::new();

    test_factory(&mut t);

    t.section("Part B: Scenario");
    for kind in available_backends() {
        let result = open_kind(kind)
            .map_err(std::io::Error::from)
            .and_then(|mux| test_scenario(&mut t, mux));
        if let Err(e) = result {
            t.fail(&format!("{}: scenario", kind), &e.to_string());
        }
    }

    t.section("Part C: Buffering");
    for kind in available_backends() {
        let result = open_kind(kind)
            .map_err(std::io::Error::from)
            .and_then(|mux| test_buffering(&mut t, mux));
        if let Err(e) = result {
            t.fail(&format!("{}: buffering", kind), &e.to_string());
        }
    }

    if let Err(e) = test_permissive(&mut t) {
        t.fail("permissive", &e.to_string());
    }

    log::info!("smoke test done: {}/{} passed", t.passed, t.total);
    t.summary();
    std::process::exit(if t.failed > 0 { 1 } else { 0 });
}
