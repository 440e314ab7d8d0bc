//! Ready-event queue
//!
//! FIFO of `(fd, ready)` pairs with O(1) push, pop and erase-by-fd.
//!
//! Design:
//! - One node per descriptor value, stored in a `Vec` indexed by fd
//! - Nodes form a doubly linked list through `prev`/`next` indices
//! - No per-push allocation; the node array only grows (doubling via `Vec`)
//!
//! A descriptor is queued at most once. Pushing an fd that is already
//! queued merges the new readiness into its node and keeps its position.

use std::os::unix::io::RawFd;

use crate::event::ReadyPair;
use crate::interest::Interest;

/// No-link sentinel
const NIL: usize = usize::MAX;

#[derive(Clone, Copy)]
struct Node {
    prev: usize,
    next: usize,
    ready: Interest,
    queued: bool,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            prev: NIL,
            next: NIL,
            ready: Interest::empty(),
            queued: false,
        }
    }
}

/// Index-linked FIFO of ready descriptors.
pub struct ReadyQueue {
    nodes: Vec<Node>,
    head: usize,
    tail: usize,
    len: usize,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    /// Pre-size the node array for descriptors below `fds`.
    pub fn with_capacity(fds: usize) -> Self {
        let mut q = Self::new();
        q.nodes.resize(fds, Node::default());
        q
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head == NIL
    }

    /// Is `fd` currently queued?
    #[inline]
    pub fn contains(&self, fd: RawFd) -> bool {
        Self::slot(fd)
            .and_then(|i| self.nodes.get(i))
            .map_or(false, |n| n.queued)
    }

    /// Readiness queued for `fd`, if any.
    pub fn ready_of(&self, fd: RawFd) -> Option<Interest> {
        let node = self.nodes.get(Self::slot(fd)?)?;
        node.queued.then_some(node.ready)
    }

    /// Append `fd` at the back, or merge `ready` into its existing node.
    ///
    /// Negative descriptors are ignored.
    pub fn push(&mut self, fd: RawFd, ready: Interest) {
        let Some(idx) = Self::slot(fd) else {
            debug_assert!(false, "negative fd pushed to ReadyQueue");
            return;
        };
        if idx >= self.nodes.len() {
            self.nodes.resize(idx + 1, Node::default());
        }

        let node = &mut self.nodes[idx];
        if node.queued {
            node.ready |= ready;
            return;
        }
        node.ready = ready;
        node.queued = true;
        node.prev = self.tail;
        node.next = NIL;

        if self.tail == NIL {
            self.head = idx;
        } else {
            self.nodes[self.tail].next = idx;
        }
        self.tail = idx;
        self.len += 1;
    }

    /// Remove and return the front pair.
    pub fn pop(&mut self) -> Option<ReadyPair> {
        if self.head == NIL {
            return None;
        }
        let idx = self.head;
        let ready = self.unlink(idx);
        Some(ReadyPair::new(idx as RawFd, ready))
    }

    /// Pop every pending pair in FIFO order.
    pub fn drain(&mut self) -> impl Iterator<Item = ReadyPair> + '_ {
        std::iter::from_fn(move || self.pop())
    }

    /// Drop any pending pair for `fd`, returning its readiness.
    pub fn erase(&mut self, fd: RawFd) -> Option<Interest> {
        let idx = Self::slot(fd)?;
        if !self.nodes.get(idx)?.queued {
            return None;
        }
        Some(self.unlink(idx))
    }

    /// Forget every pending pair and release the node array.
    pub fn clear(&mut self) {
        self.nodes = Vec::new();
        self.head = NIL;
        self.tail = NIL;
        self.len = 0;
    }

    /// Splice `idx` out of the list. Caller guarantees it is queued.
    fn unlink(&mut self, idx: usize) -> Interest {
        let Node { prev, next, ready, .. } = self.nodes[idx];

        if prev == NIL {
            self.head = next;
        } else {
            self.nodes[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.nodes[next].prev = prev;
        }

        self.nodes[idx] = Node::default();
        self.len -= 1;
        ready
    }

    #[inline]
    fn slot(fd: RawFd) -> Option<usize> {
        usize::try_from(fd).ok()
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}
