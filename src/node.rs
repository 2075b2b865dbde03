//! Intrusive skip list node.
//!
//! A [`Node`] is embedded in the caller's payload (a task, a request, ...)
//! and linked into a [`RawSkipList`](crate::raw::RawSkipList) without any
//! allocation. Every node carries the full 16-wide `next` / `prev` arrays
//! regardless of its level, so reaching any level slot is a single index.
//!
//! All fields sit behind [`Cell`] because the list rewires neighbouring
//! nodes while the caller may still hold shared references to them. This
//! also makes `Node` neither `Send` nor `Sync`; serialising access is the
//! caller's job.

use std::cell::Cell;
use std::fmt;
use std::ptr;

use crate::level::MAX_LEVELS;
use crate::level::SENTINEL_KEY;
use crate::links;
use crate::links::Links;

/// A skip list node. See the [module docs](self).
pub struct Node {
    level: Cell<u8>,
    key: Cell<u64>,
    next: [Cell<*const Node>; MAX_LEVELS],
    prev: [Cell<*const Node>; MAX_LEVELS],
}

impl Node {
    /// Create an unwired node. It must be [`init`](Node::init)ed at its final
    /// address before it can be linked.
    pub const fn new() -> Node {
        return Node {
            level: Cell::new(0),
            key: Cell::new(SENTINEL_KEY),
            next: [const { Cell::new(ptr::null()) }; MAX_LEVELS],
            prev: [const { Cell::new(ptr::null()) }; MAX_LEVELS],
        };
    }

    /// Put the node into the detached state: level 0, sentinel key, and every
    /// `next` / `prev` slot pointing back at the node itself.
    ///
    /// Moving the node afterwards leaves it pointing at its old address, so
    /// call this where the node will live.
    pub fn init(&self) {
        links::detach(&mut NodeLinks, self as *const Node);
    }

    /// True if the node self-loops on every level.
    pub fn is_detached(&self) -> bool {
        let me = self as *const Node;
        return self
            .next
            .iter()
            .zip(self.prev.iter())
            .all(|(next, prev)| next.get() == me && prev.get() == me);
    }

    /// True if [`init`](Node::init) has been called since construction.
    pub fn is_wired(&self) -> bool {
        return !self.next[0].get().is_null();
    }

    pub fn key(&self) -> u64 {
        return self.key.get();
    }

    /// Set the ordering key. Only valid while the node is detached.
    pub fn set_key(&self, key: u64) {
        debug_assert!(
            !self.is_wired() || self.is_detached(),
            "changing the key of a linked node breaks ordering"
        );
        self.key.set(key);
    }

    /// Highest level this node is linked on.
    pub fn level(&self) -> u8 {
        return self.level.get();
    }

    /// Forward neighbour on `level`. Null until the node is initialised.
    pub fn next(&self, level: usize) -> *const Node {
        return self.next[level].get();
    }

    /// Backward neighbour on `level`. Null until the node is initialised.
    pub fn prev(&self, level: usize) -> *const Node {
        return self.prev[level].get();
    }
}

impl Default for Node {
    fn default() -> Self {
        return Self::new();
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f
            .debug_struct("Node")
            .field("key", &self.key())
            .field("level", &self.level())
            .field("detached", &self.is_detached())
            .finish();
    }
}

/// [`Links`] over raw node pointers.
///
/// Every pointer handed to these methods must point at a live, initialised
/// [`Node`]. `Node::init` only passes itself; `RawSkipList` only passes its
/// sentinel and nodes whose validity its callers promised when linking them.
pub(crate) struct NodeLinks;

impl Links for NodeLinks {
    type Ref = *const Node;

    fn key(&self, node: *const Node) -> u64 {
        // SAFETY: see the type docs; nodes are live while we touch them.
        return unsafe { (*node).key.get() };
    }

    fn set_key(&mut self, node: *const Node, key: u64) {
        // SAFETY: see the type docs.
        unsafe { (*node).key.set(key) };
    }

    fn level(&self, node: *const Node) -> u8 {
        // SAFETY: see the type docs.
        return unsafe { (*node).level.get() };
    }

    fn set_level(&mut self, node: *const Node, level: u8) {
        // SAFETY: see the type docs.
        unsafe { (*node).level.set(level) };
    }

    fn next(&self, node: *const Node, level: usize) -> *const Node {
        // SAFETY: see the type docs.
        return unsafe { (*node).next[level].get() };
    }

    fn set_next(&mut self, node: *const Node, level: usize, to: *const Node) {
        // SAFETY: see the type docs.
        unsafe { (*node).next[level].set(to) };
    }

    fn prev(&self, node: *const Node, level: usize) -> *const Node {
        // SAFETY: see the type docs.
        return unsafe { (*node).prev[level].get() };
    }

    fn set_prev(&mut self, node: *const Node, level: usize, to: *const Node) {
        // SAFETY: see the type docs.
        unsafe { (*node).prev[level].set(to) };
    }
}
