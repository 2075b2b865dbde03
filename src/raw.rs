//! Intrusive skip list.
//!
//! [`RawSkipList`] is the run-queue flavour: the caller embeds a [`Node`] in
//! each payload and the list only rewires pointers, so no operation ever
//! allocates. The list's sentinel is embedded in the list itself and doubles
//! as head and tail; the current list level is stored on the sentinel.
//!
//! # Operations
//!
//! - `insert(node, seed)`: O(log n) expected - descend and splice
//! - `delete(node)`: O(level) - no search, the node is the handle
//! - `front()`: O(1) - the pick-next
//! - `pop_front()`: O(level)
//!
//! The list is not synchronised. Serialise every call behind the caller's
//! own lock.
//!
//! # Example
//!
//! ```
//! use std::pin::pin;
//! use sched_skiplist::{Node, RawSkipList, skiplist_entry};
//!
//! struct Task {
//!     pid: u32,
//!     node: Node,
//! }
//!
//! let tasks = [Task { pid: 1, node: Node::new() }, Task { pid: 2, node: Node::new() }];
//! let mut queue = pin!(RawSkipList::new());
//! queue.as_mut().init();
//!
//! for (task, deadline) in tasks.iter().zip([20, 10]) {
//!     task.node.init();
//!     task.node.set_key(deadline);
//!     // SAFETY: `tasks` outlives `queue` and never moves.
//!     unsafe { queue.as_mut().insert(&task.node, deadline) };
//! }
//!
//! let next = queue.as_mut().pop_front().unwrap();
//! let task = unsafe { &*skiplist_entry!(next.as_ptr(), Task, node) };
//! assert_eq!(task.pid, 2);
//! ```

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::marker::PhantomPinned;
use std::pin::Pin;
use std::ptr::NonNull;

use crate::level::MAX_LEVEL;
use crate::level::pick_level;
use crate::links;
use crate::links::Links;
use crate::node::Node;
use crate::node::NodeLinks;

/// Recover the payload that embeds a [`Node`].
///
/// `skiplist_entry!(ptr, Type, field)` takes a `*const Node` (or `&Node`)
/// pointing at `Type::field` and yields a `*const Type`. Dereferencing the
/// result is only sound if the node really lives inside a `Type`.
#[macro_export]
macro_rules! skiplist_entry {
    ($ptr:expr, $type:ty, $field:ident) => {{
        let node: *const $crate::Node = $ptr;
        node.wrapping_byte_sub(::core::mem::offset_of!($type, $field))
            .cast::<$type>()
    }};
}

/// An intrusive skip list. See the [module docs](self).
///
/// The list is self-referential once initialised, so it is only usable
/// behind a [`Pin`].
pub struct RawSkipList {
    head: Node,
    entries: Cell<u64>,
    _pin: PhantomPinned,
}

impl RawSkipList {
    /// Create an uninitialised list. Pin it, then call
    /// [`init`](RawSkipList::init).
    pub const fn new() -> RawSkipList {
        return RawSkipList {
            head: Node::new(),
            entries: Cell::new(0),
            _pin: PhantomPinned,
        };
    }

    /// Wire the sentinel into self-loops on every level and reset the
    /// counters. Any nodes still linked are forgotten, not detached.
    pub fn init(self: Pin<&mut Self>) {
        let this = self.into_ref().get_ref();
        this.head.init();
        this.entries.set(0);
    }

    fn sentinel(&self) -> *const Node {
        return &self.head as *const Node;
    }

    fn first(&self) -> *const Node {
        return self.head.next(0);
    }

    pub fn is_empty(&self) -> bool {
        let first = self.first();
        return first.is_null() || first == self.sentinel();
    }

    /// Number of linked nodes, not counting the sentinel.
    pub fn len(&self) -> u64 {
        return self.entries.get();
    }

    /// Highest level any linked node occupies, 0 when empty.
    pub fn level(&self) -> u8 {
        return self.head.level();
    }

    /// The node with the smallest key; among equal keys, the oldest.
    pub fn front(&self) -> Option<&Node> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: linked nodes stay valid until deleted, which needs `&mut`.
        return Some(unsafe { &*self.first() });
    }

    /// Nodes in key order.
    pub fn iter(&self) -> Iter<'_> {
        return Iter {
            head: self.sentinel(),
            current: self.first(),
            _list: PhantomData,
        };
    }

    /// Link `node` at a level picked from `seed` and the entry count.
    ///
    /// # Safety
    ///
    /// - The list has been initialised.
    /// - `node` is detached (initialised and not linked anywhere) and is not
    ///   this list's sentinel.
    /// - `node` stays alive and does not move until it is deleted from this
    ///   list.
    pub unsafe fn insert(self: Pin<&mut Self>, node: &Node, seed: u64) -> NonNull<Node> {
        let wanted = pick_level(self.entries.get() + 1, seed);
        // SAFETY: forwarded from the caller.
        return unsafe { self.insert_at_level(node, wanted) };
    }

    /// Link `node` at a caller-chosen level, still clamped to one above the
    /// current list level.
    ///
    /// # Safety
    ///
    /// Same as [`insert`](RawSkipList::insert).
    pub unsafe fn insert_at_level(
        self: Pin<&mut Self>,
        node: &Node,
        level: u8,
    ) -> NonNull<Node> {
        assert!(level <= MAX_LEVEL, "level {} out of range", level);
        let this = self.into_ref().get_ref();
        debug_assert!(this.head.is_wired(), "list is not initialised");

        let mut list_level = this.level();
        links::insert(
            &mut NodeLinks,
            this.sentinel(),
            &mut list_level,
            node as *const Node,
            level,
        );
        NodeLinks.set_level(this.sentinel(), list_level);
        this.entries.set(this.entries.get() + 1);
        this.debug_check();

        return NonNull::from(node);
    }

    /// Unlink `node` and return it to the detached state. The node's memory
    /// is untouched otherwise and it may be inserted again.
    ///
    /// # Safety
    ///
    /// `node` is currently linked in this list.
    pub unsafe fn delete(self: Pin<&mut Self>, node: &Node) {
        let this = self.into_ref().get_ref();
        this.unlink(node as *const Node);
    }

    /// Unlink and return the front node.
    pub fn pop_front(self: Pin<&mut Self>) -> Option<NonNull<Node>> {
        let this = self.into_ref().get_ref();
        if this.is_empty() {
            return None;
        }
        let first = this.first();
        this.unlink(first);
        // SAFETY: `first` came from a non-empty ring, so it is a real node.
        return Some(unsafe { NonNull::new_unchecked(first as *mut Node) });
    }

    fn unlink(&self, node: *const Node) {
        debug_assert!(self.entries.get() > 0, "delete from an empty list");
        let mut list_level = self.level();
        links::delete(&mut NodeLinks, self.sentinel(), &mut list_level, node);
        NodeLinks.set_level(self.sentinel(), list_level);
        self.entries.set(self.entries.get() - 1);
        self.debug_check();
    }

    /// Walk the whole list and panic if any structural invariant is broken.
    /// O(n); debug builds run it after every insert and delete.
    pub fn check_invariants(&self) {
        assert!(self.head.is_wired(), "list is not initialised");
        links::check(&NodeLinks, self.sentinel(), self.level(), self.entries.get());
    }

    #[cfg(debug_assertions)]
    fn debug_check(&self) {
        self.check_invariants();
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    fn debug_check(&self) {}
}

impl Default for RawSkipList {
    fn default() -> Self {
        return Self::new();
    }
}

impl fmt::Debug for RawSkipList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f
            .debug_struct("RawSkipList")
            .field("level", &self.level())
            .field("entries", &self.len())
            .field("keys", &self.iter().map(Node::key).collect::<Vec<_>>())
            .finish();
    }
}

/// Iterator over the nodes of a [`RawSkipList`] in key order.
pub struct Iter<'a> {
    head: *const Node,
    current: *const Node,
    _list: PhantomData<&'a RawSkipList>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_null() || self.current == self.head {
            return None;
        }
        // SAFETY: the list is borrowed for 'a, so nothing can be deleted and
        // every linked node is still alive.
        let node = unsafe { &*self.current };
        self.current = node.next(0);
        return Some(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::MAX_LEVELS;
    use std::pin::pin;

    struct Task {
        pid: u32,
        node: Node,
    }

    fn tasks(n: u32) -> Vec<Task> {
        let tasks: Vec<Task> = (0..n).map(|pid| Task { pid, node: Node::new() }).collect();
        for task in &tasks {
            task.node.init();
        }
        return tasks;
    }

    fn keys(list: &RawSkipList) -> Vec<u64> {
        return list.iter().map(Node::key).collect();
    }

    fn ring(list: &RawSkipList, level: usize) -> Vec<u64> {
        let head = list.sentinel();
        let mut keys = Vec::new();
        let mut p = list.head.next(level);
        while p != head {
            let node = unsafe { &*p };
            keys.push(node.key());
            p = node.next(level);
        }
        return keys;
    }

    #[test]
    fn uninitialised_list_is_empty() {
        let list = RawSkipList::new();
        assert!(list.is_empty());
        assert!(list.front().is_none());
        assert_eq!(list.iter().count(), 0);
    }

    #[test]
    fn empty_after_init() {
        let mut list = pin!(RawSkipList::new());
        list.as_mut().init();
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
        assert_eq!(list.level(), 0);
        assert!(list.as_mut().pop_front().is_none());
        list.check_invariants();
    }

    #[test]
    fn insert_orders_by_key() {
        let tasks = tasks(5);
        let mut list = pin!(RawSkipList::new());
        list.as_mut().init();
        for (task, key) in tasks.iter().zip([40, 10, 30, 50, 20]) {
            task.node.set_key(key);
            unsafe { list.as_mut().insert(&task.node, key) };
        }
        assert_eq!(keys(&list), vec![10, 20, 30, 40, 50]);
        assert_eq!(list.len(), 5);
        assert_eq!(list.front().map(Node::key), Some(10));
    }

    #[test]
    fn forced_levels_build_rings() {
        let tasks = tasks(3);
        let mut list = pin!(RawSkipList::new());
        list.as_mut().init();
        for (task, (key, level)) in tasks.iter().zip([(10, 0), (20, 1), (30, 0)]) {
            task.node.set_key(key);
            unsafe { list.as_mut().insert_at_level(&task.node, level) };
        }
        assert_eq!(list.level(), 1);
        assert_eq!(ring(&list, 0), vec![10, 20, 30]);
        assert_eq!(ring(&list, 1), vec![20]);
        for k in 2..MAX_LEVELS {
            assert!(ring(&list, k).is_empty());
        }
    }

    #[test]
    fn delete_detaches_and_allows_reinsert() {
        let tasks = tasks(3);
        let mut list = pin!(RawSkipList::new());
        list.as_mut().init();
        for (task, key) in tasks.iter().zip([1, 2, 3]) {
            task.node.set_key(key);
            unsafe { list.as_mut().insert(&task.node, 0) };
        }

        unsafe { list.as_mut().delete(&tasks[1].node) };
        assert!(tasks[1].node.is_detached());
        assert_eq!(tasks[1].node.key(), u64::MAX);
        assert_eq!(keys(&list), vec![1, 3]);

        tasks[1].node.set_key(0);
        unsafe { list.as_mut().insert(&tasks[1].node, 0) };
        assert_eq!(keys(&list), vec![0, 1, 3]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "node is already linked")]
    fn double_insert_panics() {
        let tasks = tasks(1);
        let mut list = pin!(RawSkipList::new());
        list.as_mut().init();
        tasks[0].node.set_key(4);
        unsafe { list.as_mut().insert(&tasks[0].node, 0) };
        unsafe { list.as_mut().insert(&tasks[0].node, 0) };
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "node is not linked")]
    fn delete_of_detached_node_panics() {
        let tasks = tasks(2);
        let mut list = pin!(RawSkipList::new());
        list.as_mut().init();
        tasks[0].node.set_key(4);
        unsafe { list.as_mut().insert(&tasks[0].node, 0) };
        unsafe { list.as_mut().delete(&tasks[1].node) };
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "cannot delete the sentinel")]
    fn delete_of_sentinel_panics() {
        let tasks = tasks(1);
        let mut list = pin!(RawSkipList::new());
        list.as_mut().init();
        tasks[0].node.set_key(4);
        unsafe { list.as_mut().insert(&tasks[0].node, 0) };
        let head = list.sentinel();
        unsafe { list.as_mut().delete(&*head) };
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "cannot insert the sentinel")]
    fn insert_of_sentinel_panics() {
        let mut list = pin!(RawSkipList::new());
        list.as_mut().init();
        let head = list.sentinel();
        unsafe { list.as_mut().insert_at_level(&*head, 0) };
    }

    #[test]
    fn pop_front_drains_in_order() {
        let tasks = tasks(4);
        let mut list = pin!(RawSkipList::new());
        list.as_mut().init();
        for (task, key) in tasks.iter().zip([7, 3, 9, 3]) {
            task.node.set_key(key);
            unsafe { list.as_mut().insert(&task.node, key) };
        }

        let mut pids = Vec::new();
        while let Some(node) = list.as_mut().pop_front() {
            let task = unsafe { &*skiplist_entry!(node.as_ptr(), Task, node) };
            assert!(task.node.is_detached());
            pids.push(task.pid);
        }
        assert_eq!(pids, vec![1, 3, 0, 2]);
        assert_eq!(list.level(), 0);
        assert!(list.is_empty());
    }

    #[test]
    fn entry_macro_finds_payload() {
        let tasks = tasks(2);
        let task = unsafe { &*skiplist_entry!(&tasks[1].node, Task, node) };
        assert_eq!(task.pid, 1);
    }

    #[test]
    fn reinit_forgets_nodes() {
        let tasks = tasks(1);
        let mut list = pin!(RawSkipList::new());
        list.as_mut().init();
        tasks[0].node.set_key(5);
        unsafe { list.as_mut().insert(&tasks[0].node, 0) };
        list.as_mut().init();
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn debug_lists_keys() {
        let tasks = tasks(2);
        let mut list = pin!(RawSkipList::new());
        list.as_mut().init();
        for (task, key) in tasks.iter().zip([2, 1]) {
            task.node.set_key(key);
            unsafe { list.as_mut().insert(&task.node, 0) };
        }
        let text = format!("{:?}", list.as_ref().get_ref());
        assert!(text.contains("keys: [1, 2]"));
    }
}
