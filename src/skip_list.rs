//! Allocating skip list.
//!
//! [`SkipList`] owns its nodes in an arena and hands out [`Handle`]s. It runs
//! the same algorithm as [`RawSkipList`](crate::raw::RawSkipList) but needs
//! no pinning and no unsafe code from the caller, at the price of owning the
//! values and allocating when the arena grows.
//!
//! # Structure
//!
//! ```text
//! slots: [ S | A | B | C | (free) | D ]
//!          ^ sentinel, slot 0, never freed
//! ```
//!
//! Nodes address each other by `u32` slot index. Deleted slots go on a free
//! list and are reused by later inserts. Each slot carries a generation that
//! is bumped on delete, so a handle to a deleted node never aliases the node
//! that reuses its slot.

use std::fmt;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use log::debug;
use rand_core::RngCore;

use crate::error::Error;
use crate::level::MAX_LEVEL;
use crate::level::MAX_LEVELS;
use crate::level::SENTINEL_KEY;
use crate::level::pick_level;
use crate::links;
use crate::links::Links;

/// Slot index. u32 saves space vs usize on 64-bit.
type Idx = u32;

/// The sentinel always lives in slot 0.
const HEAD: Idx = 0;

/// Source of per-list ids, so a handle from one list never validates
/// against another.
static NEXT_LIST_ID: AtomicU32 = AtomicU32::new(0);

fn next_list_id() -> u32 {
    return NEXT_LIST_ID.fetch_add(1, Ordering::Relaxed);
}

struct Slot<V> {
    /// `None` for the sentinel and for free slots.
    value: Option<V>,
    key: u64,
    level: u8,
    generation: u32,
    next: [Idx; MAX_LEVELS],
    prev: [Idx; MAX_LEVELS],
}

impl<V> Slot<V> {
    fn detached(idx: Idx) -> Self {
        return Slot {
            value: None,
            key: SENTINEL_KEY,
            level: 0,
            generation: 0,
            next: [idx; MAX_LEVELS],
            prev: [idx; MAX_LEVELS],
        };
    }
}

impl<V> Links for [Slot<V>] {
    type Ref = Idx;

    fn key(&self, node: Idx) -> u64 {
        return self[node as usize].key;
    }

    fn set_key(&mut self, node: Idx, key: u64) {
        self[node as usize].key = key;
    }

    fn level(&self, node: Idx) -> u8 {
        return self[node as usize].level;
    }

    fn set_level(&mut self, node: Idx, level: u8) {
        self[node as usize].level = level;
    }

    fn next(&self, node: Idx, level: usize) -> Idx {
        return self[node as usize].next[level];
    }

    fn set_next(&mut self, node: Idx, level: usize, to: Idx) {
        self[node as usize].next[level] = to;
    }

    fn prev(&self, node: Idx, level: usize) -> Idx {
        return self[node as usize].prev[level];
    }

    fn set_prev(&mut self, node: Idx, level: usize, to: Idx) {
        self[node as usize].prev[level] = to;
    }
}

/// Names a live entry of a [`SkipList`]. Returned by `insert`, accepted by
/// `delete`, `get` and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    list: u32,
    index: Idx,
    generation: u32,
}

/// An ordered multiset of `(u64, V)` bindings. See the [module docs](self).
pub struct SkipList<V> {
    /// Stamped into every handle this list issues.
    id: u32,
    /// Arena of nodes; slot 0 is the sentinel.
    slots: Vec<Slot<V>>,
    /// Highest level any live node occupies.
    level: u8,
    /// Live nodes, not counting the sentinel.
    entries: u64,
    /// Freed slots, reused before the arena grows.
    free_list: Vec<Idx>,
}

impl<V> SkipList<V> {
    /// Create an empty list, aborting if the sentinel cannot be allocated.
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(1);
        slots.push(Slot::detached(HEAD));
        return SkipList {
            id: next_list_id(),
            slots,
            level: 0,
            entries: 0,
            free_list: Vec::new(),
        };
    }

    /// Create an empty list, reporting allocation failure instead of aborting.
    pub fn try_new() -> Result<Self, Error> {
        return Self::with_capacity(0);
    }

    /// Create an empty list with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Result<Self, Error> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity.saturating_add(1))?;
        slots.push(Slot::detached(HEAD));
        let mut free_list = Vec::new();
        free_list.try_reserve_exact(capacity)?;
        return Ok(SkipList {
            id: next_list_id(),
            slots,
            level: 0,
            entries: 0,
            free_list,
        });
    }

    /// Number of live entries.
    pub fn len(&self) -> u64 {
        return self.entries;
    }

    pub fn is_empty(&self) -> bool {
        return self.slots[HEAD as usize].next[0] == HEAD;
    }

    /// Highest level any live node occupies, 0 when empty.
    pub fn level(&self) -> u8 {
        return self.level;
    }

    /// True if `handle` names a live entry of this list.
    pub fn contains(&self, handle: Handle) -> bool {
        if handle.list != self.id || handle.index == HEAD {
            return false;
        }
        return match self.slots.get(handle.index as usize) {
            Some(slot) => slot.generation == handle.generation && slot.value.is_some(),
            None => false,
        };
    }

    pub fn get(&self, handle: Handle) -> Option<&V> {
        if !self.contains(handle) {
            return None;
        }
        return self.slots[handle.index as usize].value.as_ref();
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut V> {
        if !self.contains(handle) {
            return None;
        }
        return self.slots[handle.index as usize].value.as_mut();
    }

    pub fn key(&self, handle: Handle) -> Option<u64> {
        if !self.contains(handle) {
            return None;
        }
        return Some(self.slots[handle.index as usize].key);
    }

    /// Handle of the entry with the smallest key; among equal keys, the
    /// oldest. O(1).
    pub fn front(&self) -> Option<Handle> {
        let idx = links::front(&self.slots[..], HEAD)?;
        return Some(self.handle(idx));
    }

    /// Insert `value` under `key` at a level picked from `seed` and the
    /// entry count.
    pub fn insert(&mut self, key: u64, value: V, seed: u64) -> Result<Handle, Error> {
        let level = pick_level(self.entries + 1, seed);
        return self.insert_at_level(key, value, level);
    }

    /// Insert with a seed drawn from `rng`.
    pub fn insert_with_rng<R: RngCore + ?Sized>(
        &mut self,
        key: u64,
        value: V,
        rng: &mut R,
    ) -> Result<Handle, Error> {
        return self.insert(key, value, rng.next_u64());
    }

    /// Insert at a caller-chosen level, still clamped to one above the
    /// current list level.
    pub fn insert_at_level(&mut self, key: u64, value: V, level: u8) -> Result<Handle, Error> {
        assert!(level <= MAX_LEVEL, "level {} out of range", level);
        let idx = self.alloc_slot(key, value)?;
        links::insert(&mut self.slots[..], HEAD, &mut self.level, idx, level);
        self.entries += 1;
        self.debug_check();
        return Ok(self.handle(idx));
    }

    /// Remove the entry named by `handle` and return its value. O(level).
    ///
    /// Panics if `handle` is stale or belongs to another list; a lost entry
    /// is worse than a crash.
    pub fn delete(&mut self, handle: Handle) -> V {
        assert!(
            self.contains(handle),
            "stale or foreign skip list handle {:?}",
            handle
        );
        return self.unlink(handle.index);
    }

    /// Remove and return the front entry.
    pub fn pop_front(&mut self) -> Option<(u64, V)> {
        let idx = links::front(&self.slots[..], HEAD)?;
        let key = self.slots[idx as usize].key;
        return Some((key, self.unlink(idx)));
    }

    /// Entries in key order.
    pub fn iter(&self) -> Iter<'_, V> {
        return Iter {
            slots: &self.slots,
            current: self.slots[HEAD as usize].next[0],
        };
    }

    /// Drop every value and return to the empty list, keeping the arena's
    /// capacity. Outstanding handles become stale.
    pub fn clear(&mut self) {
        self.free_list.clear();
        for idx in (1..self.slots.len() as Idx).rev() {
            let slot = &mut self.slots[idx as usize];
            if slot.value.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
            links::detach(&mut self.slots[..], idx);
            self.free_list.push(idx);
        }
        links::detach(&mut self.slots[..], HEAD);
        self.level = 0;
        self.entries = 0;
        self.debug_check();
    }

    /// Walk the whole list and panic if any structural invariant is broken.
    /// O(n); debug builds run it after every insert and delete.
    pub fn check_invariants(&self) {
        links::check(&self.slots[..], HEAD, self.level, self.entries);
        assert!(self.slots[HEAD as usize].value.is_none(), "sentinel holds a value");
        for &idx in &self.free_list {
            let slot = &self.slots[idx as usize];
            assert!(slot.value.is_none(), "free slot {} holds a value", idx);
            assert!(
                links::is_detached(&self.slots[..], idx),
                "free slot {} is still linked",
                idx
            );
        }
        assert_eq!(
            self.free_list.len() as u64 + self.entries + 1,
            self.slots.len() as u64,
            "slots leaked"
        );
    }

    // --- Slot helpers ---

    fn handle(&self, idx: Idx) -> Handle {
        return Handle {
            list: self.id,
            index: idx,
            generation: self.slots[idx as usize].generation,
        };
    }

    fn alloc_slot(&mut self, key: u64, value: V) -> Result<Idx, Error> {
        if let Some(idx) = self.free_list.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.key = key;
            slot.value = Some(value);
            return Ok(idx);
        }

        assert!(
            self.slots.len() < Idx::MAX as usize,
            "skip list arena exceeds {} slots",
            Idx::MAX
        );
        let idx = self.slots.len() as Idx;
        if self.slots.len() == self.slots.capacity() {
            self.slots.try_reserve(1)?;
            debug!("skip list arena grew to {} slots", self.slots.capacity());
        }
        // Keep room for every slot on the free list so delete never allocates.
        let needed = self.slots.capacity().saturating_sub(self.free_list.len());
        self.free_list.try_reserve(needed)?;

        let mut slot = Slot::detached(idx);
        slot.key = key;
        slot.value = Some(value);
        self.slots.push(slot);
        return Ok(idx);
    }

    fn unlink(&mut self, idx: Idx) -> V {
        links::delete(&mut self.slots[..], HEAD, &mut self.level, idx);
        let slot = &mut self.slots[idx as usize];
        slot.generation = slot.generation.wrapping_add(1);
        let value = slot.value.take();
        self.free_list.push(idx);
        self.entries -= 1;
        self.debug_check();
        return value.expect("live slot without a value");
    }

    #[cfg(debug_assertions)]
    fn debug_check(&self) {
        self.check_invariants();
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    fn debug_check(&self) {}
}

impl<V> Default for SkipList<V> {
    fn default() -> Self {
        return Self::new();
    }
}

impl<V: fmt::Debug> fmt::Debug for SkipList<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.debug_list().entries(self.iter()).finish();
    }
}

/// Iterator over `(key, &value)` in key order.
pub struct Iter<'a, V> {
    slots: &'a [Slot<V>],
    current: Idx,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (u64, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current == HEAD {
            return None;
        }
        let slot = &self.slots[self.current as usize];
        self.current = slot.next[0];
        return slot.value.as_ref().map(|value| (slot.key, value));
    }
}

impl<'a, V> IntoIterator for &'a SkipList<V> {
    type Item = (u64, &'a V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        return self.iter();
    }
}
