//! The skip list algorithm, written once over an abstract node graph.
//!
//! Both list flavours store the same shape: every node has a `level`, a
//! `key` and fixed-width `next` / `prev` arrays, and each level is a circular
//! doubly-linked ring through a sentinel whose key is `SENTINEL_KEY`. The
//! intrusive list addresses nodes by raw pointer, the allocating list by
//! arena index. [`Links`] hides that difference so descent, splicing,
//! unlinking and level decay live in one place.
//!
//! ```text
//! Level 1: S ---------> 20 ----------> S
//! Level 0: S -> 10 ---> 20 ---> 30 --> S
//! ```

use log::trace;

use crate::level::MAX_LEVEL;
use crate::level::MAX_LEVELS;
use crate::level::SENTINEL_KEY;

/// Accessors over a node graph. `Ref` names a node; the sentinel is just
/// another `Ref` that the caller passes around as `head`.
pub(crate) trait Links {
    type Ref: Copy + Eq;

    fn key(&self, node: Self::Ref) -> u64;
    fn set_key(&mut self, node: Self::Ref, key: u64);
    fn level(&self, node: Self::Ref) -> u8;
    fn set_level(&mut self, node: Self::Ref, level: u8);
    fn next(&self, node: Self::Ref, level: usize) -> Self::Ref;
    fn set_next(&mut self, node: Self::Ref, level: usize, to: Self::Ref);
    fn prev(&self, node: Self::Ref, level: usize) -> Self::Ref;
    fn set_prev(&mut self, node: Self::Ref, level: usize, to: Self::Ref);
}

/// Put `node` into the detached state: level 0, sentinel key, and a
/// self-loop on every level.
pub(crate) fn detach<L: Links + ?Sized>(links: &mut L, node: L::Ref) {
    links.set_level(node, 0);
    links.set_key(node, SENTINEL_KEY);
    for k in 0..MAX_LEVELS {
        links.set_next(node, k, node);
        links.set_prev(node, k, node);
    }
}

/// True if every level of `node` loops back to itself.
pub(crate) fn is_detached<L: Links + ?Sized>(links: &L, node: L::Ref) -> bool {
    return (0..MAX_LEVELS).all(|k| links.next(node, k) == node && links.prev(node, k) == node);
}

/// First node on level 0, or `None` if the ring only holds the sentinel.
pub(crate) fn front<L: Links + ?Sized>(links: &L, head: L::Ref) -> Option<L::Ref> {
    let first = links.next(head, 0);
    if first == head {
        return None;
    }
    return Some(first);
}

/// Link `node` (already carrying its key) into the list rooted at `head`.
///
/// `wanted` is clamped to `list_level + 1` so one insertion never raises the
/// list by more than a level. Equal keys go after every existing node with
/// that key. Returns the level the node ended up on.
pub(crate) fn insert<L: Links + ?Sized>(
    links: &mut L,
    head: L::Ref,
    list_level: &mut u8,
    node: L::Ref,
    wanted: u8,
) -> u8 {
    debug_assert!(wanted <= MAX_LEVEL, "level {} out of range", wanted);
    debug_assert!(node != head, "cannot insert the sentinel into its own list");
    debug_assert!(is_detached(links, node), "node is already linked");

    let key = links.key(node);
    let mut update = [head; MAX_LEVELS];
    let mut p = head;
    let mut k = *list_level as usize;

    loop {
        loop {
            let q = links.next(p, k);
            // A real key of u64::MAX would never stop on the sentinel's key.
            if q == head || links.key(q) > key {
                break;
            }
            p = q;
        }
        update[k] = p;
        if k == 0 {
            break;
        }
        k -= 1;
    }

    let mut target = wanted;
    if target > *list_level {
        target = *list_level + 1;
        *list_level = target;
        update[target as usize] = head;
        trace!("skip list grew to level {}", target);
    }

    for k in (0..=target as usize).rev() {
        let p = update[k];
        let next = links.next(p, k);
        links.set_next(node, k, next);
        links.set_next(p, k, node);
        links.set_prev(node, k, p);
        links.set_prev(next, k, node);
    }
    links.set_level(node, target);

    return target;
}

/// Unlink `node` from every level it occupies, shrink the list level while
/// the sentinel's top rings are empty, then detach the node.
pub(crate) fn delete<L: Links + ?Sized>(
    links: &mut L,
    head: L::Ref,
    list_level: &mut u8,
    node: L::Ref,
) {
    debug_assert!(node != head, "cannot delete the sentinel");
    debug_assert!(!is_detached(links, node), "node is not linked");

    let height = links.level(node);
    for k in 0..=height as usize {
        let prev = links.prev(node, k);
        let next = links.next(node, k);
        links.set_next(prev, k, next);
        links.set_prev(next, k, prev);
    }

    if height == *list_level {
        let mut m = height as usize;
        while m > 0 && links.next(head, m) == head && links.prev(head, m) == head {
            m -= 1;
        }
        if m != height as usize {
            trace!("skip list decayed from level {} to {}", height, m);
        }
        *list_level = m as u8;
    }

    detach(links, node);
}

/// Walk the whole structure and panic on the first broken invariant.
///
/// Checks ring consistency on all 16 levels, key order, level membership,
/// the list level, and the entry count.
pub(crate) fn check<L: Links + ?Sized>(links: &L, head: L::Ref, list_level: u8, entries: u64) {
    assert_eq!(links.key(head), SENTINEL_KEY, "sentinel key was overwritten");

    // tall[k] = number of live nodes whose level is at least k.
    let mut tall = [0u64; MAX_LEVELS];
    let mut max_level = 0u8;
    let mut p = links.next(head, 0);
    let mut seen = 0u64;
    while p != head {
        seen += 1;
        assert!(seen <= entries, "level 0 holds more than {} entries", entries);
        let level = links.level(p);
        assert!(level <= MAX_LEVEL, "node level {} out of range", level);
        for count in tall.iter_mut().take(level as usize + 1) {
            *count += 1;
        }
        max_level = max_level.max(level);
        p = links.next(p, 0);
    }
    assert_eq!(seen, entries, "entry count does not match level 0");
    assert_eq!(list_level, max_level, "list level is not the tallest node");

    for k in 0..MAX_LEVELS {
        let mut p = head;
        let mut count = 0u64;
        let mut last_key = 0u64;
        loop {
            let q = links.next(p, k);
            assert!(links.prev(q, k) == p, "level {}: next/prev disagree", k);
            if q == head {
                break;
            }
            assert!(
                links.level(q) as usize >= k,
                "level {}: node of level {} is linked too high",
                k,
                links.level(q)
            );
            let key = links.key(q);
            assert!(key >= last_key, "level {}: key {} after {}", k, key, last_key);
            last_key = key;
            count += 1;
            assert!(count <= tall[k], "level {}: ring does not close", k);
            p = q;
        }
        assert_eq!(count, tall[k], "level {}: missing nodes", k);
    }
}
