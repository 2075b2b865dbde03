//! AFL fuzz harness for the skip lists.
//!
//! Drives the intrusive and allocating lists with the same byte-decoded
//! operation stream and checks after every step that:
//! 1. Both lists keep their structural invariants
//! 2. Both lists hold the same entries in the same order
//! 3. The front is always a minimum key

use std::pin::pin;

use afl::fuzz;
use sched_skiplist::{Handle, Node, RawSkipList, SkipList, skiplist_entry};

const POOL: usize = 64;

struct Task {
    id: usize,
    node: Node,
}

#[derive(Debug, Clone, Copy)]
enum FuzzOp {
    /// Queue a free task under `key` with level seed `seed`
    Insert { key: u8, seed: u8 },
    /// Dequeue the task in pool slot `slot`, if it is queued
    Delete { slot: u8 },
    /// Pick next
    PopFront,
}

impl FuzzOp {
    fn from_bytes(bytes: &[u8]) -> Option<(FuzzOp, &[u8])> {
        if bytes.is_empty() {
            return None;
        }

        let op_type = bytes[0] % 3;
        let rest = &bytes[1..];

        match op_type {
            0 if rest.len() >= 2 => Some((FuzzOp::Insert { key: rest[0], seed: rest[1] }, &rest[2..])),
            1 if !rest.is_empty() => Some((FuzzOp::Delete { slot: rest[0] }, &rest[1..])),
            2 => Some((FuzzOp::PopFront, rest)),
            _ => None,
        }
    }
}

fn main() {
    fuzz!(|data: &[u8]| {
        let pool: Vec<Task> = (0..POOL).map(|id| Task { id, node: Node::new() }).collect();
        for task in &pool {
            task.node.init();
        }
        let mut raw = pin!(RawSkipList::new());
        raw.as_mut().init();
        let mut list = SkipList::new();
        let mut handles: Vec<Option<Handle>> = vec![None; POOL];
        let mut remaining = data;

        while let Some((op, rest)) = FuzzOp::from_bytes(remaining) {
            remaining = rest;

            match op {
                FuzzOp::Insert { key, seed } => {
                    let Some(task) = pool.iter().find(|t| t.node.is_detached()) else {
                        continue;
                    };
                    task.node.set_key(key as u64);
                    unsafe { raw.as_mut().insert(&task.node, seed as u64) };
                    let handle = list.insert(key as u64, task.id, seed as u64).unwrap();
                    handles[task.id] = Some(handle);
                }

                FuzzOp::Delete { slot } => {
                    let id = slot as usize % POOL;
                    if let Some(handle) = handles[id].take() {
                        unsafe { raw.as_mut().delete(&pool[id].node) };
                        assert_eq!(list.delete(handle), id);
                    }
                }

                FuzzOp::PopFront => {
                    let from_raw = raw.as_mut().pop_front().map(|node| {
                        unsafe { &*skiplist_entry!(node.as_ptr(), Task, node) }.id
                    });
                    let from_list = list.pop_front().map(|(_, id)| id);
                    assert_eq!(from_raw, from_list, "lists disagree on the front");
                    if let Some(id) = from_raw {
                        handles[id] = None;
                    }
                }
            }

            raw.check_invariants();
            list.check_invariants();

            let raw_ids: Vec<usize> = raw
                .iter()
                .map(|node| unsafe { &*skiplist_entry!(node, Task, node) }.id)
                .collect();
            let list_ids: Vec<usize> = list.iter().map(|(_, id)| *id).collect();
            assert_eq!(raw_ids, list_ids, "lists diverged");
            assert_eq!(raw.level(), list.level(), "levels diverged");

            let min = list.iter().map(|(key, _)| key).min();
            assert_eq!(raw.front().map(Node::key), min, "front is not a minimum");
        }
    });
}
