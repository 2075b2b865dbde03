//! Bounded-height, bidirectional skip lists for scheduler run-queues.
//!
//! An ordered multiset of `(u64, value)` bindings with expected O(log n)
//! insert, O(level) delete by handle (no search), and O(1) access to the
//! smallest key. Every level is a circular doubly-linked ring through a
//! sentinel whose key is `u64::MAX`; nodes are at most 16 levels tall.
//!
//! Two flavours share one algorithm:
//!
//! - [`RawSkipList`] + [`Node`]: intrusive. The caller embeds a `Node` in
//!   each payload and the list never allocates.
//! - [`SkipList`]: allocating. Owns its values in an arena and hands out
//!   [`Handle`]s.
//!
//! Neither is synchronised, and neither draws randomness: each insert takes
//! a caller-supplied 64-bit seed that picks the node's level.
//!
//! # Quick Start
//!
//! ```
//! use sched_skiplist::SkipList;
//!
//! let mut queue = SkipList::new();
//! let slow = queue.insert(300, "slow", 0x5).unwrap();
//! queue.insert(100, "urgent", 0x2).unwrap();
//!
//! assert_eq!(queue.pop_front(), Some((100, "urgent")));
//! assert_eq!(queue.delete(slow), "slow");
//! assert!(queue.is_empty());
//! ```

mod error;
pub mod level;
mod links;
pub mod node;
pub mod raw;
pub mod skip_list;

pub use error::Error;
pub use level::MAX_LEVELS;
pub use level::SENTINEL_KEY;
pub use level::pick_level;
pub use node::Node;
pub use raw::RawSkipList;
pub use skip_list::Handle;
pub use skip_list::SkipList;
