//! Level selection for new skip list nodes.
//!
//! Levels are drawn from the low four bits of a caller-supplied seed, which
//! approximates a geometric distribution well enough for scheduler-sized
//! queues. The candidate is then clipped by the number of entries so that a
//! short list never grows tall towers it cannot use.

/// Number of levels every node carries. 16 levels fit within a `u8` and
/// cover far more entries than any run-queue will ever hold.
pub const MAX_LEVELS: usize = 16;

/// Highest valid level index.
pub const MAX_LEVEL: u8 = (MAX_LEVELS - 1) as u8;

/// Key carried by the sentinel and by every detached node. Compares greater
/// than or equal to every real key, so forward scans always stop on it.
pub const SENTINEL_KEY: u64 = u64::MAX;

/// Pick a level in `0..MAX_LEVELS` for a node joining a list of `entries`
/// nodes.
///
/// | entries | mask |
/// |---------|------|
/// | 0..=3   | level 0 only |
/// | 4..=7   | `0x1` |
/// | 8..=15  | `0x3` |
/// | 16..=31 | `0x7` |
/// | 32..    | `0xF` |
pub fn pick_level(entries: u64, seed: u64) -> u8 {
    let mask = match entries {
        0..=3 => return 0,
        4..=7 => 0x1,
        8..=15 => 0x3,
        16..=31 => 0x7,
        _ => 0xF,
    };
    return (seed & mask) as u8;
}
