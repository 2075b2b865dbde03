//! Errors reported by the allocating skip list.
//!
//! The intrusive list never fails. Contract violations (stale handles,
//! double deletes) are panics, not errors.

use std::collections::TryReserveError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The node arena could not grow.
    #[error("skip list out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),
}
