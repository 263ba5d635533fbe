//! Error types for arena and stat operations.
//!
//! All errors that can occur while allocating arena memory, mutating
//! stats, or loading serialized arenas are represented by the
//! `StatError` enum. None of them are fatal to the graph: a failed
//! call leaves every other stat untouched.

use crate::handle::{ModifierHandle, OwnerId, StatHandle};
use crate::stat_id::StatId;
use thiserror::Error;

/// Format a cycle path as a readable string.
fn format_cycle_path(path: &[StatHandle]) -> String {
    if path.is_empty() {
        return String::from("(empty cycle)");
    }
    path.iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Errors that can occur during arena or stat operations.
///
/// # Examples
///
/// ```rust
/// use statarena::{StatError, StatId};
///
/// let err = StatError::UnknownStat(StatId::from_str("HP"));
/// println!("{}", err); // "Unknown stat: HP"
/// ```
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StatError {
    /// The handle's version does not match its slot, the index is out of
    /// range, or the handle is null.
    ///
    /// Stale handles are expected when deletions are deferred, so this is
    /// always recoverable.
    #[error("Invalid or stale handle")]
    InvalidHandle,

    /// The owner was destroyed or never existed.
    #[error("Unknown owner: {0}")]
    UnknownOwner(OwnerId),

    /// The owner has no stat with this id.
    #[error("Unknown stat: {0}")]
    UnknownStat(StatId),

    /// The same stat id was declared twice on one owner.
    #[error("Duplicate stat: {0}")]
    DuplicateStat(StatId),

    /// No modifier with this id exists on the stat.
    #[error("Unknown modifier: {0}")]
    UnknownModifier(ModifierHandle),

    /// Zero-sized allocations are rejected.
    #[error("Allocation size must be non-zero")]
    InvalidSize,

    /// The arena reached its configured capacity cap and cannot grow.
    #[error("Arena exhausted: requested {requested} bytes, capacity {capacity} bytes")]
    AllocationExhausted {
        /// Number of bytes (or slots) requested.
        requested: usize,
        /// The configured cap.
        capacity: usize,
    },

    /// A serialized arena failed validation on load.
    #[error("Corrupt arena: {reason}")]
    CorruptArena {
        /// What failed to validate.
        reason: String,
    },

    /// Adding a modifier would close a dependency cycle.
    ///
    /// Contains the path of stats involved, starting and ending with
    /// the same stat.
    #[error("Cycle detected: {}", format_cycle_path(.path))]
    Cycle { path: Vec<StatHandle> },

    /// A cascade visited more stats than the configured budget allows
    /// and was truncated.
    #[error("Cascade budget of {limit} stats exceeded")]
    CycleBudgetExceeded {
        /// The configured budget.
        limit: usize,
    },
}

impl StatError {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        StatError::CorruptArena {
            reason: reason.into(),
        }
    }
}
