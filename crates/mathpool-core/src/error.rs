//! Error types for the mathpool allocator.
//!
//! Contract violations (bad indices, dead-epoch dereferences, recovering past
//! the retained window) panic. The variants here cover the failures a caller
//! can reasonably react to: running out of configured capacity, probing an
//! unmark, and rejected configuration.

use std::error::Error;
use std::fmt;

/// Which storage pool an allocation was made against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pool {
    /// Per-frame ring of scratch values.
    Transient,
    /// Reference-counted values kept across frames.
    Marked,
    /// Deduplicated immutable values.
    Constant,
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transient => "transient",
            Self::Marked => "marked",
            Self::Constant => "constant",
        };
        f.write_str(name)
    }
}

/// Errors returned by allocator operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MathError {
    /// A pool cannot satisfy the request within `max_pages`.
    ///
    /// For the transient pool this means the ring would wrap into data
    /// that is still live in the current or previous epoch.
    CapacityExceeded {
        /// The pool that ran out.
        pool: Pool,
        /// Number of 4-float slots requested.
        requested: usize,
        /// Number of slots that could have been handed out.
        available: usize,
    },
    /// `unmark` was given a handle that does not own a reference count
    /// (a transient value or an element view).
    NotMarked,
    /// `unmark` was given a marked handle whose count is already zero.
    AlreadyReleased,
    /// The reference count of a marked slot is at its cap.
    RefCountSaturated {
        /// The count at the time of the failed `mark`.
        count: u8,
    },
    /// The allocator configuration was rejected.
    InvalidConfig {
        /// Why the configuration is invalid.
        reason: String,
    },
}

impl fmt::Display for MathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded {
                pool,
                requested,
                available,
            } => {
                write!(
                    f,
                    "{pool} pool capacity exceeded: requested {requested} slots, {available} available"
                )
            }
            Self::NotMarked => write!(f, "handle is not a marked value"),
            Self::AlreadyReleased => write!(f, "marked value already released"),
            Self::RefCountSaturated { count } => {
                write!(f, "reference count saturated at {count}")
            }
            Self::InvalidConfig { reason } => write!(f, "invalid config: {reason}"),
        }
    }
}

impl Error for MathError {}
