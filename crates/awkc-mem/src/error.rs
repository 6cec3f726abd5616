//! Error types for arena allocation and string interning.
//!
//! Only resource problems are reported through [`Error`]. Contract
//! violations (non-power-of-two alignment or table capacity, restoring a
//! marker whose slab is gone) panic instead.

/// Errors returned by fallible arena and pool operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A zero-byte allocation was requested.
    #[error("zero-sized allocation requested")]
    ZeroSizedAllocation,

    /// The system allocator could not provide a slab.
    #[error("out of memory: failed to allocate a slab of {requested} bytes")]
    OutOfMemory {
        /// Capacity of the slab that could not be allocated.
        requested: usize,
    },

    /// A new slab would push total slab capacity past the configured limit.
    #[error("arena limit exceeded: slab of {requested} bytes would exceed the {limit} byte limit")]
    LimitExceeded {
        /// Capacity of the slab that was refused.
        requested: usize,
        /// Configured limit on total slab capacity.
        limit: usize,
    },

    /// Size arithmetic overflowed or produced an invalid layout.
    #[error("capacity overflow: {size} bytes aligned to {align}")]
    CapacityOverflow {
        /// The requested size in bytes.
        size: usize,
        /// The requested alignment.
        align: usize,
    },
}

/// Result type for arena and pool operations.
pub type Result<T> = std::result::Result<T, Error>;
