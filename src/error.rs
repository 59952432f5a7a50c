//! Error type shared by every table engine.

/// Failures a table operation can report.
///
/// A missing key is never an error; lookups return `None` and `erase`
/// returns `false`.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// The backing arrays for `capacity` slots could not be allocated. The
    /// table that attempted the allocation is unchanged.
    #[error("failed to allocate backing storage for {capacity} slots")]
    AllocFailed {
        /// Slot count that was requested.
        capacity: usize,
    },

    /// A fixed-capacity table has no slot left for a new key.
    #[error("table is full: all {capacity} slots are occupied or tombstoned")]
    CapacityExceeded {
        /// The table's fixed capacity.
        capacity: usize,
    },

    /// A load factor outside `1..=99` percent was requested.
    #[error("load factor must be within 1..=99 percent, got {0}")]
    InvalidLoadFactor(u8),
}
