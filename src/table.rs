//! The operation set every table variant exposes.
//!
//! Benchmark drivers are written against [`Table`] so that the engines, and
//! any baseline wrapped around a general-purpose map, can be swapped without
//! touching the workload code.

use crate::error::TableError;
use crate::key::TableKey;

/// Uniform capability contract over the table engines.
///
/// ```rust
/// use crash_hash::IdentityKey;
/// use crash_hash::LinearTable;
/// use crash_hash::Table;
///
/// fn fill<T: Table<IdentityKey, u64>>(table: &mut T) {
///     for k in 0..100 {
///         table.put(IdentityKey(k), k * 2).unwrap();
///     }
/// }
///
/// let mut table = LinearTable::new();
/// fill(&mut table);
/// assert_eq!(table.size(), 100);
/// assert_eq!(Table::get(&table, &IdentityKey(21)), Some(42));
/// ```
pub trait Table<K: TableKey, V: Copy> {
    /// The stored value for `key`, if any.
    fn get(&self, key: &K) -> Option<V>;

    /// The stored value for `key` without the presence check.
    ///
    /// The result for an absent key is unspecified (but always a valid `V`).
    /// Meant for hot loops where the caller already knows the key is present.
    fn find(&self, key: &K) -> V;

    /// Inserts `key`, or overwrites its value if it is already present.
    fn put(&mut self, key: K, value: V) -> Result<(), TableError>;

    /// Removes `key`. Returns whether it was present.
    fn erase(&mut self, key: &K) -> bool;

    /// Removes every entry without giving back capacity.
    fn clear(&mut self);

    /// Number of live keys.
    fn size(&self) -> usize;

    /// Approximate bytes of backing storage. `0` means unknown.
    fn memory_use(&self) -> usize;

    /// The first slot an operation on `key` would touch. Lets callers warm
    /// the cache line ahead of the real operation.
    fn prefetch(&self, key: &K) -> usize;

    /// Number of slots currently allocated.
    fn capacity(&self) -> usize;
}
