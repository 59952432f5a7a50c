//! A fixed-capacity table shared between threads.
//!
//! Every slot is an [`AtomicCell`] holding the whole slot state, padded to
//! its own cache line. Operations load slots along a triangular probe and
//! publish changes with a single compare-and-swap. A failed swap restarts
//! the operation from the home slot.
//!
//! A slot that has held key `k` keeps `k` (live or tombstoned) until
//! [`ConcurrentTable::clear`], which needs `&mut self`. The first empty slot
//! on `k`'s probe path is therefore the only place a new copy of `k` can be
//! created, and two racing inserts of `k` cannot both succeed.
//!
//! The table never grows. Once every slot on a key's path holds some other
//! key, [`put`](ConcurrentTable::put) reports
//! [`TableError::CapacityExceeded`].
//!
//! Since a tombstone only ever takes back the key that left it, capacity is
//! spent per distinct key, not per live key. Churning through `capacity`
//! distinct keys exhausts the table even if each was erased again and
//! [`len`](ConcurrentTable::len) is 0. Size the table for every key it will
//! see between calls to [`clear`](ConcurrentTable::clear).

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Debug;
use core::sync::atomic::AtomicUsize;
use core::sync::atomic::Ordering;

use crossbeam_utils::Backoff;
use crossbeam_utils::CachePadded;
use crossbeam_utils::atomic::AtomicCell;

use crate::config::DEFAULT_CAPACITY;
use crate::error::TableError;
use crate::key::TableKey;
use crate::probe::ProbeSeq;
use crate::probe::TriangularProbe;
use crate::slot::Capacity;
use crate::slot::alloc_failed;
use crate::slot::prefetch;
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot<K, V> {
    Empty,
    Occupied { key: K, value: V },
    Tombstone { key: K },
}

type Cell<K, V> = CachePadded<AtomicCell<Slot<K, V>>>;

/// A lock-free (per slot) open-addressed table with a fixed capacity.
///
/// Lookups, inserts and erases take `&self`, so the table can be shared
/// across threads directly or through an `Arc`. Capacity is consumed by
/// distinct keys, erased ones included, until the next `clear`.
///
/// ```rust
/// use crash_hash::ConcurrentTable;
/// use crash_hash::MixedKey;
///
/// let table: ConcurrentTable<MixedKey, u64> = ConcurrentTable::with_capacity(1024);
/// std::thread::scope(|s| {
///     for t in 0..4u64 {
///         let table = &table;
///         s.spawn(move || {
///             for k in 0..100 {
///                 table.put(MixedKey(t * 100 + k), k).unwrap();
///             }
///         });
///     }
/// });
/// assert_eq!(table.len(), 400);
/// assert_eq!(table.get(&MixedKey(399)), Some(99));
/// ```
pub struct ConcurrentTable<K, V> {
    slots: Box<[Cell<K, V>]>,
    capacity: Capacity,
    size: AtomicUsize,
    effective_size: AtomicUsize,
}

impl<K, V> ConcurrentTable<K, V>
where
    K: TableKey,
    V: Copy + Eq + Default,
{
    /// Creates a table with [`DEFAULT_CAPACITY`] slots.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a table with at least `capacity` slots, rounded up to a power
    /// of two. The capacity never changes afterwards.
    pub fn with_capacity(capacity: usize) -> Self {
        match Self::try_with_capacity(capacity) {
            Ok(table) => table,
            Err(_) => alloc_failed::<Cell<K, V>>(capacity),
        }
    }

    /// Fallible [`with_capacity`](Self::with_capacity).
    pub fn try_with_capacity(capacity: usize) -> Result<Self, TableError> {
        let capacity = Capacity::at_least(capacity, 1)?;
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity.slots())
            .map_err(|_| TableError::AllocFailed {
                capacity: capacity.slots(),
            })?;
        slots.extend(
            (0..capacity.slots()).map(|_| CachePadded::new(AtomicCell::new(Slot::Empty))),
        );
        Ok(ConcurrentTable {
            slots: slots.into_boxed_slice(),
            capacity,
            size: AtomicUsize::new(0),
            effective_size: AtomicUsize::new(0),
        })
    }

    /// Whether slot updates compile to native atomics. When `false`,
    /// crossbeam falls back to a striped sequence lock; reads are still never
    /// torn.
    pub fn is_lock_free() -> bool {
        AtomicCell::<Slot<K, V>>::is_lock_free()
    }

    /// Walks `key`'s probe path and returns the slot that settles it: the
    /// key's own live or tombstoned slot, or the first empty slot. `None`
    /// when the whole table was walked without either.
    #[inline]
    fn locate(&self, key: &K) -> Option<(usize, Slot<K, V>)> {
        let mut probe = TriangularProbe::start(key.table_hash(), self.capacity.mask());
        for _ in 0..self.capacity.slots() {
            let index = probe.pos();
            let slot = self.slots[index].load();
            match slot {
                Slot::Empty => return Some((index, slot)),
                Slot::Occupied { key: k, .. } | Slot::Tombstone { key: k } if k == *key => {
                    return Some((index, slot));
                }
                _ => probe.advance(),
            }
        }
        None
    }

    /// Returns the value stored for `key`.
    #[inline]
    pub fn get(&self, key: &K) -> Option<V> {
        match self.locate(key) {
            Some((_, Slot::Occupied { value, .. })) => Some(value),
            _ => None,
        }
    }

    /// Returns the value stored for `key`, or `V::default()` if there is
    /// none.
    #[inline]
    pub fn find(&self, key: &K) -> V {
        self.get(key).unwrap_or_default()
    }

    /// Returns `true` if `key` is live.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Inserts or overwrites `key`.
    ///
    /// A key that was erased earlier takes its old slot back. Fails with
    /// [`TableError::CapacityExceeded`] when the probe path holds neither
    /// the key nor an empty slot.
    pub fn put(&self, key: K, value: V) -> Result<(), TableError> {
        let backoff = Backoff::new();
        let new = Slot::Occupied { key, value };
        loop {
            let Some((index, current)) = self.locate(&key) else {
                #[cfg(feature = "logging")]
                log::warn!(
                    "concurrent table with {} slots has no room left for a new key ({} live)",
                    self.capacity(),
                    self.len()
                );
                return Err(TableError::CapacityExceeded {
                    capacity: self.capacity(),
                });
            };

            // Counts rise before the swap publishes the entry. A matching
            // erase can only decrement after it.
            let (grows_size, grows_effective) = match current {
                Slot::Occupied { .. } => (false, false),
                Slot::Tombstone { .. } => (true, false),
                Slot::Empty => (true, true),
            };
            if grows_size {
                self.size.fetch_add(1, Ordering::Relaxed);
            }
            if grows_effective {
                self.effective_size.fetch_add(1, Ordering::Relaxed);
            }

            if self.slots[index].compare_exchange(current, new).is_ok() {
                return Ok(());
            }

            if grows_size {
                self.size.fetch_sub(1, Ordering::Relaxed);
            }
            if grows_effective {
                self.effective_size.fetch_sub(1, Ordering::Relaxed);
            }
            backoff.spin();
        }
    }

    /// Tombstones `key`. Returns whether this call removed it.
    pub fn erase(&self, key: &K) -> bool {
        let backoff = Backoff::new();
        loop {
            let Some((index, current @ Slot::Occupied { .. })) = self.locate(key) else {
                return false;
            };
            if self.slots[index]
                .compare_exchange(current, Slot::Tombstone { key: *key })
                .is_ok()
            {
                self.size.fetch_sub(1, Ordering::Relaxed);
                return true;
            }
            backoff.spin();
        }
    }

    /// Empties every slot, including tombstones.
    pub fn clear(&mut self) {
        for slot in self.slots.iter() {
            slot.store(Slot::Empty);
        }
        *self.size.get_mut() = 0;
        *self.effective_size.get_mut() = 0;
    }

    /// Number of live keys. Exact once all writers have been joined.
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Returns `true` if no key is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tombstoned slots.
    pub fn tombstones(&self) -> usize {
        self.effective_size
            .load(Ordering::Relaxed)
            .saturating_sub(self.len())
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity.slots()
    }

    /// Bytes held by the slot array plus the table's own fields.
    pub fn memory_use(&self) -> usize {
        self.capacity.slots() * size_of::<Cell<K, V>>() + size_of::<Self>()
    }

    /// Home slot of `key`, after hinting it into cache.
    pub fn prefetch(&self, key: &K) -> usize {
        let index = TriangularProbe::start(key.table_hash(), self.capacity.mask()).pos();
        prefetch(&*self.slots[index] as *const AtomicCell<Slot<K, V>>);
        index
    }

    /// Live `(key, value)` pairs, one slot load at a time. Entries written
    /// concurrently may or may not be seen.
    pub fn iter(&self) -> impl Iterator<Item = (K, V)> + '_ {
        self.slots.iter().filter_map(|slot| match slot.load() {
            Slot::Occupied { key, value } => Some((key, value)),
            _ => None,
        })
    }
}

impl<K, V> Default for ConcurrentTable<K, V>
where
    K: TableKey,
    V: Copy + Eq + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Debug for ConcurrentTable<K, V>
where
    K: TableKey + Debug,
    V: Copy + Eq + Default + Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct Live<'a, K, V>(&'a [Cell<K, V>]);

        impl<K: Copy + Debug, V: Copy + Debug> Debug for Live<'_, K, V> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut map = f.debug_map();
                for (index, slot) in self.0.iter().enumerate() {
                    match slot.load() {
                        Slot::Empty => {}
                        state => {
                            map.entry(&index, &state);
                        }
                    }
                }
                map.finish()
            }
        }

        f.debug_struct("ConcurrentTable")
            .field("size", &self.len())
            .field("tombstones", &self.tombstones())
            .field("capacity", &self.capacity())
            .field("slots", &Live(&self.slots))
            .finish()
    }
}

impl<K, V> Table<K, V> for ConcurrentTable<K, V>
where
    K: TableKey,
    V: Copy + Eq + Default,
{
    fn get(&self, key: &K) -> Option<V> {
        ConcurrentTable::get(self, key)
    }

    fn find(&self, key: &K) -> V {
        ConcurrentTable::find(self, key)
    }

    fn put(&mut self, key: K, value: V) -> Result<(), TableError> {
        ConcurrentTable::put(self, key, value)
    }

    fn erase(&mut self, key: &K) -> bool {
        ConcurrentTable::erase(self, key)
    }

    fn clear(&mut self) {
        ConcurrentTable::clear(self)
    }

    fn size(&self) -> usize {
        self.len()
    }

    fn memory_use(&self) -> usize {
        ConcurrentTable::memory_use(self)
    }

    fn prefetch(&self, key: &K) -> usize {
        ConcurrentTable::prefetch(self, key)
    }

    fn capacity(&self) -> usize {
        ConcurrentTable::capacity(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::FixedStr;
    use crate::key::IdentityKey;
    use crate::key::MixedKey;

    #[test]
    fn put_get_erase() {
        let table: ConcurrentTable<MixedKey, u64> = ConcurrentTable::with_capacity(64);
        assert_eq!(table.capacity(), 64);
        table.put(MixedKey(1), 10).unwrap();
        table.put(MixedKey(2), 20).unwrap();
        table.put(MixedKey(1), 11).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&MixedKey(1)), Some(11));
        assert_eq!(table.find(&MixedKey(2)), 20);
        assert_eq!(table.get(&MixedKey(3)), None);

        assert!(table.erase(&MixedKey(1)));
        assert!(!table.erase(&MixedKey(1)));
        assert_eq!(table.get(&MixedKey(1)), None);
        assert_eq!(table.len(), 1);
        assert_eq!(table.tombstones(), 1);
    }

    #[test]
    fn erased_key_takes_its_slot_back() {
        let table: ConcurrentTable<IdentityKey, u32> = ConcurrentTable::with_capacity(16);
        table.put(IdentityKey(4), 1).unwrap();
        table.put(IdentityKey(20), 2).unwrap();
        assert!(table.erase(&IdentityKey(4)));

        // 36 shares home slot 4 but must not take 4's tombstone.
        table.put(IdentityKey(36), 3).unwrap();
        assert_eq!(table.tombstones(), 1);

        table.put(IdentityKey(4), 5).unwrap();
        assert_eq!(table.tombstones(), 0);
        assert_eq!(table.len(), 3);
        assert!(matches!(
            table.slots[4].load(),
            Slot::Occupied {
                key: IdentityKey(4),
                value: 5
            }
        ));
        assert_eq!(table.get(&IdentityKey(20)), Some(2));
        assert_eq!(table.get(&IdentityKey(36)), Some(3));
    }

    #[test]
    fn full_table_reports_capacity_exceeded() {
        let table: ConcurrentTable<IdentityKey, u8> = ConcurrentTable::with_capacity(4);
        for k in 0..4u64 {
            table.put(IdentityKey(k), k as u8).unwrap();
        }
        assert_eq!(
            table.put(IdentityKey(9), 0),
            Err(TableError::CapacityExceeded { capacity: 4 })
        );
        // Overwrites still work on a full table.
        table.put(IdentityKey(2), 7).unwrap();
        assert_eq!(table.get(&IdentityKey(2)), Some(7));

        // A tombstone is reserved for the key that left it.
        assert!(table.erase(&IdentityKey(1)));
        assert!(table.put(IdentityKey(9), 0).is_err());
        table.put(IdentityKey(1), 1).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.get(&IdentityKey(9)), None);
    }

    #[test]
    fn oversized_capacity_is_an_error() {
        let result = ConcurrentTable::<IdentityKey, u8>::try_with_capacity(usize::MAX);
        assert!(matches!(result, Err(TableError::AllocFailed { .. })));
    }

    #[test]
    fn distinct_key_churn_exhausts_slots() {
        let mut table: ConcurrentTable<MixedKey, u32> = ConcurrentTable::with_capacity(64);
        for k in 0..64u64 {
            table.put(MixedKey(k), 1).unwrap();
            assert!(table.erase(&MixedKey(k)));
        }
        assert!(table.is_empty());
        assert_eq!(table.tombstones(), 64);
        assert_eq!(
            table.put(MixedKey(64), 1),
            Err(TableError::CapacityExceeded { capacity: 64 })
        );
        // Keys seen before still find their own tombstones.
        table.put(MixedKey(10), 2).unwrap();
        assert_eq!(table.get(&MixedKey(10)), Some(2));

        table.clear();
        table.put(MixedKey(64), 1).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn clear_resets_everything() {
        let mut table: ConcurrentTable<FixedStr<16>, u32> = ConcurrentTable::new();
        table.put(FixedStr::new("a"), 1).unwrap();
        table.put(FixedStr::new("b"), 2).unwrap();
        table.erase(&FixedStr::new("a"));
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.tombstones(), 0);
        assert_eq!(table.iter().count(), 0);
        table.put(FixedStr::new("b"), 3).unwrap();
        assert_eq!(table.get(&FixedStr::new("b")), Some(3));
    }

    #[test]
    fn debug_lists_non_empty_slots() {
        let table: ConcurrentTable<IdentityKey, u8> = ConcurrentTable::with_capacity(8);
        table.put(IdentityKey(3), 1).unwrap();
        table.put(IdentityKey(5), 2).unwrap();
        table.erase(&IdentityKey(5));
        let out = alloc::format!("{table:?}");
        assert!(out.contains("3: Occupied"), "{out}");
        assert!(out.contains("5: Tombstone"), "{out}");
    }

    #[cfg(feature = "std")]
    mod threaded {
        use std::sync::atomic::AtomicUsize;
        use std::sync::atomic::Ordering;
        use std::thread;

        use super::*;

        const THREADS: u64 = 8;

        #[test]
        fn disjoint_writers() {
            let table: ConcurrentTable<MixedKey, u64> = ConcurrentTable::with_capacity(1 << 14);
            thread::scope(|s| {
                for t in 0..THREADS {
                    let table = &table;
                    s.spawn(move || {
                        for k in 0..1000 {
                            let key = t * 1000 + k;
                            table.put(MixedKey(key), key * 3).unwrap();
                        }
                    });
                }
            });
            assert_eq!(table.len(), 8000);
            for key in 0..8000u64 {
                assert_eq!(table.get(&MixedKey(key)), Some(key * 3));
            }
        }

        #[test]
        fn racing_inserts_do_not_duplicate() {
            let table: ConcurrentTable<IdentityKey, u64> = ConcurrentTable::with_capacity(2048);
            thread::scope(|s| {
                for t in 0..THREADS {
                    let table = &table;
                    // Every key has home slot 0, so all threads contend on
                    // the same probe chain.
                    s.spawn(move || {
                        for k in 0..200u64 {
                            table.put(IdentityKey(k << 11), t).unwrap();
                        }
                    });
                }
            });
            assert_eq!(table.len(), 200);
            assert_eq!(table.iter().count(), 200);
            let mut keys: Vec<u64> = table.iter().map(|(k, _)| k.0).collect();
            keys.sort_unstable();
            keys.dedup();
            assert_eq!(keys.len(), 200);
        }

        #[test]
        fn racing_erases_succeed_once() {
            let table: ConcurrentTable<MixedKey, u32> = ConcurrentTable::with_capacity(1024);
            for k in 0..500u64 {
                table.put(MixedKey(k), 1).unwrap();
            }
            let removed = AtomicUsize::new(0);
            thread::scope(|s| {
                for _ in 0..THREADS {
                    let (table, removed) = (&table, &removed);
                    s.spawn(move || {
                        for k in 0..500u64 {
                            if table.erase(&MixedKey(k)) {
                                removed.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    });
                }
            });
            assert_eq!(removed.into_inner(), 500);
            assert!(table.is_empty());
            assert_eq!(table.tombstones(), 500);
        }

        #[test]
        fn mixed_churn_keeps_counts_consistent() {
            let table: ConcurrentTable<MixedKey, u64> = ConcurrentTable::with_capacity(4096);
            thread::scope(|s| {
                for t in 0..THREADS {
                    let table = &table;
                    s.spawn(move || {
                        for round in 0..2000u64 {
                            let key = MixedKey((round * 7 + t) % 256);
                            match round % 3 {
                                0 | 1 => table.put(key, round).unwrap(),
                                _ => {
                                    table.erase(&key);
                                }
                            }
                            let _ = table.get(&key);
                        }
                    });
                }
            });
            assert_eq!(table.len(), table.iter().count());
            assert!(table.len() + table.tombstones() <= 256);
        }
    }
}
