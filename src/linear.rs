use core::fmt;
use core::fmt::Debug;

use crate::config::DEFAULT_CAPACITY;
use crate::error::TableError;
use crate::key::TableKey;
use crate::probe::LinearProbe;
use crate::probe::ProbeSeq;
use crate::slot::Capacity;
use crate::slot::Claim;
use crate::slot::Meta;
use crate::slot::Slots;
use crate::slot::alloc_failed;
use crate::table::Table;

/// An open-addressed table probing `h, h+1, h+2, ...`.
///
/// Deleted slots become tombstones so later keys on the same probe run stay
/// reachable. Tombstones count toward the growth trigger and are dropped by
/// the next rebuild. The table doubles once more than half of its slots are
/// live or tombstoned.
///
/// ```rust
/// use crash_hash::LinearTable;
/// use crash_hash::MixedKey;
///
/// let mut table = LinearTable::new();
/// table.put(MixedKey(1), 10u32).unwrap();
/// table.put(MixedKey(1), 11).unwrap();
/// assert_eq!(table.get(&MixedKey(1)), Some(11));
/// assert_eq!(table.len(), 1);
///
/// assert!(table.erase(&MixedKey(1)));
/// assert_eq!(table.get(&MixedKey(1)), None);
/// ```
pub struct LinearTable<K, V> {
    slots: Slots<K, V, Meta>,
    /// Live keys.
    size: usize,
    /// Live keys plus tombstones.
    effective_size: usize,
}

impl<K: TableKey, V: Copy + Default> LinearTable<K, V> {
    /// Creates a table with [`DEFAULT_CAPACITY`] slots.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a table with `capacity` slots, rounded up to a power of two.
    ///
    /// Aborts through the allocation error handler if the arrays cannot be
    /// allocated.
    pub fn with_capacity(capacity: usize) -> Self {
        match Self::try_with_capacity(capacity) {
            Ok(table) => table,
            Err(_) => alloc_failed::<(K, V)>(capacity),
        }
    }

    /// Fallible [`with_capacity`](Self::with_capacity).
    pub fn try_with_capacity(capacity: usize) -> Result<Self, TableError> {
        Self::with_slots(Capacity::at_least(capacity, 1)?)
    }

    fn with_slots(capacity: Capacity) -> Result<Self, TableError> {
        Ok(LinearTable {
            slots: Slots::try_new(capacity, Meta::Empty)?,
            size: 0,
            effective_size: 0,
        })
    }

    /// Returns the value stored for `key`.
    #[inline]
    pub fn get(&self, key: &K) -> Option<V> {
        self.slots
            .search::<LinearProbe>(key)
            .ok()
            .map(|index| self.slots.values[index])
    }

    /// Returns the value in the slot where the probe for `key` stops. Only
    /// meaningful when `key` is present.
    #[inline]
    pub fn find(&self, key: &K) -> V {
        let (Ok(index) | Err(index)) = self.slots.search::<LinearProbe>(key);
        self.slots.values[index]
    }

    /// Returns `true` if `key` is live.
    pub fn contains_key(&self, key: &K) -> bool {
        self.slots.search::<LinearProbe>(key).is_ok()
    }

    /// Inserts or overwrites `key`.
    ///
    /// If the insert would push live keys plus tombstones past half the
    /// slots, the table is rebuilt at double capacity first. A failed
    /// rebuild leaves the table exactly as it was.
    pub fn put(&mut self, key: K, value: V) -> Result<(), TableError> {
        match self.slots.claim::<LinearProbe>(&key) {
            Claim::Existing(index) => {
                self.slots.values[index] = value;
                Ok(())
            }
            Claim::Vacant {
                index,
                reuses_tombstone: true,
            } => {
                self.occupy(index, key, value);
                self.size += 1;
                Ok(())
            }
            Claim::Vacant {
                index,
                reuses_tombstone: false,
            } if (self.effective_size + 1) * 2 <= self.capacity() => {
                self.occupy(index, key, value);
                self.size += 1;
                self.effective_size += 1;
                Ok(())
            }
            Claim::Vacant { .. } | Claim::Full => {
                self.grow_to(self.slots.capacity().doubled()?)?;
                self.slots.insert_fresh::<LinearProbe>(key, value);
                self.size += 1;
                self.effective_size += 1;
                Ok(())
            }
        }
    }

    #[inline(always)]
    fn occupy(&mut self, index: usize, key: K, value: V) {
        self.slots.keys[index] = key;
        self.slots.values[index] = value;
        self.slots.state[index] = Meta::Occupied;
    }

    /// Removes `key`, leaving a tombstone. Returns whether it was present.
    pub fn erase(&mut self, key: &K) -> bool {
        match self.slots.search::<LinearProbe>(key) {
            Ok(index) => {
                self.slots.state[index] = Meta::Tombstone;
                self.size -= 1;
                true
            }
            Err(_) => false,
        }
    }

    /// Removes every entry and tombstone, keeping the capacity.
    pub fn clear(&mut self) {
        self.slots.reset(Meta::Empty);
        self.size = 0;
        self.effective_size = 0;
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns `true` if no key is live.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of tombstones waiting for the next rebuild.
    pub fn tombstones(&self) -> usize {
        self.effective_size - self.size
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.capacity().slots()
    }

    /// Bytes held by the backing arrays.
    pub fn memory_use(&self) -> usize {
        self.slots.memory_use()
    }

    /// Home slot of `key`, after hinting it into cache.
    pub fn prefetch(&self, key: &K) -> usize {
        let index = LinearProbe::start(key.table_hash(), self.slots.mask()).pos();
        self.slots.prefetch(index);
        index
    }

    /// Live `(key, value)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (K, V)> + '_ {
        self.slots.live().map(|(_, key, value)| (key, value))
    }

    /// Rebuilds into `capacity` slots, dropping tombstones. On error the
    /// table is untouched.
    #[cold]
    fn grow_to(&mut self, capacity: Capacity) -> Result<(), TableError> {
        let mut replacement = Self::with_slots(capacity)?;
        for (_, key, value) in self.slots.live() {
            replacement.slots.insert_fresh::<LinearProbe>(key, value);
        }
        replacement.size = self.size;
        replacement.effective_size = self.size;

        #[cfg(feature = "logging")]
        log::debug!(
            "linear table grew from {} to {} slots ({} live, {} tombstones dropped)",
            self.capacity(),
            replacement.capacity(),
            self.size,
            self.tombstones()
        );

        *self = replacement;
        Ok(())
    }

    /// Probe-length histogram of the live keys; index `n` counts keys found
    /// after `n` steps.
    #[cfg(feature = "stats")]
    pub fn probe_histogram(&self) -> crate::stats::ProbeHistogram {
        crate::stats::ProbeHistogram::collect::<K, LinearProbe, _>(
            self.slots.live().map(|(index, key, _)| (index, key)),
            self.slots.mask(),
        )
    }

    /// Snapshot of occupancy and memory figures.
    #[cfg(feature = "stats")]
    pub fn debug_stats(&self) -> crate::stats::DebugStats {
        crate::stats::DebugStats::new(
            self.size,
            self.tombstones(),
            self.capacity(),
            self.memory_use(),
            &self.probe_histogram(),
        )
    }
}

impl<K: TableKey, V: Copy + Default> Default for LinearTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: TableKey + Debug, V: Copy + Default + Debug> Debug for LinearTable<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearTable")
            .field("size", &self.size)
            .field("tombstones", &self.tombstones())
            .field("capacity", &self.capacity())
            .field(
                "slots",
                &DebugSlots {
                    slots: &self.slots,
                },
            )
            .finish()
    }
}

/// Renders occupied slots as `index: key => value`.
pub(crate) struct DebugSlots<'a, K, V> {
    pub(crate) slots: &'a Slots<K, V, Meta>,
}

impl<K: TableKey + Debug, V: Copy + Default + Debug> Debug for DebugSlots<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (index, key, value) in self.slots.live() {
            map.key(&index).value(&(key, value));
        }
        map.finish()
    }
}

impl<K: TableKey, V: Copy + Default> Table<K, V> for LinearTable<K, V> {
    fn get(&self, key: &K) -> Option<V> {
        LinearTable::get(self, key)
    }

    fn find(&self, key: &K) -> V {
        LinearTable::find(self, key)
    }

    fn put(&mut self, key: K, value: V) -> Result<(), TableError> {
        LinearTable::put(self, key, value)
    }

    fn erase(&mut self, key: &K) -> bool {
        LinearTable::erase(self, key)
    }

    fn clear(&mut self) {
        LinearTable::clear(self)
    }

    fn size(&self) -> usize {
        self.len()
    }

    fn memory_use(&self) -> usize {
        LinearTable::memory_use(self)
    }

    fn prefetch(&self, key: &K) -> usize {
        LinearTable::prefetch(self, key)
    }

    fn capacity(&self) -> usize {
        LinearTable::capacity(self)
    }
}
