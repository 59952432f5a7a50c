use core::fmt;
use core::fmt::Debug;

use crate::config::DEFAULT_CAPACITY;
use crate::config::LoadFactor;
use crate::error::TableError;
use crate::key::TableKey;
use crate::linear::DebugSlots;
use crate::probe::ProbeSeq;
use crate::probe::TriangularProbe;
use crate::slot::Capacity;
use crate::slot::Claim;
use crate::slot::Meta;
use crate::slot::Slots;
use crate::slot::alloc_failed;
use crate::table::Table;

/// Smallest slot count the table will use. Triangular probing only covers
/// every slot when the count is a power of two, and very small tables make
/// the growth arithmetic degenerate.
const MIN_CAPACITY: usize = 16;

/// An open-addressed table whose i-th probe step advances `i` slots.
///
/// Collisions fan out across the table instead of piling up behind the home
/// slot, at the cost of a new cache line on most steps. Deletion uses
/// tombstones exactly like [`LinearTable`](crate::LinearTable), and the
/// table doubles once live keys plus tombstones reach the configured
/// [`LoadFactor`].
///
/// ```rust
/// use crash_hash::LoadFactor;
/// use crash_hash::MixedKey;
/// use crash_hash::QuadraticTable;
///
/// let mut table = QuadraticTable::with_load_factor(16, LoadFactor::NINETY);
/// for k in 0..14 {
///     table.put(MixedKey(k), k).unwrap();
/// }
/// assert_eq!(table.capacity(), 16);
/// table.put(MixedKey(14), 14).unwrap();
/// assert_eq!(table.capacity(), 32);
/// ```
pub struct QuadraticTable<K, V> {
    slots: Slots<K, V, Meta>,
    size: usize,
    effective_size: usize,
    load_factor: LoadFactor,
}

impl<K: TableKey, V: Copy + Default> QuadraticTable<K, V> {
    /// Creates a table with [`DEFAULT_CAPACITY`] slots and
    /// [`LoadFactor::DEFAULT`].
    pub fn new() -> Self {
        Self::with_load_factor(DEFAULT_CAPACITY, LoadFactor::DEFAULT)
    }

    /// Creates a table with at least `capacity` slots (a power of two, 16 or
    /// more) that grows at `load_factor`.
    pub fn with_load_factor(capacity: usize, load_factor: LoadFactor) -> Self {
        match Self::try_with_load_factor(capacity, load_factor) {
            Ok(table) => table,
            Err(_) => alloc_failed::<(K, V)>(capacity),
        }
    }

    /// Fallible [`with_load_factor`](Self::with_load_factor).
    pub fn try_with_load_factor(
        capacity: usize,
        load_factor: LoadFactor,
    ) -> Result<Self, TableError> {
        Self::with_slots(Capacity::at_least(capacity, MIN_CAPACITY)?, load_factor)
    }

    fn with_slots(capacity: Capacity, load_factor: LoadFactor) -> Result<Self, TableError> {
        Ok(QuadraticTable {
            slots: Slots::try_new(capacity, Meta::Empty)?,
            size: 0,
            effective_size: 0,
            load_factor,
        })
    }

    /// Returns the value stored for `key`.
    #[inline]
    pub fn get(&self, key: &K) -> Option<V> {
        self.slots
            .search::<TriangularProbe>(key)
            .ok()
            .map(|index| self.slots.values[index])
    }

    /// Returns the value in the slot where the probe for `key` stops. Only
    /// meaningful when `key` is present.
    #[inline]
    pub fn find(&self, key: &K) -> V {
        let (Ok(index) | Err(index)) = self.slots.search::<TriangularProbe>(key);
        self.slots.values[index]
    }

    /// Inserts or overwrites `key`.
    ///
    /// When a new key would bring live keys plus tombstones to the load
    /// factor, the table is rebuilt first at the smallest doubling that keeps
    /// the live keys under it, and the key goes straight into the rebuilt
    /// table. A failed rebuild leaves the table unchanged.
    pub fn put(&mut self, key: K, value: V) -> Result<(), TableError> {
        match self.slots.claim::<TriangularProbe>(&key) {
            Claim::Existing(index) => {
                self.slots.values[index] = value;
                return Ok(());
            }
            Claim::Vacant {
                index,
                reuses_tombstone,
            } if reuses_tombstone
                || !self
                    .load_factor
                    .reached(self.effective_size + 1, self.capacity()) =>
            {
                self.slots.keys[index] = key;
                self.slots.values[index] = value;
                self.slots.state[index] = Meta::Occupied;
                if !reuses_tombstone {
                    self.effective_size += 1;
                }
            }
            Claim::Vacant { .. } | Claim::Full => {
                let target = self
                    .slots
                    .capacity()
                    .grown_for(self.size + 1, self.load_factor)?;
                self.grow_to(target)?;
                self.slots.insert_fresh::<TriangularProbe>(key, value);
                self.effective_size += 1;
            }
        }
        self.size += 1;
        Ok(())
    }

    /// Removes `key`, leaving a tombstone. Returns whether it was present.
    pub fn erase(&mut self, key: &K) -> bool {
        let Ok(index) = self.slots.search::<TriangularProbe>(key) else {
            return false;
        };
        self.slots.state[index] = Meta::Tombstone;
        self.size -= 1;
        true
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

    /// The growth threshold this table was built with.
    pub fn load_factor(&self) -> LoadFactor {
        self.load_factor
    }

    /// Bytes held by the backing arrays.
    pub fn memory_use(&self) -> usize {
        self.slots.memory_use()
    }

    /// Home slot of `key`, after hinting it into cache.
    pub fn prefetch(&self, key: &K) -> usize {
        let index = TriangularProbe::start(key.table_hash(), self.slots.mask()).pos();
        self.slots.prefetch(index);
        index
    }

    /// Live `(key, value)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (K, V)> + '_ {
        self.slots.live().map(|(_, key, value)| (key, value))
    }

    #[cold]
    fn grow_to(&mut self, capacity: Capacity) -> Result<(), TableError> {
        let mut replacement = Self::with_slots(capacity, self.load_factor)?;
        for (_, key, value) in self.slots.live() {
            replacement
                .slots
                .insert_fresh::<TriangularProbe>(key, value);
        }
        replacement.size = self.size;
        replacement.effective_size = self.size;

        #[cfg(feature = "logging")]
        log::debug!(
            "quadratic table ({}%) grew from {} to {} slots ({} live, {} tombstones dropped)",
            self.load_factor.percent(),
            self.capacity(),
            replacement.capacity(),
            self.size,
            self.tombstones()
        );

        *self = replacement;
        Ok(())
    }

    /// Probe-length histogram of the live keys.
    #[cfg(feature = "stats")]
    pub fn probe_histogram(&self) -> crate::stats::ProbeHistogram {
        crate::stats::ProbeHistogram::collect::<K, TriangularProbe, _>(
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

impl<K: TableKey, V: Copy + Default> Default for QuadraticTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: TableKey + Debug, V: Copy + Default + Debug> Debug for QuadraticTable<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuadraticTable")
            .field("size", &self.size)
            .field("tombstones", &self.tombstones())
            .field("capacity", &self.capacity())
            .field("load_factor", &self.load_factor.percent())
            .field(
                "slots",
                &DebugSlots {
                    slots: &self.slots,
                },
            )
            .finish()
    }
}

impl<K: TableKey, V: Copy + Default> Table<K, V> for QuadraticTable<K, V> {
    fn get(&self, key: &K) -> Option<V> {
        QuadraticTable::get(self, key)
    }

    fn find(&self, key: &K) -> V {
        QuadraticTable::find(self, key)
    }

    fn put(&mut self, key: K, value: V) -> Result<(), TableError> {
        QuadraticTable::put(self, key, value)
    }

    fn erase(&mut self, key: &K) -> bool {
        QuadraticTable::erase(self, key)
    }

    fn clear(&mut self) {
        QuadraticTable::clear(self)
    }

    fn size(&self) -> usize {
        self.len()
    }

    fn memory_use(&self) -> usize {
        QuadraticTable::memory_use(self)
    }

    fn prefetch(&self, key: &K) -> usize {
        QuadraticTable::prefetch(self, key)
    }

    fn capacity(&self) -> usize {
        QuadraticTable::capacity(self)
    }
}
