use core::fmt;
use core::fmt::Debug;

use crate::config::DEFAULT_CAPACITY;
use crate::config::LoadFactor;
use crate::error::TableError;
use crate::key::TableKey;
use crate::probe::displacement;
use crate::probe::home;
use crate::slot::Capacity;
use crate::slot::Slots;
use crate::slot::alloc_failed;
use crate::table::Table;

/// A linear-probing table that keeps displacements non-decreasing along
/// every probe chain.
///
/// An incoming entry evicts any occupant that sits closer to its own home
/// slot, and the evicted entry carries on probing. This caps the variance of
/// probe lengths and gives lookups an early exit: once the walk has gone
/// further than the occupant under it, the key cannot be further along.
/// Deletion pulls the rest of the chain back one slot instead of leaving a
/// tombstone.
///
/// ```rust
/// use crash_hash::FixedStr;
/// use crash_hash::RobinHoodTable;
///
/// let mut table: RobinHoodTable<FixedStr<16>, u32> = RobinHoodTable::new();
/// table.put(FixedStr::new("ant"), 1).unwrap();
/// table.put(FixedStr::new("bee"), 2).unwrap();
/// assert!(table.erase(&FixedStr::new("ant")));
/// assert_eq!(table.get(&FixedStr::new("bee")), Some(2));
/// assert_eq!(table.get(&FixedStr::new("ant")), None);
/// ```
pub struct RobinHoodTable<K, V> {
    slots: Slots<K, V, bool>,
    size: usize,
    load_factor: LoadFactor,
}

impl<K: TableKey, V: Copy + Default> RobinHoodTable<K, V> {
    /// Creates a table with [`DEFAULT_CAPACITY`] slots and
    /// [`LoadFactor::DEFAULT`].
    pub fn new() -> Self {
        Self::with_load_factor(DEFAULT_CAPACITY, LoadFactor::DEFAULT)
    }

    /// Creates a table with at least `capacity` slots, rounded up to a power
    /// of two, that grows at `load_factor`.
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
        Self::with_slots(Capacity::at_least(capacity, 1)?, load_factor)
    }

    fn with_slots(capacity: Capacity, load_factor: LoadFactor) -> Result<Self, TableError> {
        Ok(RobinHoodTable {
            slots: Slots::try_new(capacity, false)?,
            size: 0,
            load_factor,
        })
    }

    #[inline(always)]
    fn home_of(&self, key: &K) -> usize {
        home(key.table_hash(), self.slots.mask())
    }

    /// Displacement of the entry living at `index`.
    #[inline(always)]
    fn displacement_at(&self, index: usize) -> usize {
        displacement(self.home_of(&self.slots.keys[index]), index, self.slots.mask())
    }

    /// `Ok(index)` of `key`, or `Err(index)` of the slot that proved it
    /// absent.
    #[inline]
    fn search(&self, key: &K) -> Result<usize, usize> {
        let mask = self.slots.mask();
        let mut index = self.home_of(key);
        for dist in 0..self.capacity() {
            if !self.slots.state[index] || self.displacement_at(index) < dist {
                return Err(index);
            }
            if self.slots.keys[index] == *key {
                return Ok(index);
            }
            index = (index + 1) & mask;
        }
        Err(index)
    }

    /// Returns the value stored for `key`.
    #[inline]
    pub fn get(&self, key: &K) -> Option<V> {
        self.search(key).ok().map(|index| self.slots.values[index])
    }

    /// Returns the value in the slot where the probe for `key` stops. Only
    /// meaningful when `key` is present.
    #[inline]
    pub fn find(&self, key: &K) -> V {
        let (Ok(index) | Err(index)) = self.search(key);
        self.slots.values[index]
    }

    /// Inserts or overwrites `key`.
    ///
    /// Growth is checked before the insert: a table already holding
    /// `capacity * load_factor` keys is rebuilt first, even if `key` turns out
    /// to be an overwrite. The rebuilt table is the smallest doubling in which
    /// the current keys sit below the load factor, so it always has room.
    pub fn put(&mut self, key: K, value: V) -> Result<(), TableError> {
        if self.load_factor.reached(self.size, self.capacity()) {
            let target = self
                .slots
                .capacity()
                .grown_for(self.size, self.load_factor)?;
            self.grow_to(target)?;
        }
        if self.place(key, value) {
            self.size += 1;
        }
        Ok(())
    }

    /// Robin Hood insertion. Returns `true` if a new entry was added.
    ///
    /// The caller guarantees at least one empty slot.
    fn place(&mut self, mut key: K, mut value: V) -> bool {
        let mask = self.slots.mask();
        let mut index = self.home_of(&key);
        let mut dist = 0;
        // Only the original key can already be present; once an occupant has
        // been evicted the carried entry is known to be unique.
        let mut carrying_original = true;
        loop {
            if !self.slots.state[index] {
                self.slots.keys[index] = key;
                self.slots.values[index] = value;
                self.slots.state[index] = true;
                return true;
            }
            if carrying_original && self.slots.keys[index] == key {
                self.slots.values[index] = value;
                return false;
            }
            let resident = self.displacement_at(index);
            if resident < dist {
                core::mem::swap(&mut key, &mut self.slots.keys[index]);
                core::mem::swap(&mut value, &mut self.slots.values[index]);
                dist = resident;
                carrying_original = false;
            }
            dist += 1;
            index = (index + 1) & mask;
        }
    }

    /// Removes `key` and closes the gap by shifting the rest of its chain
    /// back. Returns whether it was present.
    pub fn erase(&mut self, key: &K) -> bool {
        let Ok(mut hole) = self.search(key) else {
            return false;
        };
        let mask = self.slots.mask();
        self.slots.state[hole] = false;
        self.size -= 1;

        let mut next = (hole + 1) & mask;
        while self.slots.state[next] && self.displacement_at(next) != 0 {
            self.slots.keys[hole] = self.slots.keys[next];
            self.slots.values[hole] = self.slots.values[next];
            self.slots.state[hole] = true;
            self.slots.state[next] = false;
            hole = next;
            next = (next + 1) & mask;
        }
        true
    }

    /// Removes every entry, keeping the capacity.
    pub fn clear(&mut self) {
        self.slots.reset(false);
        self.size = 0;
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns `true` if no key is live.
    pub fn is_empty(&self) -> bool {
        self.size == 0
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
        let index = self.home_of(key);
        self.slots.prefetch(index);
        index
    }

    fn live(&self) -> impl Iterator<Item = (usize, K, V)> + '_ {
        self.slots
            .state
            .iter()
            .enumerate()
            .filter(|(_, occupied)| **occupied)
            .map(|(index, _)| (index, self.slots.keys[index], self.slots.values[index]))
    }

    /// Live `(key, value)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (K, V)> + '_ {
        self.live().map(|(_, key, value)| (key, value))
    }

    #[cold]
    fn grow_to(&mut self, capacity: Capacity) -> Result<(), TableError> {
        let mut replacement = Self::with_slots(capacity, self.load_factor)?;
        for (_, key, value) in self.live() {
            replacement.place(key, value);
        }
        replacement.size = self.size;

        #[cfg(feature = "logging")]
        log::debug!(
            "robin hood table ({}%) grew from {} to {} slots ({} live)",
            self.load_factor.percent(),
            self.capacity(),
            replacement.capacity(),
            self.size
        );

        *self = replacement;
        Ok(())
    }

    /// Probe-length histogram of the live keys. A key's probe length is its
    /// displacement plus one.
    #[cfg(feature = "stats")]
    pub fn probe_histogram(&self) -> crate::stats::ProbeHistogram {
        crate::stats::ProbeHistogram::from_lengths(
            self.live()
                .map(|(index, _, _)| self.displacement_at(index) + 1),
        )
    }

    /// Snapshot of occupancy and memory figures.
    #[cfg(feature = "stats")]
    pub fn debug_stats(&self) -> crate::stats::DebugStats {
        crate::stats::DebugStats::new(
            self.size,
            0,
            self.capacity(),
            self.memory_use(),
            &self.probe_histogram(),
        )
    }
}

impl<K: TableKey, V: Copy + Default> Default for RobinHoodTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: TableKey + Debug, V: Copy + Default + Debug> Debug for RobinHoodTable<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct Entries<'a, K, V>(&'a RobinHoodTable<K, V>);

        impl<K: TableKey + Debug, V: Copy + Default + Debug> Debug for Entries<'_, K, V> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut map = f.debug_map();
                for (index, key, value) in self.0.live() {
                    map.key(&index)
                        .value(&(key, value, self.0.displacement_at(index)));
                }
                map.finish()
            }
        }

        f.debug_struct("RobinHoodTable")
            .field("size", &self.size)
            .field("capacity", &self.capacity())
            .field("load_factor", &self.load_factor.percent())
            .field("slots", &Entries(self))
            .finish()
    }
}

impl<K: TableKey, V: Copy + Default> Table<K, V> for RobinHoodTable<K, V> {
    fn get(&self, key: &K) -> Option<V> {
        RobinHoodTable::get(self, key)
    }

    fn find(&self, key: &K) -> V {
        RobinHoodTable::find(self, key)
    }

    fn put(&mut self, key: K, value: V) -> Result<(), TableError> {
        RobinHoodTable::put(self, key, value)
    }

    fn erase(&mut self, key: &K) -> bool {
        RobinHoodTable::erase(self, key)
    }

    fn clear(&mut self) {
        RobinHoodTable::clear(self)
    }

    fn size(&self) -> usize {
        self.len()
    }

    fn memory_use(&self) -> usize {
        RobinHoodTable::memory_use(self)
    }

    fn prefetch(&self, key: &K) -> usize {
        RobinHoodTable::prefetch(self, key)
    }

    fn capacity(&self) -> usize {
        RobinHoodTable::capacity(self)
    }
}
