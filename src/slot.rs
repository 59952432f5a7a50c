use alloc::alloc::handle_alloc_error;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::alloc::Layout;

use crate::config::LoadFactor;
use crate::error::TableError;
use crate::key::TableKey;
use crate::probe::ProbeSeq;

#[inline(always)]
pub(crate) fn prefetch<T>(ptr: *const T) {
    #[cfg(all(target_arch = "x86_64", target_feature = "sse2"))]
    // SAFETY: `_mm_prefetch` is a hint; it never faults, even on an invalid
    // address, and has no effect on program semantics.
    unsafe {
        use core::arch::x86_64::*;
        _mm_prefetch(ptr as *const i8, _MM_HINT_T0);
    }

    #[cfg(not(all(target_arch = "x86_64", target_feature = "sse2")))]
    let _ = ptr;
}

/// Per-slot state for the tombstone-based engines.
///
/// The three states are the reachable combinations of the `occupied` and
/// `tombstone` flags; `occupied && tombstone` never happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Meta {
    Empty = 0,
    Occupied = 1,
    /// Deleted, but still part of every probe chain that passed through it.
    Tombstone = 2,
}

impl Meta {
    /// Empty slots end a probe. Tombstones do not.
    #[inline(always)]
    pub(crate) fn ends_probe(self) -> bool {
        self == Meta::Empty
    }
}

/// A slot count that is always a power of two, so probes can mask instead of
/// dividing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Capacity {
    slots: usize,
}

impl Capacity {
    /// Rounds `requested` up to a power of two no smaller than `min`.
    #[inline]
    pub(crate) fn at_least(requested: usize, min: usize) -> Result<Self, TableError> {
        requested
            .max(min)
            .max(1)
            .checked_next_power_of_two()
            .map(|slots| Capacity { slots })
            .ok_or(TableError::AllocFailed {
                capacity: requested,
            })
    }

    #[inline(always)]
    pub(crate) fn slots(self) -> usize {
        self.slots
    }

    #[inline(always)]
    pub(crate) fn mask(self) -> usize {
        self.slots - 1
    }

    #[inline]
    pub(crate) fn doubled(self) -> Result<Self, TableError> {
        self.slots
            .checked_mul(2)
            .map(|slots| Capacity { slots })
            .ok_or(TableError::AllocFailed {
                capacity: usize::MAX,
            })
    }

    /// Smallest doubling of `self` under which `count` entries stay below
    /// `load_factor`.
    pub(crate) fn grown_for(
        self,
        count: usize,
        load_factor: LoadFactor,
    ) -> Result<Self, TableError> {
        let mut target = self.doubled()?;
        while load_factor.reached(count, target.slots) {
            target = target.doubled()?;
        }
        Ok(target)
    }
}

/// Allocates `len` copies of `value`, reporting failure instead of aborting.
pub(crate) fn try_filled<T: Clone>(len: usize, value: T) -> Result<Box<[T]>, TableError> {
    let mut storage = Vec::new();
    storage
        .try_reserve_exact(len)
        .map_err(|_| TableError::AllocFailed { capacity: len })?;
    storage.resize(len, value);
    Ok(storage.into_boxed_slice())
}

/// Aborts the way the global allocator would for an array of `slots` `T`s.
#[cold]
pub(crate) fn alloc_failed<T>(slots: usize) -> ! {
    handle_alloc_error(Layout::array::<T>(slots).unwrap_or_else(|_| Layout::new::<T>()))
}

/// Parallel key, value and state arrays of one power-of-two capacity.
///
/// Keeping the three apart means a probe that only inspects state touches
/// one dense byte array.
pub(crate) struct Slots<K, V, S> {
    pub(crate) keys: Box<[K]>,
    pub(crate) values: Box<[V]>,
    pub(crate) state: Box<[S]>,
    capacity: Capacity,
}

impl<K, V, S> Slots<K, V, S>
where
    K: Copy + Default,
    V: Copy + Default,
    S: Copy,
{
    /// Allocates all three arrays, or none of them.
    pub(crate) fn try_new(capacity: Capacity, empty: S) -> Result<Self, TableError> {
        Ok(Slots {
            keys: try_filled(capacity.slots(), K::default())?,
            values: try_filled(capacity.slots(), V::default())?,
            state: try_filled(capacity.slots(), empty)?,
            capacity,
        })
    }

    #[inline(always)]
    pub(crate) fn capacity(&self) -> Capacity {
        self.capacity
    }

    #[inline(always)]
    pub(crate) fn mask(&self) -> usize {
        self.capacity.mask()
    }

    /// Marks every slot `empty` in place. Keys and values are left as they
    /// are; no state reads them until a slot is written again.
    pub(crate) fn reset(&mut self, empty: S) {
        self.state.fill(empty);
    }

    /// Bytes held by the three arrays plus the table's bookkeeping words.
    pub(crate) fn memory_use(&self) -> usize {
        let slots = self.capacity.slots();
        slots * (size_of::<K>() + size_of::<V>() + size_of::<S>()) + size_of::<usize>() * 3
    }

    #[inline(always)]
    pub(crate) fn prefetch(&self, index: usize) {
        prefetch(self.state.as_ptr().wrapping_add(index));
        prefetch(self.keys.as_ptr().wrapping_add(index));
    }
}

/// Where a new key would go in a tombstone table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Claim {
    /// The key is live at this index.
    Existing(usize),
    /// The key is absent. `index` is the first tombstone on its probe path,
    /// or the empty slot that ended the probe when there was none.
    Vacant { index: usize, reuses_tombstone: bool },
    /// Every slot was walked without meeting the key or an empty slot, and
    /// no tombstone was seen.
    Full,
}

impl<K, V> Slots<K, V, Meta>
where
    K: TableKey,
    V: Copy + Default,
{
    /// Walks `P` from `key`'s home slot.
    ///
    /// Returns `Ok(index)` on a live match, or `Err(index)` holding the slot
    /// that ended the walk.
    #[inline]
    pub(crate) fn search<P: ProbeSeq>(&self, key: &K) -> Result<usize, usize> {
        let mut probe = P::start(key.table_hash(), self.mask());
        for _ in 0..self.capacity.slots() {
            let index = probe.pos();
            match self.state[index] {
                Meta::Empty => return Err(index),
                Meta::Occupied if self.keys[index] == *key => return Ok(index),
                _ => probe.advance(),
            }
        }
        Err(probe.pos())
    }

    /// Like [`search`](Self::search), but also remembers the first tombstone
    /// so that an insert can recycle it.
    #[inline]
    pub(crate) fn claim<P: ProbeSeq>(&self, key: &K) -> Claim {
        let mut probe = P::start(key.table_hash(), self.mask());
        let mut first_tombstone = None;
        for _ in 0..self.capacity.slots() {
            let index = probe.pos();
            match self.state[index] {
                Meta::Empty => {
                    return match first_tombstone {
                        Some(index) => Claim::Vacant {
                            index,
                            reuses_tombstone: true,
                        },
                        None => Claim::Vacant {
                            index,
                            reuses_tombstone: false,
                        },
                    };
                }
                Meta::Occupied if self.keys[index] == *key => return Claim::Existing(index),
                Meta::Tombstone if first_tombstone.is_none() => first_tombstone = Some(index),
                _ => {}
            }
            probe.advance();
        }

        match first_tombstone {
            Some(index) => Claim::Vacant {
                index,
                reuses_tombstone: true,
            },
            None => Claim::Full,
        }
    }

    /// Writes a key known to be absent into a table with no tombstones, as
    /// during a growth rebuild.
    #[inline]
    pub(crate) fn insert_fresh<P: ProbeSeq>(&mut self, key: K, value: V) {
        let mut probe = P::start(key.table_hash(), self.mask());
        while !self.state[probe.pos()].ends_probe() {
            probe.advance();
        }
        let index = probe.pos();
        self.keys[index] = key;
        self.values[index] = value;
        self.state[index] = Meta::Occupied;
    }

    /// Live entries in slot order.
    pub(crate) fn live(&self) -> impl Iterator<Item = (usize, K, V)> + '_ {
        self.state
            .iter()
            .enumerate()
            .filter(|(_, meta)| **meta == Meta::Occupied)
            .map(|(index, _)| (index, self.keys[index], self.values[index]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::IdentityKey;
    use crate::probe::LinearProbe;

    #[test]
    fn capacity_rounds_up() {
        assert_eq!(Capacity::at_least(0, 1).unwrap().slots(), 1);
        assert_eq!(Capacity::at_least(5, 1).unwrap().slots(), 8);
        assert_eq!(Capacity::at_least(16, 1).unwrap().slots(), 16);
        assert_eq!(Capacity::at_least(3, 16).unwrap().slots(), 16);
        assert_eq!(Capacity::at_least(17, 16).unwrap().mask(), 31);
        assert_eq!(Capacity::at_least(8, 1).unwrap().doubled().unwrap().slots(), 16);
    }

    #[test]
    fn oversized_request_is_an_error() {
        assert_eq!(
            Capacity::at_least(usize::MAX, 1),
            Err(TableError::AllocFailed {
                capacity: usize::MAX
            })
        );
    }

    #[test]
    fn growth_target_keeps_count_under_load_factor() {
        let sixteen = Capacity::at_least(16, 1).unwrap();
        assert_eq!(sixteen.grown_for(9, LoadFactor::FIFTY).unwrap().slots(), 32);
        // 1%: 3 entries need more than 300 slots.
        let one = LoadFactor::new(1).unwrap();
        assert_eq!(sixteen.grown_for(3, one).unwrap().slots(), 512);
        let single = Capacity::at_least(1, 1).unwrap();
        assert_eq!(single.grown_for(1, LoadFactor::FIFTY).unwrap().slots(), 4);
    }

    #[test]
    fn doubling_overflow_is_reported() {
        let huge = Capacity {
            slots: 1 << (usize::BITS - 1),
        };
        assert!(huge.doubled().is_err());
    }

    #[test]
    fn slots_start_empty_and_reset() {
        let mut slots: Slots<u64, u32, Meta> =
            Slots::try_new(Capacity::at_least(4, 1).unwrap(), Meta::Empty).unwrap();
        assert!(slots.state.iter().all(|m| *m == Meta::Empty));
        slots.state[2] = Meta::Occupied;
        slots.reset(Meta::Empty);
        assert!(slots.state.iter().all(|m| m.ends_probe()));
        assert_eq!(slots.memory_use(), 4 * (8 + 4 + 1) + size_of::<usize>() * 3);
    }

    #[test]
    fn claim_prefers_first_tombstone() {
        let mut slots: Slots<IdentityKey, u64, Meta> =
            Slots::try_new(Capacity::at_least(8, 1).unwrap(), Meta::Empty).unwrap();
        // Home slot 2: [2] live other key, [3] tombstone, [4] live target.
        slots.state[2] = Meta::Occupied;
        slots.keys[2] = IdentityKey(10);
        slots.state[3] = Meta::Tombstone;
        slots.keys[3] = IdentityKey(2);
        slots.state[4] = Meta::Occupied;
        slots.keys[4] = IdentityKey(18);
        slots.values[4] = 7;

        assert_eq!(
            slots.claim::<LinearProbe>(&IdentityKey(18)),
            Claim::Existing(4)
        );
        assert_eq!(slots.search::<LinearProbe>(&IdentityKey(18)), Ok(4));

        // The stale key in the tombstone must not count as a hit.
        assert_eq!(slots.search::<LinearProbe>(&IdentityKey(2)), Err(5));
        assert_eq!(
            slots.claim::<LinearProbe>(&IdentityKey(2)),
            Claim::Vacant {
                index: 3,
                reuses_tombstone: true
            }
        );
        assert_eq!(
            slots.claim::<LinearProbe>(&IdentityKey(5)),
            Claim::Vacant {
                index: 5,
                reuses_tombstone: false
            }
        );
    }

    #[test]
    fn claim_on_saturated_slots() {
        let mut slots: Slots<IdentityKey, u64, Meta> =
            Slots::try_new(Capacity::at_least(4, 1).unwrap(), Meta::Empty).unwrap();
        for i in 0..4 {
            slots.state[i] = Meta::Occupied;
            slots.keys[i] = IdentityKey(i as u64 + 100);
        }
        assert_eq!(slots.claim::<LinearProbe>(&IdentityKey(1)), Claim::Full);
        assert!(slots.search::<LinearProbe>(&IdentityKey(1)).is_err());

        slots.state[3] = Meta::Tombstone;
        assert_eq!(
            slots.claim::<LinearProbe>(&IdentityKey(1)),
            Claim::Vacant {
                index: 3,
                reuses_tombstone: true
            }
        );
    }

    #[test]
    fn absurd_allocation_fails_cleanly() {
        let result = try_filled::<u64>(usize::MAX / 2, 0);
        assert_eq!(
            result.err(),
            Some(TableError::AllocFailed {
                capacity: usize::MAX / 2
            })
        );
    }
}
