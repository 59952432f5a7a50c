//! Construction-time knobs shared by the table engines.

use crate::error::TableError;

/// Capacity used by the `new` constructors.
pub const DEFAULT_CAPACITY: usize = 16;

cfg_if::cfg_if! {
    if #[cfg(feature = "density-ninety")] {
        const DEFAULT_PERCENT: u8 = 90;
    } else if #[cfg(feature = "density-fifty")] {
        const DEFAULT_PERCENT: u8 = 50;
    } else {
        const DEFAULT_PERCENT: u8 = 70;
    }
}

/// Occupancy ratio, in whole percent, at which a table grows.
///
/// Valid values are `1..=99`. A table at 100% would have no empty slot left
/// to terminate a probe for an absent key.
///
/// ```rust
/// use crash_hash::LoadFactor;
///
/// let lf = LoadFactor::new(90).unwrap();
/// assert_eq!(lf.percent(), 90);
/// assert!(LoadFactor::new(100).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadFactor(u8);

impl LoadFactor {
    /// 50%.
    pub const FIFTY: LoadFactor = LoadFactor(50);
    /// 70%.
    pub const SEVENTY: LoadFactor = LoadFactor(70);
    /// 90%.
    pub const NINETY: LoadFactor = LoadFactor(90);
    /// Picked at compile time by the `density-*` features; 70% when none is
    /// enabled.
    pub const DEFAULT: LoadFactor = LoadFactor(DEFAULT_PERCENT);

    /// Validates `percent` and wraps it.
    pub const fn new(percent: u8) -> Result<Self, TableError> {
        if percent == 0 || percent > 99 {
            return Err(TableError::InvalidLoadFactor(percent));
        }
        Ok(LoadFactor(percent))
    }

    /// The load factor in whole percent.
    pub const fn percent(self) -> u8 {
        self.0
    }

    /// Whether `count` filled slots reach the threshold for `capacity`.
    ///
    /// Mirrors `count >= capacity * percent / 100` without going through
    /// floating point.
    #[inline(always)]
    pub(crate) fn reached(self, count: usize, capacity: usize) -> bool {
        (count as u128) * 100 >= (capacity as u128) * self.0 as u128
    }
}

impl Default for LoadFactor {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for LoadFactor {
    type Error = TableError;

    fn try_from(percent: u8) -> Result<Self, Self::Error> {
        LoadFactor::new(percent)
    }
}
