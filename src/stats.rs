use alloc::vec::Vec;

use crate::key::TableKey;
use crate::probe::ProbeSeq;

/// Counts of live keys by probe length.
///
/// A key found in its home slot has probe length 1; each further slot the
/// lookup has to inspect adds one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeHistogram {
    /// `counts[i]` is the number of keys with probe length `i + 1`.
    counts: Vec<usize>,
    entries: usize,
}

impl ProbeHistogram {
    /// Builds a histogram from raw probe lengths. Lengths of zero are
    /// counted as one.
    pub fn from_lengths<I: IntoIterator<Item = usize>>(lengths: I) -> Self {
        let mut histogram = ProbeHistogram::default();
        for len in lengths {
            let bin = len.max(1) - 1;
            if bin >= histogram.counts.len() {
                histogram.counts.resize(bin + 1, 0);
            }
            histogram.counts[bin] += 1;
            histogram.entries += 1;
        }
        histogram
    }

    /// Replays `P` from each key's home slot until it reaches the index the
    /// key lives at.
    pub(crate) fn collect<K, P, I>(live: I, mask: usize) -> Self
    where
        K: TableKey,
        P: ProbeSeq,
        I: IntoIterator<Item = (usize, K)>,
    {
        Self::from_lengths(live.into_iter().map(|(index, key)| {
            let mut probe = P::start(key.table_hash(), mask);
            let mut len = 1;
            while probe.pos() != index && len <= mask + 1 {
                probe.advance();
                len += 1;
            }
            len
        }))
    }

    /// Per-length counts, starting at probe length 1.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Number of keys counted.
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Longest probe length seen, or 0 when empty.
    pub fn max_probe(&self) -> usize {
        self.counts.len()
    }

    /// Average probe length, or 0 when empty.
    pub fn mean_probe(&self) -> f64 {
        if self.entries == 0 {
            return 0.0;
        }
        let total: usize = self
            .counts
            .iter()
            .enumerate()
            .map(|(bin, count)| (bin + 1) * count)
            .sum();
        total as f64 / self.entries as f64
    }

    /// Pretty-prints the histogram as a horizontal bar chart on stdout.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        let max = self.counts.iter().copied().max().unwrap_or(0);
        if max == 0 {
            println!("probe histogram: empty");
            return;
        }

        let max_bar = 60usize;
        let total_units = max_bar * 8;
        println!("probe histogram ({} entries):", self.entries);

        let make_bar = |count: usize| -> alloc::string::String {
            if count == 0 {
                return alloc::string::String::new();
            }
            let units = ((count as u128 * total_units as u128).div_ceil(max as u128)) as usize;
            let mut bar = "█".repeat(units / 8);
            let partial = match units % 8 {
                0 => None,
                1 => Some('▏'),
                2 => Some('▎'),
                3 => Some('▍'),
                4 => Some('▌'),
                5 => Some('▋'),
                6 => Some('▊'),
                _ => Some('▉'),
            };
            bar.extend(partial);
            bar
        };

        for (bin, &count) in self.counts.iter().enumerate() {
            println!("{:>3} | {} ({})", bin + 1, make_bar(count), count);
        }
    }
}

/// Occupancy and memory snapshot of a single-threaded table.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugStats {
    /// Live keys.
    pub populated: usize,
    /// Tombstoned slots. Always 0 for Robin Hood tables.
    pub tombstones: usize,
    /// Allocated slots.
    pub capacity: usize,
    /// `populated / capacity`.
    pub load_factor: f64,
    /// `(populated + tombstones) / capacity`, the figure growth is keyed on.
    pub effective_load: f64,
    /// Bytes held by the backing arrays.
    pub total_bytes: usize,
    /// Bytes held by slots that store no live key.
    pub wasted_bytes: usize,
    /// Average probe length of the live keys.
    pub mean_probe: f64,
    /// Longest probe length of the live keys.
    pub max_probe: usize,
}

impl DebugStats {
    pub(crate) fn new(
        populated: usize,
        tombstones: usize,
        capacity: usize,
        total_bytes: usize,
        histogram: &ProbeHistogram,
    ) -> Self {
        let ratio = |n: usize| {
            if capacity == 0 {
                0.0
            } else {
                n as f64 / capacity as f64
            }
        };
        let per_slot = total_bytes.checked_div(capacity).unwrap_or(0);
        DebugStats {
            populated,
            tombstones,
            capacity,
            load_factor: ratio(populated),
            effective_load: ratio(populated + tombstones),
            total_bytes,
            wasted_bytes: (capacity - populated) * per_slot,
            mean_probe: histogram.mean_probe(),
            max_probe: histogram.max_probe(),
        }
    }

    /// Pretty-print the statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Debug Statistics ===");
        println!(
            "Population: {}/{} ({:.2}% load factor)",
            self.populated,
            self.capacity,
            self.load_factor * 100.0
        );
        println!(
            "Tombstones: {} ({:.2}% effective load)",
            self.tombstones,
            self.effective_load * 100.0
        );
        println!(
            "Probe length: {:.3} mean, {} max",
            self.mean_probe, self.max_probe
        );
        println!("Total Allocated: {} bytes", self.total_bytes);
        println!(
            "Memory: {} bytes wasted ({:.02}%)",
            self.wasted_bytes,
            if self.total_bytes == 0 {
                0.0
            } else {
                (self.wasted_bytes as f64 / self.total_bytes as f64) * 100.0
            }
        );
    }
}
