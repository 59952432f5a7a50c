//! Key types accepted by the tables.
//!
//! Every table hashes a key exactly once per operation through
//! [`TableKey::table_hash`] and compares candidates with `==`. Keys are
//! `Copy` so that slots can be moved during growth and Robin Hood swaps
//! without any drop bookkeeping, and `Default` so that backing arrays can
//! be filled up front.

use core::fmt;
use core::fmt::Debug;
use core::fmt::Display;

/// A fixed-size, hashable, comparable key.
pub trait TableKey: Copy + Eq + Default {
    /// A deterministic hash of the key. Only the low bits are used to pick
    /// the home slot, so weak hashes (see [`IdentityKey`]) cluster.
    fn table_hash(&self) -> u64;
}

/// A nul-padded string of at most `N - 1` bytes, hashed with djb2.
///
/// The last byte is always zero, so the hash loop stops at the first nul
/// the same way it would on a C string.
///
/// ```rust
/// use crash_hash::FixedStr;
///
/// let key: FixedStr<32> = FixedStr::new("hello");
/// assert_eq!(key.as_bytes(), b"hello");
/// assert_eq!(key, FixedStr::new("hello"));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FixedStr<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> FixedStr<N> {
    /// Builds a key from `s`, truncated to `N - 1` bytes.
    pub fn new(s: &str) -> Self {
        Self::from_bytes(s.as_bytes())
    }

    /// Builds a key from raw bytes, truncated to `N - 1` bytes and cut at
    /// the first nul.
    pub fn from_bytes(src: &[u8]) -> Self {
        let mut bytes = [0u8; N];
        let len = src
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(src.len())
            .min(N.saturating_sub(1));
        bytes[..len].copy_from_slice(&src[..len]);
        Self { bytes }
    }

    /// The stored bytes up to (not including) the first nul.
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.bytes.iter().position(|&b| b == 0).unwrap_or(N);
        &self.bytes[..len]
    }
}

impl<const N: usize> Default for FixedStr<N> {
    fn default() -> Self {
        Self { bytes: [0u8; N] }
    }
}

impl<const N: usize> TableKey for FixedStr<N> {
    #[inline]
    fn table_hash(&self) -> u64 {
        djb2(self.as_bytes())
    }
}

impl<const N: usize> Debug for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.as_bytes().escape_ascii())
    }
}

impl<const N: usize> Display for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_bytes().escape_ascii())
    }
}

/// `hash * 33 + c`, seeded with 5381.
#[inline]
pub fn djb2(bytes: &[u8]) -> u64 {
    bytes.iter().fold(5381u64, |hash, &c| {
        (hash << 5).wrapping_add(hash).wrapping_add(c as u64)
    })
}

/// The 64-bit finalizer from MurmurHash3.
#[inline]
pub fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

/// A 64-bit integer key that hashes to itself.
///
/// Useful for placing keys in exact slots in tests and for measuring how a
/// table copes with clustered input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdentityKey(pub u64);

impl TableKey for IdentityKey {
    #[inline(always)]
    fn table_hash(&self) -> u64 {
        self.0
    }
}

/// A 64-bit integer key hashed with the [`fmix64`] bit mixer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MixedKey(pub u64);

impl TableKey for MixedKey {
    #[inline(always)]
    fn table_hash(&self) -> u64 {
        fmix64(self.0)
    }
}

/// A 64-bit integer key hashed with foldhash under a fixed seed.
#[cfg(feature = "foldhash")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FoldKey(pub u64);

#[cfg(feature = "foldhash")]
impl TableKey for FoldKey {
    #[inline]
    fn table_hash(&self) -> u64 {
        use core::hash::BuildHasher;

        foldhash::fast::FixedState::default().hash_one(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn djb2_known_values() {
        assert_eq!(djb2(b""), 5381);
        assert_eq!(djb2(b"a"), 5381 * 33 + 97);
        assert_eq!(
            FixedStr::<32>::new("ab").table_hash(),
            (5381u64 * 33 + 97) * 33 + 98
        );
    }

    #[test]
    fn fixed_str_truncates_and_stops_at_nul() {
        let long: FixedStr<4> = FixedStr::new("abcdef");
        assert_eq!(long.as_bytes(), b"abc");

        let nul: FixedStr<8> = FixedStr::from_bytes(b"ab\0cd");
        assert_eq!(nul.as_bytes(), b"ab");
        assert_eq!(nul, FixedStr::new("ab"));
        assert_eq!(nul.table_hash(), FixedStr::<8>::new("ab").table_hash());
    }

    #[test]
    fn integer_hashes() {
        assert_eq!(IdentityKey(42).table_hash(), 42);
        assert_eq!(MixedKey(0).table_hash(), 0);
        assert_ne!(MixedKey(1).table_hash(), 1);
        assert_ne!(MixedKey(1).table_hash(), MixedKey(2).table_hash());
    }

    #[cfg(feature = "foldhash")]
    #[test]
    fn fold_key_is_deterministic() {
        assert_eq!(FoldKey(7).table_hash(), FoldKey(7).table_hash());
        assert_ne!(FoldKey(7).table_hash(), FoldKey(8).table_hash());
    }
}
