//! Probe sequences over a power-of-two slot array.
//!
//! A sequence starts at `hash & mask` and is advanced one step at a time by
//! the engine that owns it. Sequences never terminate on their own; callers
//! bound the walk by the table capacity.

/// A walk over candidate slot indices.
pub(crate) trait ProbeSeq {
    /// Starts the sequence at the home slot for `hash`.
    fn start(hash: u64, mask: usize) -> Self;

    /// The slot the sequence currently points at.
    fn pos(&self) -> usize;

    /// Moves to the next candidate slot.
    fn advance(&mut self);
}

#[inline(always)]
pub(crate) fn home(hash: u64, mask: usize) -> usize {
    hash as usize & mask
}

/// Distance, in linear steps, from `home` forward to `pos`, wrapping.
#[inline(always)]
pub(crate) fn displacement(home: usize, pos: usize, mask: usize) -> usize {
    pos.wrapping_sub(home) & mask
}

/// `h, h+1, h+2, ...`
#[derive(Debug, Clone, Copy)]
pub(crate) struct LinearProbe {
    pos: usize,
    mask: usize,
}

impl ProbeSeq for LinearProbe {
    #[inline(always)]
    fn start(hash: u64, mask: usize) -> Self {
        LinearProbe {
            pos: home(hash, mask),
            mask,
        }
    }

    #[inline(always)]
    fn pos(&self) -> usize {
        self.pos
    }

    #[inline(always)]
    fn advance(&mut self) {
        self.pos = (self.pos + 1) & self.mask;
    }
}

/// `h, h+1, h+3, h+6, ...`: the i-th step moves `i` slots, so the offset
/// after `i` steps is the i-th triangular number.
///
/// On a power-of-two table the first `capacity` positions are a permutation
/// of all slots.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TriangularProbe {
    pos: usize,
    stride: usize,
    mask: usize,
}

impl ProbeSeq for TriangularProbe {
    #[inline(always)]
    fn start(hash: u64, mask: usize) -> Self {
        TriangularProbe {
            pos: home(hash, mask),
            stride: 0,
            mask,
        }
    }

    #[inline(always)]
    fn pos(&self) -> usize {
        self.pos
    }

    #[inline(always)]
    fn advance(&mut self) {
        self.stride += 1;
        self.pos = (self.pos + self.stride) & self.mask;
    }
}
