use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

const WORD_BITS: usize = 64;

/// A computational basis state (or X-flip mask) on `n` spins, one bit per spin.
/// A set bit is a down spin.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BasisState {
    nbits: usize,
    words: SmallVec<[u64; 2]>,
}

impl BasisState {
    /// All spins up.
    pub fn zeros(nbits: usize) -> Self {
        let nwords = (nbits + WORD_BITS - 1) / WORD_BITS;
        Self {
            nbits,
            words: SmallVec::from_elem(0, nwords),
        }
    }

    /// All spins down.
    pub fn ones(nbits: usize) -> Self {
        let mut s = Self::zeros(nbits);
        (0..nbits).for_each(|i| s.set(i, true));
        s
    }

    /// Build from a slice of bools.
    pub fn from_bools(bits: &[bool]) -> Self {
        let mut s = Self::zeros(bits.len());
        bits.iter()
            .enumerate()
            .filter(|(_, b)| **b)
            .for_each(|(i, _)| s.set(i, true));
        s
    }

    /// Build a mask with the given bits set.
    pub fn from_indices(nbits: usize, indices: &[usize]) -> Self {
        let mut s = Self::zeros(nbits);
        indices.iter().for_each(|i| s.set(*i, true));
        s
    }

    /// Number of spins.
    pub fn nbits(&self) -> usize {
        self.nbits
    }

    /// Value of bit `i`.
    pub fn get(&self, i: usize) -> bool {
        debug_assert!(i < self.nbits);
        (self.words[i / WORD_BITS] >> (i % WORD_BITS)) & 1 == 1
    }

    /// Set bit `i`.
    pub fn set(&mut self, i: usize, value: bool) {
        debug_assert!(i < self.nbits);
        let mask = 1u64 << (i % WORD_BITS);
        if value {
            self.words[i / WORD_BITS] |= mask;
        } else {
            self.words[i / WORD_BITS] &= !mask;
        }
    }

    /// Flip bit `i`.
    pub fn flip(&mut self, i: usize) {
        debug_assert!(i < self.nbits);
        self.words[i / WORD_BITS] ^= 1u64 << (i % WORD_BITS);
    }

    /// Apply an X-flip mask in place.
    pub fn xor_assign(&mut self, other: &BasisState) {
        debug_assert_eq!(self.nbits, other.nbits);
        self.words
            .iter_mut()
            .zip(other.words.iter())
            .for_each(|(a, b)| *a ^= *b);
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Parity of the overlap with `other`, i.e. the sign `(-1)^{|self & other|}`
    /// of a Z-string with support `other` on this state.
    pub fn overlap_parity(&self, other: &BasisState) -> bool {
        let ones: u32 = self
            .words
            .iter()
            .zip(other.words.iter())
            .map(|(a, b)| (a & b).count_ones())
            .sum();
        ones % 2 == 1
    }

    /// True if no bit is set.
    pub fn is_zero(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// True if every one of the `nbits` bits is set.
    pub fn is_all_ones(&self) -> bool {
        self.count_ones() == self.nbits
    }

    /// Index of the lowest set bit.
    pub fn lowest_set_bit(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .find(|(_, w)| **w != 0)
            .map(|(i, w)| i * WORD_BITS + w.trailing_zeros() as usize)
    }

    /// Iterate over the indices of set bits.
    pub fn ones_iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.nbits).filter(move |i| self.get(*i))
    }

    /// Dense index of the state, valid for fewer than 64 spins.
    pub fn as_index(&self) -> usize {
        debug_assert!(self.nbits < WORD_BITS);
        self.words.first().copied().unwrap_or(0) as usize
    }
}

impl fmt::Debug for BasisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: String = (0..self.nbits)
            .map(|i| if self.get(i) { '1' } else { '0' })
            .collect();
        write!(f, "|{}>", s)
    }
}
