//! Growable dense bit vector
//!
//! Used for dominance frontiers, vreg liveness, stack masks and the per-register
//! pseudo-phi block sets. Setting a bit past the end grows the storage; reading past
//! the end yields `false`.

use std::fmt;

const WORD_BITS: usize = u32::BITS as usize;

/// A growable set of small non-negative integers backed by `u32` words
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct BitVector {
    words: Vec<u32>,
}

impl BitVector {
    /// Create an empty bit vector with room for `bits` bits
    pub fn new(bits: usize) -> Self {
        BitVector {
            words: vec![0; bits.div_ceil(WORD_BITS)],
        }
    }

    /// Build a bit vector from a list of set indexes
    pub fn from_indexes(indexes: impl IntoIterator<Item = usize>) -> Self {
        let mut bv = BitVector::default();
        for idx in indexes {
            bv.set(idx);
        }
        bv
    }

    /// Number of bits the current storage can hold without growing
    pub fn storage_bits(&self) -> usize {
        self.words.len() * WORD_BITS
    }

    /// Set bit `idx`, growing the storage if needed. Returns true if the bit was clear.
    pub fn set(&mut self, idx: usize) -> bool {
        let word = idx / WORD_BITS;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let mask = 1u32 << (idx % WORD_BITS);
        let changed = self.words[word] & mask == 0;
        self.words[word] |= mask;
        changed
    }

    /// Clear bit `idx`. Returns true if the bit was set.
    pub fn clear(&mut self, idx: usize) -> bool {
        let word = idx / WORD_BITS;
        match self.words.get_mut(word) {
            Some(w) => {
                let mask = 1u32 << (idx % WORD_BITS);
                let changed = *w & mask != 0;
                *w &= !mask;
                changed
            }
            None => false,
        }
    }

    /// Clear every bit, keeping the storage
    pub fn clear_all(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    pub fn is_set(&self, idx: usize) -> bool {
        self.words
            .get(idx / WORD_BITS)
            .is_some_and(|w| w & (1u32 << (idx % WORD_BITS)) != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    pub fn num_set_bits(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Index of the highest set bit, if any
    pub fn highest_bit_set(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .rev()
            .find(|(_, &w)| w != 0)
            .map(|(i, &w)| i * WORD_BITS + (WORD_BITS - 1 - w.leading_zeros() as usize))
    }

    /// `self |= other`. Returns true if any bit was added.
    pub fn union_with(&mut self, other: &BitVector) -> bool {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        let mut changed = false;
        for (dst, &src) in self.words.iter_mut().zip(&other.words) {
            let merged = *dst | src;
            changed |= merged != *dst;
            *dst = merged;
        }
        changed
    }

    /// `self &= !other`
    pub fn subtract(&mut self, other: &BitVector) {
        for (dst, &src) in self.words.iter_mut().zip(&other.words) {
            *dst &= !src;
        }
    }

    /// Set-equality that ignores trailing zero words
    pub fn same_bits_set(&self, other: &BitVector) -> bool {
        let (short, long) = if self.words.len() <= other.words.len() {
            (&self.words, &other.words)
        } else {
            (&other.words, &self.words)
        };
        short.iter().zip(long.iter()).all(|(a, b)| a == b)
            && long[short.len()..].iter().all(|&w| w == 0)
    }

    /// Iterate over the indexes of set bits in increasing order
    pub fn indexes(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            let mut w = word;
            std::iter::from_fn(move || {
                if w == 0 {
                    return None;
                }
                let bit = w.trailing_zeros() as usize;
                w &= w - 1;
                Some(i * WORD_BITS + bit)
            })
        })
    }
}

impl fmt::Debug for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.indexes()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_grows_and_reports_change() {
        let mut bv = BitVector::new(4);
        assert!(bv.set(70));
        assert!(!bv.set(70));
        assert!(bv.is_set(70));
        assert!(!bv.is_set(1000));
        assert_eq!(bv.highest_bit_set(), Some(70));
    }

    #[test]
    fn test_union_reports_added_bits() {
        let mut a = BitVector::from_indexes([1, 3]);
        let b = BitVector::from_indexes([3, 40]);
        assert!(a.union_with(&b));
        assert!(!a.union_with(&b));
        assert_eq!(a.indexes().collect::<Vec<_>>(), vec![1, 3, 40]);
    }

    #[test]
    fn test_subtract_and_equality_ignore_storage() {
        let mut a = BitVector::from_indexes([2, 5, 64]);
        a.subtract(&BitVector::from_indexes([64]));
        assert!(a.same_bits_set(&BitVector::from_indexes([2, 5])));
        assert_eq!(a.num_set_bits(), 2);
        assert!(a.clear(2));
        assert!(!a.clear(200));
    }

    #[test]
    fn test_empty_vector() {
        let bv = BitVector::new(0);
        assert!(bv.is_empty());
        assert_eq!(bv.highest_bit_set(), None);
        assert_eq!(bv.indexes().count(), 0);
    }
}
