//! Fixed-length bit vector.
//!
//! Used for per-chunk id sets: dehoisted key ids in the platform block data
//! and the live-constant set computed before saving.

/// A bit vector with an explicit length.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BitVector {
    length: usize,
    words: Vec<u64>,
}

impl BitVector {
    const WORD_BITS: usize = 64;

    /// All-clear vector of `length` bits.
    pub fn new(length: usize) -> Self {
        BitVector {
            length,
            words: vec![0; length.div_ceil(Self::WORD_BITS)],
        }
    }

    /// Rebuild from raw words. Returns `None` if the word count does not
    /// match `length` or bits past `length` are set.
    pub fn from_words(length: usize, words: Vec<u64>) -> Option<Self> {
        if words.len() != length.div_ceil(Self::WORD_BITS) {
            return None;
        }
        let tail = length % Self::WORD_BITS;
        if tail != 0 && words.last().is_some_and(|&w| w >> tail != 0) {
            return None;
        }
        Some(BitVector { length, words })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Backing words, low bit first.
    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Grow to at least `length` bits.
    pub fn ensure_len(&mut self, length: usize) {
        if length > self.length {
            self.length = length;
            self.words.resize(length.div_ceil(Self::WORD_BITS), 0);
        }
    }

    /// Set bit `index`, growing the vector if needed.
    #[inline]
    pub fn add(&mut self, index: usize) {
        self.ensure_len(index + 1);
        self.words[index / Self::WORD_BITS] |= 1 << (index % Self::WORD_BITS);
    }

    #[inline]
    pub fn remove(&mut self, index: usize) {
        if index < self.length {
            self.words[index / Self::WORD_BITS] &= !(1 << (index % Self::WORD_BITS));
        }
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        index < self.length && self.words[index / Self::WORD_BITS] & (1 << (index % Self::WORD_BITS)) != 0
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Set bit indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(word_index, &word)| {
            (0..Self::WORD_BITS)
                .filter(move |bit| word & (1 << bit) != 0)
                .map(move |bit| word_index * Self::WORD_BITS + bit)
        })
    }
}
