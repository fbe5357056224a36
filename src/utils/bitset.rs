//! Compact membership set over dense table indices.
//!
//! The crawler uses it for per-table markers that are queried once per object or type,
//! such as "this GC handle slot mirrors another one" or "this type derives from the
//! native bridge base type". 64 indices are packed into each word.
//!
//! # Example
//!
//! ```rust,ignore
//! use memscope::utils::BitSet;
//!
//! let mut set = BitSet::new(100);
//! set.insert(3);
//! set.insert(64);
//!
//! assert!(set.contains(64));
//! assert_eq!(set.iter().collect::<Vec<_>>(), vec![3, 64]);
//! ```

/// A fixed-capacity bit vector keyed by table index.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BitSet {
    words: Vec<u64>,
    len: usize,
}

impl BitSet {
    /// Creates an empty set able to hold indices `0..capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
            len: capacity,
        }
    }

    /// Returns the capacity of the set.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no index is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Marks `index` as a member.
    ///
    /// Returns `true` if the index was not a member before.
    ///
    /// # Panics
    /// Panics if `index >= self.len()`.
    pub fn insert(&mut self, index: usize) -> bool {
        assert!(index < self.len, "index out of bounds");
        let mask = 1u64 << (index % 64);
        let word = &mut self.words[index / 64];
        let inserted = *word & mask == 0;
        *word |= mask;
        inserted
    }

    /// Returns `true` if `index` is a member. Indices beyond the capacity are never members.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        self.words[index / 64] & (1u64 << (index % 64)) != 0
    }

    /// Returns the number of members.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns an iterator over the member indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(word_idx, &word)| {
                let mut remaining = word;
                std::iter::from_fn(move || {
                    if remaining == 0 {
                        return None;
                    }
                    let bit = remaining.trailing_zeros() as usize;
                    remaining &= remaining - 1;
                    Some(word_idx * 64 + bit)
                })
            })
    }
}

impl std::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
