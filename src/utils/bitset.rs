//! A fixed-capacity bit set used as a scoped visited set.
//!
//! Graph walks over blocks and instructions mark nodes by their dense index.
//! A [`BitSet`] is created by the walk that needs it and dropped when the walk
//! returns, so no marking state survives on the graph between passes.
//!
//! # Example
//!
//! ```rust
//! use arkir::utils::BitSet;
//!
//! let mut visited = BitSet::new(100);
//! assert!(visited.insert(7));
//! assert!(!visited.insert(7));
//! assert!(visited.contains(7));
//! assert_eq!(visited.iter().collect::<Vec<_>>(), vec![7]);
//! ```

const WORD_BITS: usize = u64::BITS as usize;

/// A bit vector over the indices `0..capacity`.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BitSet {
    words: Vec<u64>,
    capacity: usize,
}

impl BitSet {
    /// Creates an empty set able to hold indices below `capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(WORD_BITS)],
            capacity,
        }
    }

    /// Returns the number of indices the set can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Grows the set so that `index` can be stored.
    pub fn grow(&mut self, index: usize) {
        if index >= self.capacity {
            self.capacity = index + 1;
            self.words.resize(self.capacity.div_ceil(WORD_BITS), 0);
        }
    }

    /// Adds `index`, returning `true` if it was not present before.
    ///
    /// Indices beyond the capacity grow the set.
    pub fn insert(&mut self, index: usize) -> bool {
        self.grow(index);
        let (word, mask) = Self::locate(index);
        let fresh = self.words[word] & mask == 0;
        self.words[word] |= mask;
        fresh
    }

    /// Removes `index`, returning `true` if it was present.
    pub fn remove(&mut self, index: usize) -> bool {
        if index >= self.capacity {
            return false;
        }
        let (word, mask) = Self::locate(index);
        let present = self.words[word] & mask != 0;
        self.words[word] &= !mask;
        present
    }

    /// Returns `true` if `index` is in the set.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        if index >= self.capacity {
            return false;
        }
        let (word, mask) = Self::locate(index);
        self.words[word] & mask != 0
    }

    /// Returns the number of indices in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns `true` if no index is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Removes every index while keeping the capacity.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Iterates the set indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let bit = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(i * WORD_BITS + bit)
            })
        })
    }

    fn locate(index: usize) -> (usize, u64) {
        (index / WORD_BITS, 1u64 << (index % WORD_BITS))
    }
}

impl std::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<usize> for BitSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = BitSet::default();
        for index in iter {
            set.insert(index);
        }
        set
    }
}
