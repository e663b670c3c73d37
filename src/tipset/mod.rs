//! # Descendant-Set Store
//!
//! Compact sets of non-negative integer ids (taxon/leaf identifiers).
//! Every node's `mrca`/`outmrca` property and every candidate relationship
//! owns an independent `TipSet`; once a node's set is finalized it is
//! treated as an immutable value, which is what makes concurrent readers
//! safe without locks.
//!
//! Two interchangeable backings, selected automatically by requested
//! capacity:
//!
//! | Variant  | Universe            | Ops        |
//! |----------|---------------------|------------|
//! | `Word`   | ids 0..64 (one machine word) | O(1) bitwise |
//! | `Blocks` | unbounded, grows on insert   | O(n/64)      |
//!
//! Callers are agnostic to which variant backs a set; the only visible
//! difference is that inserting an id ≥ 64 into a `Word` set is a
//! programming error and panics (request `Blocks` capacity instead).

use serde::{Deserialize, Serialize};

const WORD_BITS: u64 = 64;

/// A set of non-negative integer ids over a bit-mask backing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TipSet {
    /// Packed single-word mask. Fixed universe of ids 0..64.
    Word(u64),
    /// General growable bit-set, one `u64` block per 64 ids.
    Blocks(Vec<u64>),
}

impl TipSet {
    /// Empty set sized for ids `0..capacity`. Picks the packed word
    /// variant when the whole universe fits one machine word.
    pub fn with_capacity(capacity: u64) -> Self {
        if capacity <= WORD_BITS {
            TipSet::Word(0)
        } else {
            TipSet::Blocks(vec![0; capacity.div_ceil(WORD_BITS) as usize])
        }
    }

    /// Empty growable set (never the packed variant).
    pub fn growable() -> Self {
        TipSet::Blocks(Vec::new())
    }

    /// Build from an id iterator using the growable backing.
    pub fn from_ids(ids: impl IntoIterator<Item = u64>) -> Self {
        let mut set = TipSet::growable();
        for id in ids {
            set.insert(id);
        }
        set
    }

    /// Insert an id. Construction-phase only; finalized sets are values.
    ///
    /// # Panics
    ///
    /// Panics if `id >= 64` on the `Word` variant. That is a caller bug
    /// (the wrong capacity was requested), not a recoverable condition.
    pub fn insert(&mut self, id: u64) {
        match self {
            TipSet::Word(mask) => {
                assert!(
                    id < WORD_BITS,
                    "id {id} exceeds packed-word capacity {WORD_BITS}; request a growable set"
                );
                *mask |= 1 << id;
            }
            TipSet::Blocks(blocks) => {
                let block = (id / WORD_BITS) as usize;
                if block >= blocks.len() {
                    blocks.resize(block + 1, 0);
                }
                blocks[block] |= 1 << (id % WORD_BITS);
            }
        }
    }

    pub fn contains(&self, id: u64) -> bool {
        match self {
            TipSet::Word(mask) => id < WORD_BITS && mask & (1 << id) != 0,
            TipSet::Blocks(blocks) => {
                let block = (id / WORD_BITS) as usize;
                block < blocks.len() && blocks[block] & (1 << (id % WORD_BITS)) != 0
            }
        }
    }

    /// True iff the two sets share at least one id. This is the conflict
    /// test the selection engine runs on every candidate pair.
    pub fn contains_any(&self, other: &TipSet) -> bool {
        match (self, other) {
            (TipSet::Word(a), TipSet::Word(b)) => a & b != 0,
            _ => {
                let (a, b) = (self.blocks_view(), other.blocks_view());
                a.iter().zip(b.iter()).any(|(x, y)| x & y != 0)
            }
        }
    }

    /// True iff every id in `other` is in `self`.
    pub fn contains_all(&self, other: &TipSet) -> bool {
        match (self, other) {
            (TipSet::Word(a), TipSet::Word(b)) => b & !a == 0,
            _ => {
                let (a, b) = (self.blocks_view(), other.blocks_view());
                if b.len() > a.len() && b[a.len()..].iter().any(|x| *x != 0) {
                    return false;
                }
                a.iter().zip(b.iter()).all(|(x, y)| y & !x == 0)
            }
        }
    }

    /// Pure union producing a new set. Mixed-variant unions promote to
    /// the growable backing.
    pub fn union(&self, other: &TipSet) -> TipSet {
        match (self, other) {
            (TipSet::Word(a), TipSet::Word(b)) => TipSet::Word(a | b),
            _ => {
                let (a, b) = (self.blocks_view(), other.blocks_view());
                let mut out = vec![0u64; a.len().max(b.len())];
                for (i, x) in a.iter().enumerate() {
                    out[i] |= x;
                }
                for (i, y) in b.iter().enumerate() {
                    out[i] |= y;
                }
                TipSet::Blocks(out)
            }
        }
    }

    /// In-place union, used while accumulating coverage during selection.
    pub fn union_with(&mut self, other: &TipSet) {
        *self = self.union(other);
    }

    /// Ids in `self` but not in `other`. Used to maintain approximate
    /// exclusion sets (`outmrca`) on synthesized intermediate nodes.
    pub fn difference(&self, other: &TipSet) -> TipSet {
        match (self, other) {
            (TipSet::Word(a), TipSet::Word(b)) => TipSet::Word(a & !b),
            _ => {
                let (a, b) = (self.blocks_view(), other.blocks_view());
                let out = a
                    .iter()
                    .enumerate()
                    .map(|(i, x)| x & !b.get(i).copied().unwrap_or(0))
                    .collect();
                TipSet::Blocks(out)
            }
        }
    }

    /// Number of ids in the set (popcount).
    pub fn len(&self) -> u64 {
        match self {
            TipSet::Word(mask) => mask.count_ones() as u64,
            TipSet::Blocks(blocks) => blocks.iter().map(|b| b.count_ones() as u64).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            TipSet::Word(mask) => *mask == 0,
            TipSet::Blocks(blocks) => blocks.iter().all(|b| *b == 0),
        }
    }

    /// Iterate ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.blocks_view()
            .iter()
            .enumerate()
            .flat_map(|(block_idx, block)| {
                let base = block_idx as u64 * WORD_BITS;
                let mut bits = *block;
                std::iter::from_fn(move || {
                    if bits == 0 {
                        return None;
                    }
                    let low = bits.trailing_zeros() as u64;
                    bits &= bits - 1;
                    Some(base + low)
                })
            })
    }

    /// Materialize as the id array stored in the `mrca` property.
    pub fn to_ids(&self) -> Vec<u64> {
        self.iter().collect()
    }

    fn blocks_view(&self) -> &[u64] {
        match self {
            TipSet::Word(mask) => std::slice::from_ref(mask),
            TipSet::Blocks(blocks) => blocks.as_slice(),
        }
    }
}

impl FromIterator<u64> for TipSet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        TipSet::from_ids(iter)
    }
}

impl Default for TipSet {
    fn default() -> Self {
        TipSet::growable()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_selects_variant() {
        assert!(matches!(TipSet::with_capacity(64), TipSet::Word(_)));
        assert!(matches!(TipSet::with_capacity(65), TipSet::Blocks(_)));
    }

    #[test]
    fn test_insert_and_contains() {
        let mut s = TipSet::with_capacity(64);
        s.insert(0);
        s.insert(63);
        assert!(s.contains(0));
        assert!(s.contains(63));
        assert!(!s.contains(12));
        assert_eq!(s.len(), 2);
    }

    #[test]
    #[should_panic(expected = "exceeds packed-word capacity")]
    fn test_word_overflow_panics() {
        let mut s = TipSet::with_capacity(8);
        s.insert(64);
    }

    #[test]
    fn test_growable_grows() {
        let mut s = TipSet::growable();
        s.insert(500_000);
        assert!(s.contains(500_000));
        assert!(!s.contains(499_999));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_contains_any_and_all() {
        let a = TipSet::from_ids([1, 2, 3]);
        let b = TipSet::from_ids([2, 4]);
        let c = TipSet::from_ids([5, 6]);
        assert!(a.contains_any(&b));
        assert!(!a.contains_any(&c));
        assert!(a.contains_all(&TipSet::from_ids([1, 3])));
        assert!(!a.contains_all(&b));
    }

    #[test]
    fn test_mixed_variant_ops() {
        let mut word = TipSet::with_capacity(16);
        word.insert(3);
        let big = TipSet::from_ids([3, 100]);
        assert!(word.contains_any(&big));
        assert!(big.contains_all(&word));
        assert!(!word.contains_all(&big));

        let u = word.union(&big);
        assert_eq!(u.to_ids(), vec![3, 100]);
    }

    #[test]
    fn test_difference() {
        let a = TipSet::from_ids([1, 2, 3, 100]);
        let b = TipSet::from_ids([2, 100]);
        assert_eq!(a.difference(&b).to_ids(), vec![1, 3]);
        assert_eq!(b.difference(&a).to_ids(), Vec::<u64>::new());
    }

    #[test]
    fn test_union_is_pure() {
        let a = TipSet::from_ids([1, 2]);
        let b = TipSet::from_ids([2, 3]);
        let u = a.union(&b);
        assert_eq!(u.to_ids(), vec![1, 2, 3]);
        // operands untouched
        assert_eq!(a.to_ids(), vec![1, 2]);
        assert_eq!(b.to_ids(), vec![2, 3]);
    }

    #[test]
    fn test_iter_ordering_across_blocks() {
        let s = TipSet::from_ids([200, 7, 64, 63]);
        assert_eq!(s.to_ids(), vec![7, 63, 64, 200]);
    }
}
