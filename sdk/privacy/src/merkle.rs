//! Commitment Accumulator
//!
//! Append-only Merkle tree over note commitments. Used for proving note
//! existence without revealing which note.
//!
//! ```text
//!                    Root
//!                   /    \
//!                 H01    H2_
//!                /  \   /   \
//!               C0  C1 C2    0   (missing right sibling = field zero)
//! ```
//!
//! Padding is the field value zero at every level, not the hash of an empty
//! subtree. The verifier's circuit uses the same rule.
//!
//! Every level is cached and only the path above a new leaf is rehashed on
//! append. Roots and proofs are identical to a full bottom-up recomputation
//! ([`compute_root`]).

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::commitment::Commitment;
use crate::error::{PrivacyError, Result};
use crate::field::Field;
use crate::poseidon::hash_pair;

/// Default tree depth (supports 2^20 notes)
pub const DEFAULT_TREE_DEPTH: usize = 20;

/// Largest supported depth.
pub const MAX_TREE_DEPTH: usize = 32;

/// A Merkle path proving inclusion of one commitment against one root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    pub root: Field,
    pub leaf: Field,
    /// The leaf position
    pub index: u64,
    /// Sibling hashes from leaf to root
    pub siblings: Vec<Field>,
}

impl MerklePath {
    /// Position bits, bottom-up (0 = current node is the left child, 1 = right)
    pub fn path_indices(&self) -> Vec<u8> {
        path_indices(self.index, self.siblings.len())
    }

    /// Hash up from the leaf through the siblings.
    pub fn compute_root(&self) -> Field {
        compute_root_from_path(&self.leaf, self.index, &self.siblings)
    }

    /// Verify that this path proves inclusion of `leaf` in `root`
    pub fn verify(&self) -> bool {
        self.compute_root() == self.root
    }
}

/// Position bits of `index` for a tree of `depth` levels.
pub fn path_indices(index: u64, depth: usize) -> Vec<u8> {
    (0..depth).map(|level| ((index >> level) & 1) as u8).collect()
}

/// Compute root from leaf and authentication path
pub fn compute_root_from_path(leaf: &Field, index: u64, siblings: &[Field]) -> Field {
    let mut current = *leaf;
    let mut position = index;

    for sibling in siblings {
        current = if position & 1 == 1 {
            // Current node is on the right
            hash_pair(sibling, &current)
        } else {
            // Current node is on the left
            hash_pair(&current, sibling)
        };
        position >>= 1;
    }

    current
}

/// Full bottom-up recomputation of the root of `leaves` at `depth`.
pub fn compute_root(depth: usize, leaves: &[Field]) -> Field {
    let mut level: Vec<Field> = leaves.to_vec();
    for _ in 0..depth {
        level = level
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(&Field::ZERO)))
            .collect();
    }
    level.first().copied().unwrap_or(Field::ZERO)
}

/// Append-only commitment accumulator with per-level node cache
#[derive(Debug, Clone)]
pub struct CommitmentAccumulator {
    depth: usize,
    /// `levels[0]` holds the leaves, `levels[depth]` the root once non-empty
    levels: Vec<Vec<Field>>,
}

impl CommitmentAccumulator {
    /// Create a new empty accumulator
    pub fn new(depth: usize) -> Result<Self> {
        if depth == 0 || depth > MAX_TREE_DEPTH {
            return Err(PrivacyError::InvalidDepth(depth));
        }
        Ok(Self {
            depth,
            levels: vec![Vec::new(); depth + 1],
        })
    }

    /// Rebuild from an ordered leaf sequence (for reconstruction)
    pub fn from_leaves<I>(depth: usize, leaves: I) -> Result<Self>
    where
        I: IntoIterator<Item = Commitment>,
    {
        let mut acc = Self::new(depth)?;
        for leaf in leaves {
            acc.append(leaf)?;
        }
        Ok(acc)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Maximum number of leaves (`2^depth`)
    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    /// Number of appended leaves, which is also the next index
    pub fn len(&self) -> u64 {
        self.levels[0].len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    pub fn next_index(&self) -> u64 {
        self.len()
    }

    /// Append a commitment and return its index
    pub fn append(&mut self, commitment: Commitment) -> Result<u64> {
        let index = self.len();
        if index >= self.capacity() {
            return Err(PrivacyError::CapacityExceeded {
                depth: self.depth,
                capacity: self.capacity(),
            });
        }

        self.levels[0].push(commitment.0);

        // Update path to root
        let mut position = index as usize;
        for level in 0..self.depth {
            let left_pos = position & !1;
            let left = self.levels[level][left_pos];
            let right = self.levels[level]
                .get(left_pos + 1)
                .copied()
                .unwrap_or(Field::ZERO);
            let parent = hash_pair(&left, &right);

            position /= 2;
            let parents = &mut self.levels[level + 1];
            if position < parents.len() {
                parents[position] = parent;
            } else {
                parents.push(parent);
            }
        }

        Ok(index)
    }

    /// Get current root
    pub fn root(&self) -> Field {
        self.levels[self.depth]
            .first()
            .copied()
            .unwrap_or(Field::ZERO)
    }

    /// Get commitment at index
    pub fn leaf(&self, index: u64) -> Option<Commitment> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.levels[0].get(i))
            .map(|f| Commitment(*f))
    }

    /// All leaves in append order
    pub fn leaves(&self) -> &[Field] {
        &self.levels[0]
    }

    /// Get the inclusion proof for the leaf at `index`
    pub fn proof(&self, index: u64) -> Result<MerklePath> {
        let leaf = self.leaf(index).ok_or(PrivacyError::IndexOutOfRange {
            index,
            len: self.len(),
        })?;

        let mut siblings = Vec::with_capacity(self.depth);
        let mut position = index as usize;
        for level in 0..self.depth {
            let sibling = self.levels[level]
                .get(position ^ 1)
                .copied()
                .unwrap_or(Field::ZERO);
            siblings.push(sibling);
            position /= 2;
        }

        Ok(MerklePath {
            root: self.root(),
            leaf: leaf.0,
            index,
            siblings,
        })
    }
}

/// Root history for the accumulator
///
/// Stores recent roots to allow operations to reference
/// slightly stale roots (handles race conditions).
#[derive(Debug, Clone, Default)]
pub struct RootHistory {
    /// Recent roots (most recent first)
    roots: VecDeque<Field>,
    /// Maximum history size
    max_size: usize,
}

impl RootHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            roots: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Add a new root
    pub fn push(&mut self, root: Field) {
        self.roots.push_front(root);
        self.roots.truncate(self.max_size);
    }

    /// Check if a root is valid (current or recent)
    pub fn is_valid(&self, root: &Field) -> bool {
        self.roots.contains(root)
    }

    /// Get the most recent root
    pub fn current(&self) -> Option<&Field> {
        self.roots.front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(v: u64) -> Commitment {
        Commitment(Field::from_u64(v))
    }

    #[test]
    fn test_empty_accumulator() {
        let acc = CommitmentAccumulator::new(4).unwrap();
        assert_eq!(acc.next_index(), 0);
        assert_eq!(acc.root(), Field::ZERO);
        assert!(acc.proof(0).is_err());
    }

    #[test]
    fn test_invalid_depth() {
        assert_eq!(CommitmentAccumulator::new(0).unwrap_err(), PrivacyError::InvalidDepth(0));
        assert!(CommitmentAccumulator::new(MAX_TREE_DEPTH + 1).is_err());
    }

    #[test]
    fn test_single_leaf_zero_padding() {
        let mut acc = CommitmentAccumulator::new(2).unwrap();
        assert_eq!(acc.append(c(7)).unwrap(), 0);

        let c0 = Field::from_u64(7);
        let expected = hash_pair(&hash_pair(&c0, &Field::ZERO), &Field::ZERO);
        assert_eq!(acc.root(), expected);
    }

    #[test]
    fn test_capacity_exceeded() {
        let mut acc = CommitmentAccumulator::new(1).unwrap();
        acc.append(c(1)).unwrap();
        acc.append(c(2)).unwrap();
        assert_eq!(
            acc.append(c(3)).unwrap_err(),
            PrivacyError::CapacityExceeded { depth: 1, capacity: 2 }
        );
        assert_eq!(acc.len(), 2, "failed append must not change state");
    }

    #[test]
    fn test_incremental_matches_recompute() {
        let mut acc = CommitmentAccumulator::new(4).unwrap();
        for i in 0..11u64 {
            acc.append(c(i + 100)).unwrap();
            assert_eq!(acc.root(), compute_root(4, acc.leaves()), "after {} leaves", i + 1);
        }
    }

    #[test]
    fn test_same_sequence_same_root() {
        let a = CommitmentAccumulator::from_leaves(5, (0..9).map(c)).unwrap();
        let b = CommitmentAccumulator::from_leaves(5, (0..9).map(c)).unwrap();
        assert_eq!(a.root(), b.root());

        let reordered = CommitmentAccumulator::from_leaves(5, (0..9).rev().map(c)).unwrap();
        assert_ne!(a.root(), reordered.root());
    }

    #[test]
    fn test_every_proof_reproduces_root() {
        let acc = CommitmentAccumulator::from_leaves(3, (1..=6).map(c)).unwrap();
        for index in 0..acc.len() {
            let path = acc.proof(index).unwrap();
            assert_eq!(path.siblings.len(), 3);
            assert_eq!(path.root, acc.root());
            assert!(path.verify(), "proof for {index} should verify");
        }
    }

    #[test]
    fn test_proof_rejects_wrong_leaf() {
        let acc = CommitmentAccumulator::from_leaves(3, (1..=3).map(c)).unwrap();
        let mut path = acc.proof(1).unwrap();
        path.leaf = Field::from_u64(99);
        assert!(!path.verify());
    }

    #[test]
    fn test_path_indices() {
        assert_eq!(path_indices(5, 4), vec![1, 0, 1, 0]);
        let acc = CommitmentAccumulator::from_leaves(3, (1..=6).map(c)).unwrap();
        assert_eq!(acc.proof(3).unwrap().path_indices(), vec![1, 1, 0]);
    }

    #[test]
    fn test_root_history() {
        let mut history = RootHistory::new(2);

        let r1 = Field::from_u64(1);
        let r2 = Field::from_u64(2);
        let r3 = Field::from_u64(3);

        history.push(r1);
        history.push(r2);
        history.push(r3);

        assert!(!history.is_valid(&r1), "oldest root evicted");
        assert!(history.is_valid(&r2));
        assert!(history.is_valid(&r3));
        assert_eq!(history.current(), Some(&r3));
    }
}
