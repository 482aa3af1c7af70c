//! Accumulator Authority
//!
//! Owns the single writable [`CommitmentAccumulator`]. Appends are serialized
//! by a mutex, which is what assigns leaf indices. Readers take an `Arc` of an
//! immutable versioned snapshot and never see a half-updated tree.
//!
//! ```text
//!   append ──▶ Mutex<Writer> ──(on demand)──▶ RwLock<Arc<Snapshot>> ──▶ readers
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use log::debug;
use shade_privacy::{Commitment, CommitmentAccumulator, Field, MerklePath, RootHistory};

use crate::error::{CoreError, Result};

struct Writer {
    accumulator: CommitmentAccumulator,
    history: RootHistory,
}

/// Immutable view of the accumulator at one version.
#[derive(Debug, Clone)]
pub struct AccumulatorSnapshot {
    version: u64,
    accumulator: CommitmentAccumulator,
}

impl AccumulatorSnapshot {
    /// Number of leaves at the time the snapshot was taken
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn depth(&self) -> usize {
        self.accumulator.depth()
    }

    pub fn root(&self) -> Field {
        self.accumulator.root()
    }

    pub fn next_index(&self) -> u64 {
        self.accumulator.next_index()
    }

    pub fn leaf(&self, index: u64) -> Option<Commitment> {
        self.accumulator.leaf(index)
    }

    pub fn proof(&self, index: u64) -> Result<MerklePath> {
        Ok(self.accumulator.proof(index)?)
    }
}

/// Single-writer owner of the commitment accumulator.
pub struct AccumulatorAuthority {
    writer: Mutex<Writer>,
    published: RwLock<Arc<AccumulatorSnapshot>>,
}

impl AccumulatorAuthority {
    pub fn new(depth: usize, root_history: usize) -> Result<Self> {
        Self::from_accumulator(CommitmentAccumulator::new(depth)?, root_history)
    }

    /// Rebuild from the ordered leaf sequence.
    pub fn from_leaves<I>(depth: usize, root_history: usize, leaves: I) -> Result<Self>
    where
        I: IntoIterator<Item = Commitment>,
    {
        Self::from_accumulator(CommitmentAccumulator::from_leaves(depth, leaves)?, root_history)
    }

    fn from_accumulator(accumulator: CommitmentAccumulator, root_history: usize) -> Result<Self> {
        let mut history = RootHistory::new(root_history.max(1));
        history.push(accumulator.root());

        let snapshot = AccumulatorSnapshot {
            version: accumulator.len(),
            accumulator: accumulator.clone(),
        };

        Ok(Self {
            writer: Mutex::new(Writer {
                accumulator,
                history,
            }),
            published: RwLock::new(Arc::new(snapshot)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Writer> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one commitment, returning its leaf index.
    pub fn append(&self, commitment: Commitment) -> Result<u64> {
        let mut writer = self.lock();
        let index = writer.accumulator.append(commitment)?;
        let root = writer.accumulator.root();
        writer.history.push(root);
        debug!("appended commitment {} at index {}", commitment, index);
        Ok(index)
    }

    /// Append several commitments atomically: either all land, in order, or
    /// none do.
    pub fn append_all(&self, commitments: &[Commitment]) -> Result<Vec<u64>> {
        let mut writer = self.lock();
        let acc = &writer.accumulator;
        let needed = commitments.len() as u64;
        if acc.len() + needed > acc.capacity() {
            return Err(CoreError::Privacy(
                shade_privacy::PrivacyError::CapacityExceeded {
                    depth: acc.depth(),
                    capacity: acc.capacity(),
                },
            ));
        }

        let mut indices = Vec::with_capacity(commitments.len());
        for commitment in commitments {
            indices.push(writer.accumulator.append(*commitment)?);
        }
        let root = writer.accumulator.root();
        writer.history.push(root);
        debug!("appended {} commitments, next index {}", needed, writer.accumulator.len());
        Ok(indices)
    }

    pub fn root(&self) -> Field {
        self.lock().accumulator.root()
    }

    pub fn next_index(&self) -> u64 {
        self.lock().accumulator.next_index()
    }

    pub fn depth(&self) -> usize {
        self.lock().accumulator.depth()
    }

    /// Whether `root` is the current root or one of the recent ones.
    pub fn is_known_root(&self, root: &Field) -> bool {
        self.lock().history.is_valid(root)
    }

    /// Current immutable snapshot. Republished only when the tree changed.
    pub fn snapshot(&self) -> Arc<AccumulatorSnapshot> {
        let writer = self.lock();
        let version = writer.accumulator.len();

        {
            let published = self.published.read().unwrap_or_else(PoisonError::into_inner);
            if published.version == version {
                return Arc::clone(&published);
            }
        }

        let fresh = Arc::new(AccumulatorSnapshot {
            version,
            accumulator: writer.accumulator.clone(),
        });
        *self.published.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&fresh);
        fresh
    }

    /// Inclusion proof against the current root.
    pub fn proof(&self, index: u64) -> Result<MerklePath> {
        self.snapshot().proof(index)
    }
}
