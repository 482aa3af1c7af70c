//! Note Book
//!
//! Two-phase recording of new notes. A note is staged, synchronously, before
//! anything externally observable happens (proof submission), and committed
//! once the ledger confirms it. A crash in between leaves the note staged,
//! never lost.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use log::debug;
use shade_privacy::{Commitment, Note};

use crate::error::{CoreError, Result};

/// Opaque reference to a staged note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StagedNoteHandle(u64);

impl StagedNoteHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct NoteBook {
    next_handle: AtomicU64,
    staged: DashMap<u64, Note>,
    committed: DashMap<Commitment, Note>,
}

impl NoteBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self, note: Note) -> StagedNoteHandle {
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.staged.insert(id, note);
        StagedNoteHandle(id)
    }

    /// Promote a staged note, returning its commitment.
    pub fn commit(&self, handle: StagedNoteHandle) -> Result<Commitment> {
        let (_, note) = self
            .staged
            .remove(&handle.0)
            .ok_or(CoreError::UnknownHandle(handle.0))?;
        let commitment = note.commitment();
        debug!("committed note {} from handle {}", commitment, handle.0);
        self.committed.insert(commitment, note);
        Ok(commitment)
    }

    /// Drop a staged note that will never be confirmed.
    pub fn discard(&self, handle: StagedNoteHandle) -> Option<Note> {
        self.staged.remove(&handle.0).map(|(_, note)| note)
    }

    pub fn staged(&self, handle: StagedNoteHandle) -> Option<Note> {
        self.staged.get(&handle.0).map(|n| n.value().clone())
    }

    pub fn get(&self, commitment: &Commitment) -> Option<Note> {
        self.committed.get(commitment).map(|n| n.value().clone())
    }

    /// All committed notes
    pub fn notes(&self) -> Vec<Note> {
        self.committed.iter().map(|n| n.value().clone()).collect()
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }
}
