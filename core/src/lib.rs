//! Shade Core
//!
//! Client-side services for a shielded pool: nullifier tracking, account
//! overview, the proof pipeline and the collaborators they talk to.
//!
//! ```text
//!   ProofPipeline ──▶ ProverService ──▶ CircuitProver (mock | coordinator)
//!        │
//!        ├──▶ LedgerAuthority   (http | in-memory)
//!        └──▶ NullifierTracker ──▶ NullifierStore (memory | RocksDB)
//!                   ▲
//!             compute_overview
//! ```

pub mod accumulator;
pub mod error;
pub mod ledger;
pub mod messages;
pub mod notes;
pub mod nullifiers;
pub mod overview;
pub mod prover;

pub use accumulator::{AccumulatorAuthority, AccumulatorSnapshot};
pub use error::{CoreError, Result};
pub use ledger::{
    AccumulatorSnapshotResponse, ExternalNullifierRecord, HttpLedgerClient, InMemoryLedger,
    LedgerAuthority, NullifierLedger, SubmissionReceipt,
};
pub use messages::MessageStore;
pub use notes::{NoteBook, StagedNoteHandle};
pub use nullifiers::{
    CheckMode, MemoryNullifierStore, NullifierRecord, NullifierStore, NullifierTracker,
    RocksNullifierStore, SpentStatus, SyncReport, TrackerConfig,
};
pub use overview::{AccountOverview, NoteOverview, compute_overview};
pub use prover::{
    ArtifactRegistry, CircuitProver, CoordinatorProver, MockProver, OperationKind,
    OperationRequest, PreparedOperation, ProofPipeline, ProverService, SpendInput, Stage,
    SubmissionPayload,
};

/// Seconds since the Unix epoch, zero if the clock is before it.
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
