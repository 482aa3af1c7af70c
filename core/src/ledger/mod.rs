//! Ledger Collaborators
//!
//! The ledger authority owns the canonical accumulator and accepts
//! operations; the query side answers nullifier lookups.
//!
//! ```text
//!   ProofPipeline ──fetch_snapshot / submit_operation──▶ LedgerAuthority
//!   NullifierTracker ──query_nullifier_record─────────▶ NullifierLedger
//! ```
//!
//! [`HttpLedgerClient`] speaks JSON over HTTP; [`InMemoryLedger`] is an
//! in-process authority for tests and offline runs.

mod http;
mod memory;

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shade_privacy::{Field, Nullifier};

use crate::error::Result;
use crate::prover::SubmissionPayload;

pub use http::{ApiResponse, HttpLedgerClient};
pub use memory::InMemoryLedger;

/// Accumulator state as reported by the ledger authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatorSnapshotResponse {
    pub root: Field,
    pub next_index: u64,
    /// Siblings bottom-up, present when a leaf index was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_elements: Option<Vec<Field>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_indices: Option<Vec<u8>>,
}

/// Confirmation of an accepted operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub signature: String,
}

/// What the ledger knows about one nullifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalNullifierRecord {
    pub used: bool,
    #[serde(default)]
    pub tx_ref: Option<String>,
    /// Unix seconds
    #[serde(default)]
    pub spent_at: Option<u64>,
}

/// Owner of the canonical accumulator.
pub trait LedgerAuthority: Send + Sync {
    /// Current root and next index, plus the path for `index` when given.
    fn fetch_snapshot(
        &self,
        index: Option<u64>,
    ) -> impl Future<Output = Result<AccumulatorSnapshotResponse>> + Send;

    fn submit_operation(
        &self,
        payload: &SubmissionPayload,
    ) -> impl Future<Output = Result<SubmissionReceipt>> + Send;
}

/// Source of truth for spent nullifiers.
pub trait NullifierLedger: Send + Sync {
    /// `Ok(None)` means the ledger has never seen the nullifier.
    fn query_nullifier_record(
        &self,
        nullifier: &Nullifier,
    ) -> impl Future<Output = Result<Option<ExternalNullifierRecord>>> + Send;
}

impl<T: LedgerAuthority> LedgerAuthority for Arc<T> {
    fn fetch_snapshot(
        &self,
        index: Option<u64>,
    ) -> impl Future<Output = Result<AccumulatorSnapshotResponse>> + Send {
        (**self).fetch_snapshot(index)
    }

    fn submit_operation(
        &self,
        payload: &SubmissionPayload,
    ) -> impl Future<Output = Result<SubmissionReceipt>> + Send {
        (**self).submit_operation(payload)
    }
}

impl<T: NullifierLedger> NullifierLedger for Arc<T> {
    fn query_nullifier_record(
        &self,
        nullifier: &Nullifier,
    ) -> impl Future<Output = Result<Option<ExternalNullifierRecord>>> + Send {
        (**self).query_nullifier_record(nullifier)
    }
}
