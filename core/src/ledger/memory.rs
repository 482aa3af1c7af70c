//! In-process ledger authority.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, info};
use shade_privacy::Nullifier;

use super::{
    AccumulatorSnapshotResponse, ExternalNullifierRecord, LedgerAuthority, NullifierLedger,
    SubmissionReceipt,
};
use crate::accumulator::AccumulatorAuthority;
use crate::error::{CoreError, Result};
use crate::prover::{OperationKind, SubmissionPayload};
use crate::unix_now;

/// Ledger authority that lives in memory.
///
/// Appends output commitments of accepted operations and keeps the spent
/// nullifier set. Can be switched unreachable to exercise degraded paths.
pub struct InMemoryLedger {
    accumulator: AccumulatorAuthority,
    spent: DashMap<Nullifier, ExternalNullifierRecord>,
    available: AtomicBool,
}

impl InMemoryLedger {
    pub fn new(depth: usize, root_history: usize) -> Result<Self> {
        Ok(Self {
            accumulator: AccumulatorAuthority::new(depth, root_history)?,
            spent: DashMap::new(),
            available: AtomicBool::new(true),
        })
    }

    pub fn accumulator(&self) -> &AccumulatorAuthority {
        &self.accumulator
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Record a spend that happened elsewhere (another wallet, another node).
    pub fn record_external_spend(&self, nullifier: Nullifier, tx_ref: &str) {
        self.spent.insert(
            nullifier,
            ExternalNullifierRecord {
                used: true,
                tx_ref: Some(tx_ref.to_string()),
                spent_at: Some(unix_now()),
            },
        );
    }

    pub fn spent_count(&self) -> usize {
        self.spent.len()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::ExternalUnavailable("in-memory ledger switched off".to_string()))
        }
    }
}

fn receipt_signature(payload: &SubmissionPayload) -> Result<String> {
    let encoded = serde_json::to_vec(payload)?;
    Ok(hex::encode(blake3::hash(&encoded).as_bytes()))
}

impl LedgerAuthority for InMemoryLedger {
    async fn fetch_snapshot(&self, index: Option<u64>) -> Result<AccumulatorSnapshotResponse> {
        self.ensure_available()?;
        let snapshot = self.accumulator.snapshot();

        let (path_elements, path_indices) = match index {
            Some(i) => {
                let path = snapshot.proof(i)?;
                (Some(path.siblings.clone()), Some(path.path_indices()))
            }
            None => (None, None),
        };

        Ok(AccumulatorSnapshotResponse {
            root: snapshot.root(),
            next_index: snapshot.next_index(),
            path_elements,
            path_indices,
        })
    }

    async fn submit_operation(&self, payload: &SubmissionPayload) -> Result<SubmissionReceipt> {
        self.ensure_available()?;

        if let Some(root) = &payload.root {
            if !self.accumulator.is_known_root(root) {
                return Err(CoreError::Rejected(format!("unknown accumulator root {root}")));
            }
        }

        let signature = receipt_signature(payload)?;
        match (payload.kind, payload.nullifier) {
            (OperationKind::Deposit, _) => {
                self.accumulator.append_all(&payload.commitments)?;
            }
            (OperationKind::Audit, _) => {
                debug!("audit operation accepted, nothing appended");
            }
            (OperationKind::Transfer | OperationKind::Withdraw, Some(nullifier)) => {
                match self.spent.entry(nullifier) {
                    Entry::Occupied(_) => {
                        return Err(CoreError::Rejected(format!(
                            "nullifier {nullifier} already spent"
                        )));
                    }
                    Entry::Vacant(slot) => {
                        self.accumulator.append_all(&payload.commitments)?;
                        slot.insert(ExternalNullifierRecord {
                            used: true,
                            tx_ref: Some(signature.clone()),
                            spent_at: Some(unix_now()),
                        });
                    }
                }
            }
            (kind, None) => {
                return Err(CoreError::EncodingMismatch(format!(
                    "{kind} payload carries no nullifier"
                )));
            }
        }

        info!(
            "accepted {} operation ({} commitments), receipt {}",
            payload.kind,
            payload.commitments.len(),
            signature
        );
        Ok(SubmissionReceipt { signature })
    }
}

impl NullifierLedger for InMemoryLedger {
    async fn query_nullifier_record(
        &self,
        nullifier: &Nullifier,
    ) -> Result<Option<ExternalNullifierRecord>> {
        self.ensure_available()?;
        Ok(self.spent.get(nullifier).map(|r| r.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shade_privacy::{Commitment, Field, TokenId};

    fn payload(kind: OperationKind, nullifier: Option<u64>, commitments: &[u64]) -> SubmissionPayload {
        SubmissionPayload {
            kind,
            proof: vec![1, 2, 3],
            public_signals: vec![],
            root: None,
            nullifier: nullifier.map(|n| Nullifier(Field::from_u64(n))),
            commitments: commitments.iter().map(|c| Commitment(Field::from_u64(*c))).collect(),
            token_id: TokenId(Field::from_u64(1)),
            amount: None,
            recipient: None,
            owner: None,
            deposit_hash: None,
        }
    }

    #[tokio::test]
    async fn test_deposit_appends_commitments() {
        let ledger = InMemoryLedger::new(4, 8).unwrap();
        ledger
            .submit_operation(&payload(OperationKind::Deposit, None, &[7, 8]))
            .await
            .unwrap();

        let snapshot = ledger.fetch_snapshot(Some(1)).await.unwrap();
        assert_eq!(snapshot.next_index, 2);
        assert_eq!(snapshot.path_elements.as_ref().map(Vec::len), Some(4));
        assert_eq!(snapshot.path_indices, Some(vec![1, 0, 0, 0]));
    }

    #[tokio::test]
    async fn test_double_spend_rejected() {
        let ledger = InMemoryLedger::new(4, 8).unwrap();
        let spend = payload(OperationKind::Transfer, Some(42), &[1]);
        ledger.submit_operation(&spend).await.unwrap();

        let err = ledger.submit_operation(&spend).await.unwrap_err();
        assert!(matches!(err, CoreError::Rejected(_)));
        assert_eq!(ledger.accumulator().next_index(), 1, "rejected spend appends nothing");

        let record = ledger
            .query_nullifier_record(&Nullifier(Field::from_u64(42)))
            .await
            .unwrap()
            .unwrap();
        assert!(record.used);
    }

    #[tokio::test]
    async fn test_unknown_root_rejected() {
        let ledger = InMemoryLedger::new(4, 8).unwrap();
        let mut spend = payload(OperationKind::Withdraw, Some(1), &[]);
        spend.root = Some(Field::from_u64(999));
        assert!(matches!(
            ledger.submit_operation(&spend).await.unwrap_err(),
            CoreError::Rejected(_)
        ));
    }

    #[tokio::test]
    async fn test_switched_off_ledger_is_unavailable() {
        let ledger = InMemoryLedger::new(4, 8).unwrap();
        ledger.set_available(false);
        let err = ledger.fetch_snapshot(None).await.unwrap_err();
        assert!(matches!(err, CoreError::ExternalUnavailable(_)));
    }
}
