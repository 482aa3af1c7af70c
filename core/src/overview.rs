//! Account Overview
//!
//! Balance view over a wallet's notes. A note counts toward the spendable
//! balance only when its nullifier is known `Unused` and its amount is
//! positive. `Unknown` statuses are reported as such and never counted.

use std::collections::BTreeMap;

use futures::future::join_all;
use log::debug;
use num_bigint::BigUint;
use serde::{Serialize, Serializer};
use shade_privacy::{Commitment, Note, Nullifier, TokenId};

use crate::error::Result;
use crate::ledger::NullifierLedger;
use crate::nullifiers::{CheckMode, NullifierTracker, SpentStatus};

/// One note as seen by the overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteOverview {
    pub commitment: Commitment,
    pub nullifier: Nullifier,
    pub token_id: TokenId,
    pub amount: u128,
    pub status: SpentStatus,
    pub spendable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountOverview {
    #[serde(serialize_with = "decimal")]
    pub balance: BigUint,
    pub spendable_count: usize,
    pub total_count: usize,
    pub notes: Vec<NoteOverview>,
    #[serde(serialize_with = "decimal_by_token")]
    pub balances_by_token: BTreeMap<TokenId, BigUint>,
}

impl AccountOverview {
    /// Notes whose status could not be determined.
    pub fn unknown_count(&self) -> usize {
        self.notes
            .iter()
            .filter(|n| n.status == SpentStatus::Unknown)
            .count()
    }
}

fn decimal<S: Serializer>(value: &BigUint, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_str_radix(10))
}

fn decimal_by_token<S: Serializer>(
    balances: &BTreeMap<TokenId, BigUint>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_map(
        balances
            .iter()
            .map(|(token, amount)| (token.to_hex(), amount.to_str_radix(10))),
    )
}

/// Compute the overview of `notes`, querying statuses in tracker-sized
/// chunks.
pub async fn compute_overview<Q: NullifierLedger>(
    tracker: &NullifierTracker<Q>,
    notes: &[Note],
    check_external: bool,
) -> Result<AccountOverview> {
    let mode = CheckMode::from(check_external);
    let mut overview = AccountOverview {
        balance: BigUint::default(),
        spendable_count: 0,
        total_count: notes.len(),
        notes: Vec::with_capacity(notes.len()),
        balances_by_token: BTreeMap::new(),
    };

    for chunk in notes.chunks(tracker.config().batch_size) {
        let nullifiers: Vec<Nullifier> = chunk.iter().map(Note::nullifier).collect();
        let keys: Vec<String> = nullifiers.iter().map(Nullifier::to_hex).collect();
        let statuses = join_all(keys.iter().map(|key| tracker.status(key, mode))).await;

        for ((note, nullifier), status) in chunk.iter().zip(nullifiers).zip(statuses) {
            let status = status?;
            let amount = note.amount.as_u128();
            let spendable = status == SpentStatus::Unused && amount > 0;

            if spendable {
                overview.spendable_count += 1;
                overview.balance += amount;
                *overview
                    .balances_by_token
                    .entry(note.token_id)
                    .or_default() += amount;
            }

            overview.notes.push(NoteOverview {
                commitment: note.commitment(),
                nullifier,
                token_id: note.token_id,
                amount,
                status,
                spendable,
            });
        }
    }

    debug!(
        "overview: {} of {} notes spendable, balance {}",
        overview.spendable_count, overview.total_count, overview.balance
    );
    Ok(overview)
}
