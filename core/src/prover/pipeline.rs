use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::Serialize;
use shade_privacy::{
    Field, Note, Nullifier, TokenId, compute_root_from_path, path_indices, poseidon,
};

use super::{
    ArtifactRegistry, OperationKind, ProofOutput, ProveJob, ProverService, SubmissionPayload,
    Witness,
};
use crate::error::{CoreError, Result};
use crate::ledger::{AccumulatorSnapshotResponse, LedgerAuthority, NullifierLedger, SubmissionReceipt};
use crate::notes::{NoteBook, StagedNoteHandle};
use crate::nullifiers::NullifierTracker;

/// Where an operation is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    CollectingWitness,
    Proving,
    LocallyVerifying,
    ReadyToSubmit,
}

/// A note being spent, with its leaf position in the accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendInput {
    pub note: Note,
    pub index: u64,
}

/// What the caller wants proven.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub kind: OperationKind,
    pub input: Option<SpendInput>,
    /// New notes; their commitments get appended
    pub outputs: Vec<Note>,
    /// Value entering (deposit) or leaving (withdraw) the pool
    pub public_amount: u128,
    /// Withdraw destination or auditor key
    pub recipient: Option<Field>,
    pub nonce: Option<Field>,
}

impl OperationRequest {
    pub fn deposit(note: Note, nonce: Field) -> Self {
        Self {
            kind: OperationKind::Deposit,
            input: None,
            public_amount: note.amount.as_u128(),
            outputs: vec![note],
            recipient: None,
            nonce: Some(nonce),
        }
    }

    pub fn transfer(input: SpendInput, outputs: Vec<Note>) -> Self {
        Self {
            kind: OperationKind::Transfer,
            input: Some(input),
            outputs,
            public_amount: 0,
            recipient: None,
            nonce: None,
        }
    }

    /// Withdraw `amount` to `recipient`, keeping the rest in `change`.
    pub fn withdraw(input: SpendInput, amount: u128, recipient: Field, change: Option<Note>) -> Self {
        Self {
            kind: OperationKind::Withdraw,
            input: Some(input),
            outputs: change.into_iter().collect(),
            public_amount: amount,
            recipient: Some(recipient),
            nonce: None,
        }
    }

    /// Disclose a note to `auditor_key` without spending it.
    pub fn audit(input: SpendInput, auditor_key: Field) -> Self {
        Self {
            kind: OperationKind::Audit,
            input: Some(input),
            outputs: Vec::new(),
            public_amount: 0,
            recipient: Some(auditor_key),
            nonce: None,
        }
    }
}

/// A proven operation ready for the ledger authority.
#[derive(Debug, Clone)]
pub struct PreparedOperation {
    pub kind: OperationKind,
    /// Stages passed through, in order
    pub stages: Vec<Stage>,
    pub proof: ProofOutput,
    pub payload: SubmissionPayload,
    pub nullifier: Option<Nullifier>,
    /// Output notes recorded in the note book, awaiting confirmation
    pub staged: Vec<StagedNoteHandle>,
    /// Ledger `next_index` when the witness was collected
    pub snapshot_next_index: u64,
}

impl PreparedOperation {
    pub fn stage(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::CollectingWitness)
    }
}

/// Drives operations from witness collection to submission.
pub struct ProofPipeline<L, Q> {
    ledger: L,
    tracker: Arc<NullifierTracker<Q>>,
    prover: ProverService,
    artifacts: ArtifactRegistry,
    notes: Arc<NoteBook>,
    depth: usize,
}

impl<L: LedgerAuthority, Q: NullifierLedger> ProofPipeline<L, Q> {
    pub fn new(
        ledger: L,
        tracker: Arc<NullifierTracker<Q>>,
        prover: ProverService,
        artifacts: ArtifactRegistry,
        notes: Arc<NoteBook>,
        depth: usize,
    ) -> Self {
        Self {
            ledger,
            tracker,
            prover,
            artifacts,
            notes,
            depth,
        }
    }

    pub fn notes(&self) -> &Arc<NoteBook> {
        &self.notes
    }

    pub fn tracker(&self) -> &Arc<NullifierTracker<Q>> {
        &self.tracker
    }

    /// Collect the witness, prove, verify locally when a verification key is
    /// configured, and package the payload. Output notes are staged in the
    /// note book before this returns.
    pub async fn prepare(&self, request: OperationRequest) -> Result<PreparedOperation> {
        let kind = request.kind;
        let mut stages = vec![Stage::CollectingWitness];
        debug!("{kind}: collecting witness");

        validate_shape(&request)?;
        let token_id = check_balance(&request)?;
        let artifacts = self.artifacts.load(kind)?;

        let nullifier = request.input.as_ref().map(|input| input.note.nullifier());
        if let Some(nullifier) = &nullifier {
            if kind != OperationKind::Audit && self.tracker.is_spent(&nullifier.to_hex(), true).await? {
                return Err(CoreError::AlreadySpent(nullifier.to_hex()));
            }
        }

        let snapshot = self
            .ledger
            .fetch_snapshot(request.input.as_ref().map(|input| input.index))
            .await?;
        let path = match &request.input {
            Some(input) => Some(self.check_path(input, &snapshot)?),
            None => None,
        };

        let witness = build_witness(&request, token_id, &snapshot, path.as_deref())?;
        let expected_signals = witness.public_values()?;

        stages.push(Stage::Proving);
        info!("{kind}: proving");
        let proof = self
            .prover
            .prove(ProveJob {
                kind,
                circuit: artifacts.circuit.clone(),
                proving_key: artifacts.proving_key.clone(),
                witness,
            })
            .await?;

        self.artifacts.check_public_signals(kind, &proof.public_signals)?;
        if proof.public_signals != expected_signals {
            return Err(CoreError::BadPublicSignals(format!(
                "{kind} proof signals do not match the public inputs"
            )));
        }

        if let Some(verification_key) = &artifacts.verification_key {
            stages.push(Stage::LocallyVerifying);
            let valid = self
                .prover
                .verify(
                    kind,
                    verification_key.clone(),
                    proof.public_signals.clone(),
                    proof.proof.clone(),
                )
                .await?;
            if !valid {
                warn!("{kind}: proof failed local verification, discarding");
                return Err(CoreError::ProofVerificationFailed(kind.to_string()));
            }
        }

        stages.push(Stage::ReadyToSubmit);
        let payload = build_payload(&request, token_id, &snapshot, nullifier, &proof);
        let staged = request
            .outputs
            .into_iter()
            .map(|note| self.notes.stage(note))
            .collect();

        info!(
            "{kind}: ready to submit ({} commitments, proved in {}ms)",
            payload.commitments.len(),
            proof.proving_time_ms
        );
        Ok(PreparedOperation {
            kind,
            stages,
            proof,
            payload,
            nullifier,
            staged,
            snapshot_next_index: snapshot.next_index,
        })
    }

    /// Submit to the ledger authority. On confirmation the spent nullifier is
    /// marked in the tracker and the staged outputs are committed.
    ///
    /// Once the ledger has accepted, the receipt is always returned. Local
    /// bookkeeping failures are logged; the ledger stays authoritative and a
    /// later sync repairs the cache.
    pub async fn submit(&self, prepared: &PreparedOperation) -> Result<SubmissionReceipt> {
        let receipt = self
            .ledger
            .submit_operation(&prepared.payload)
            .await
            .inspect_err(|e| {
                warn!("{} submission failed, outputs stay staged: {}", prepared.kind, e)
            })?;

        if matches!(prepared.kind, OperationKind::Transfer | OperationKind::Withdraw) {
            if let Some(nullifier) = &prepared.nullifier {
                if let Err(e) = self
                    .tracker
                    .mark_spent(&nullifier.to_hex(), Some(&receipt.signature))
                {
                    error!(
                        "{} confirmed as {} but nullifier {} was not cached: {}",
                        prepared.kind, receipt.signature, nullifier, e
                    );
                }
            }
        }
        for handle in &prepared.staged {
            if let Err(e) = self.notes.commit(*handle) {
                error!(
                    "{} confirmed as {} but output {} was not committed: {}",
                    prepared.kind,
                    receipt.signature,
                    handle.id(),
                    e
                );
            }
        }

        info!("{} confirmed: {}", prepared.kind, receipt.signature);
        Ok(receipt)
    }

    /// Give up on a prepared operation, dropping its staged outputs.
    pub fn abandon(&self, prepared: PreparedOperation) {
        for handle in prepared.staged {
            self.notes.discard(handle);
        }
    }

    /// The ledger's path must have one sibling per level and hash up to the
    /// snapshot root from the input commitment.
    fn check_path(
        &self,
        input: &SpendInput,
        snapshot: &AccumulatorSnapshotResponse,
    ) -> Result<Vec<Field>> {
        let elements = snapshot
            .path_elements
            .as_ref()
            .ok_or_else(|| CoreError::EncodingMismatch("ledger returned no path".to_string()))?;
        if elements.len() != self.depth {
            return Err(CoreError::EncodingMismatch(format!(
                "path has {} elements, accumulator depth is {}",
                elements.len(),
                self.depth
            )));
        }

        if let Some(indices) = &snapshot.path_indices {
            if *indices != path_indices(input.index, self.depth) {
                return Err(CoreError::EncodingMismatch(format!(
                    "path indices do not encode leaf {}",
                    input.index
                )));
            }
        }

        let leaf = input.note.commitment().to_field();
        if compute_root_from_path(&leaf, input.index, elements) != snapshot.root {
            return Err(CoreError::EncodingMismatch(format!(
                "path for leaf {} does not reproduce root {}",
                input.index, snapshot.root
            )));
        }
        Ok(elements.clone())
    }
}

fn validate_shape(request: &OperationRequest) -> Result<()> {
    let problem = match request.kind {
        OperationKind::Deposit if request.input.is_some() => Some("deposit spends no note"),
        OperationKind::Deposit if request.outputs.len() != 1 => {
            Some("deposit creates exactly one note")
        }
        OperationKind::Deposit if request.nonce.is_none() => Some("deposit needs a nonce"),
        OperationKind::Deposit => None,
        _ if request.input.is_none() => Some("operation needs an input note"),
        OperationKind::Transfer if request.outputs.is_empty() => {
            Some("transfer creates at least one note")
        }
        OperationKind::Withdraw if request.recipient.is_none() => Some("withdraw needs a recipient"),
        OperationKind::Withdraw if request.public_amount == 0 => Some("withdraw of zero"),
        OperationKind::Audit if !request.outputs.is_empty() => Some("audit creates no notes"),
        OperationKind::Audit if request.recipient.is_none() => Some("audit needs an auditor key"),
        _ => None,
    };

    match problem {
        Some(problem) => Err(CoreError::EncodingMismatch(format!(
            "{}: {problem}",
            request.kind
        ))),
        None => Ok(()),
    }
}

fn add(slot: &mut u128, amount: u128) -> Result<()> {
    *slot = slot
        .checked_add(amount)
        .ok_or_else(|| CoreError::EncodingMismatch("amount overflow".to_string()))?;
    Ok(())
}

/// Value in must equal value out, per token. Returns the operation's token.
fn check_balance(request: &OperationRequest) -> Result<TokenId> {
    let token_id = request
        .input
        .as_ref()
        .map(|input| input.note.token_id)
        .or_else(|| request.outputs.first().map(|note| note.token_id))
        .ok_or_else(|| CoreError::EncodingMismatch("operation moves no notes".to_string()))?;

    if request.kind == OperationKind::Audit {
        return Ok(token_id);
    }

    // token -> (in, out)
    let mut flows: BTreeMap<TokenId, (u128, u128)> = BTreeMap::new();
    if let Some(input) = &request.input {
        add(&mut flows.entry(input.note.token_id).or_default().0, input.note.amount.as_u128())?;
    }
    if request.kind == OperationKind::Deposit {
        add(&mut flows.entry(token_id).or_default().0, request.public_amount)?;
    }
    for note in &request.outputs {
        add(&mut flows.entry(note.token_id).or_default().1, note.amount.as_u128())?;
    }
    if request.kind == OperationKind::Withdraw {
        add(&mut flows.entry(token_id).or_default().1, request.public_amount)?;
    }

    for (token, (inflow, outflow)) in flows {
        if inflow != outflow {
            return Err(CoreError::Unbalanced {
                token: token.to_hex(),
                inflow,
                outflow,
            });
        }
    }
    Ok(token_id)
}

/// Deposit binding of owner, amount and nonce.
pub fn deposit_hash(owner_key: &Field, amount: u128, nonce: &Field) -> Field {
    poseidon::hash(&[*owner_key, Field::from_u128(amount), *nonce])
}

fn build_witness(
    request: &OperationRequest,
    token_id: TokenId,
    snapshot: &AccumulatorSnapshotResponse,
    path: Option<&[Field]>,
) -> Result<Witness> {
    let mut w = Witness::default();

    if request.kind == OperationKind::Deposit {
        let note = &request.outputs[0];
        let nonce = request.nonce.unwrap_or(Field::ZERO);
        w.scalar("owner_key", note.owner_key)
            .scalar("amount", Field::from_u128(note.amount.as_u128()))
            .scalar("r", note.randomness.r)
            .scalar("token_id", token_id.to_field())
            .scalar("memo", note.memo.unwrap_or(Field::ZERO))
            .scalar("nonce", nonce)
            .scalar("commitment", note.commitment().to_field())
            .scalar(
                "deposit_hash",
                deposit_hash(&note.owner_key, note.amount.as_u128(), &nonce),
            )
            .public("deposit_hash")
            .public("commitment")
            .public("amount")
            .public("token_id");
        return Ok(w);
    }

    let input = request
        .input
        .as_ref()
        .ok_or_else(|| CoreError::EncodingMismatch("operation needs an input note".to_string()))?;
    let path = path.ok_or_else(|| CoreError::EncodingMismatch("missing input path".to_string()))?;
    let note = &input.note;

    w.scalar("in_amount", Field::from_u128(note.amount.as_u128()))
        .scalar("in_owner_key", note.owner_key)
        .scalar("in_r", note.randomness.r)
        .scalar("in_memo", note.memo.unwrap_or(Field::ZERO))
        .scalar("token_id", token_id.to_field())
        .array("path_elements", path.to_vec())
        .array(
            "path_indices",
            path_indices(input.index, path.len())
                .into_iter()
                .map(|bit| Field::from_u64(u64::from(bit)))
                .collect(),
        )
        .scalar("root", snapshot.root)
        .scalar("nullifier", note.nullifier().to_field());

    let outputs = &request.outputs;
    w.array("out_amounts", outputs.iter().map(|n| Field::from_u128(n.amount.as_u128())).collect())
        .array("out_owner_keys", outputs.iter().map(|n| n.owner_key).collect())
        .array("out_r", outputs.iter().map(|n| n.randomness.r).collect())
        .array("out_memos", outputs.iter().map(|n| n.memo.unwrap_or(Field::ZERO)).collect())
        .array("out_commitments", outputs.iter().map(|n| n.commitment().to_field()).collect());

    w.public("root").public("nullifier");
    match request.kind {
        OperationKind::Transfer => {
            w.public("out_commitments");
        }
        OperationKind::Withdraw => {
            w.scalar("public_amount", Field::from_u128(request.public_amount))
                .scalar("recipient", request.recipient.unwrap_or(Field::ZERO))
                .public("public_amount")
                .public("token_id")
                .public("recipient")
                .public("out_commitments");
        }
        OperationKind::Audit => {
            w.scalar("auditor_key", request.recipient.unwrap_or(Field::ZERO))
                .public("auditor_key")
                .public("in_amount")
                .public("token_id");
        }
        OperationKind::Deposit => {}
    }
    Ok(w)
}

fn build_payload(
    request: &OperationRequest,
    token_id: TokenId,
    snapshot: &AccumulatorSnapshotResponse,
    nullifier: Option<Nullifier>,
    proof: &ProofOutput,
) -> SubmissionPayload {
    let spends = request.kind.spends();
    let amount = match request.kind {
        OperationKind::Deposit | OperationKind::Withdraw => Some(request.public_amount),
        OperationKind::Audit => request.input.as_ref().map(|i| i.note.amount.as_u128()),
        OperationKind::Transfer => None,
    };
    let (owner, deposit_hash) = match (request.kind, request.outputs.first(), request.nonce) {
        (OperationKind::Deposit, Some(note), Some(nonce)) => (
            Some(note.owner_key),
            Some(self::deposit_hash(&note.owner_key, note.amount.as_u128(), &nonce)),
        ),
        _ => (None, None),
    };

    SubmissionPayload {
        kind: request.kind,
        proof: proof.proof.clone(),
        public_signals: proof.public_signals.clone(),
        root: spends.then_some(snapshot.root),
        nullifier,
        commitments: request.outputs.iter().map(Note::commitment).collect(),
        token_id,
        amount: amount.map(Field::from_u128),
        recipient: request.recipient,
        owner,
        deposit_hash,
    }
}
