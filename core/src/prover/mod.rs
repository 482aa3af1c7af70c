//! Proof Pipeline
//!
//! Turns a deposit, transfer, withdraw or audit into a proven, locally
//! verified, submittable payload.
//!
//! ```text
//! ┌───────────────────┐   ┌─────────┐   ┌──────────────────┐   ┌────────────────┐
//! │ CollectingWitness │──▶│ Proving │──▶│ LocallyVerifying │──▶│ ReadyToSubmit  │
//! │ notes + snapshot  │   │ workers │   │ (if vkey given)  │   │ SubmissionPayload
//! └───────────────────┘   └─────────┘   └──────────────────┘   └────────────────┘
//! ```
//!
//! The proving engine itself is external: [`CircuitProver`] is the seam.
//! [`MockProver`] is deterministic for tests and development,
//! [`CoordinatorProver`] delegates to a proving coordinator over HTTP.

mod artifacts;
mod coordinator;
mod pipeline;
mod service;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shade_privacy::{Commitment, Field, Nullifier, TokenId};

use crate::error::{CoreError, Result};

pub use artifacts::{ArtifactRegistry, LoadedArtifacts};
pub use coordinator::{CoordinatorConfig, CoordinatorProver};
pub use pipeline::{
    OperationRequest, PreparedOperation, ProofPipeline, SpendInput, Stage, deposit_hash,
};
pub use service::ProverService;

/// Kind of shielded operation, one circuit each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Deposit,
    Transfer,
    Withdraw,
    Audit,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Deposit,
        OperationKind::Transfer,
        OperationKind::Withdraw,
        OperationKind::Audit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Deposit => "deposit",
            OperationKind::Transfer => "transfer",
            OperationKind::Withdraw => "withdraw",
            OperationKind::Audit => "audit",
        }
    }

    /// Whether the operation consumes an existing note.
    pub fn spends(&self) -> bool {
        !matches!(self, OperationKind::Deposit)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        OperationKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::EncodingMismatch(format!("unknown operation kind {s:?}")))
    }
}

/// A named witness input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WitnessValue {
    Scalar(Field),
    Array(Vec<Field>),
}

impl WitnessValue {
    fn flatten_into(&self, out: &mut Vec<Field>) {
        match self {
            WitnessValue::Scalar(f) => out.push(*f),
            WitnessValue::Array(fs) => out.extend_from_slice(fs),
        }
    }
}

/// Circuit inputs by name, plus the ordered names that are public.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    pub inputs: BTreeMap<String, WitnessValue>,
    pub public: Vec<String>,
}

impl Witness {
    pub fn scalar(&mut self, name: &str, value: Field) -> &mut Self {
        self.inputs.insert(name.to_string(), WitnessValue::Scalar(value));
        self
    }

    pub fn array(&mut self, name: &str, values: Vec<Field>) -> &mut Self {
        self.inputs.insert(name.to_string(), WitnessValue::Array(values));
        self
    }

    /// Mark an already inserted input as public, in signal order.
    pub fn public(&mut self, name: &str) -> &mut Self {
        self.public.push(name.to_string());
        self
    }

    pub fn get(&self, name: &str) -> Option<&WitnessValue> {
        self.inputs.get(name)
    }

    /// Public inputs flattened in declaration order; the public signals a
    /// correct proof must carry.
    pub fn public_values(&self) -> Result<Vec<Field>> {
        let mut out = Vec::new();
        for name in &self.public {
            self.inputs
                .get(name)
                .ok_or_else(|| CoreError::EncodingMismatch(format!("public input {name} not set")))?
                .flatten_into(&mut out);
        }
        Ok(out)
    }
}

/// Everything a prover needs for one proof.
#[derive(Debug, Clone)]
pub struct ProveJob {
    pub kind: OperationKind,
    pub circuit: Vec<u8>,
    pub proving_key: Vec<u8>,
    pub witness: Witness,
}

/// A generated proof
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOutput {
    #[serde(with = "hex::serde")]
    pub proof: Vec<u8>,
    pub public_signals: Vec<Field>,
    pub proving_time_ms: u64,
}

/// Proving engine seam
pub trait CircuitProver: Send + Sync {
    /// `prove(circuit, key, witness) -> (proof, publicSignals)`
    fn prove(&self, job: &ProveJob) -> Result<ProofOutput>;

    /// `verify(vkey, publicSignals, proof) -> bool`, for a proof of `kind`
    fn verify(
        &self,
        kind: OperationKind,
        verification_key: &[u8],
        public_signals: &[Field],
        proof: &[u8],
    ) -> Result<bool>;
}

/// Mock prover - generates deterministic fake proofs
///
/// The proof is a keyed hash of the public signals, so verification fails
/// whenever proof and signals are tampered with independently.
#[derive(Debug, Clone, Default)]
pub struct MockProver {
    /// Emit proofs that never verify
    corrupt: bool,
}

const MOCK_PROOF_CONTEXT: &str = "shade mock proof v1";

impl MockProver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prover whose proofs fail verification (for testing)
    pub fn corrupt() -> Self {
        Self { corrupt: true }
    }

    fn proof_for(kind: &str, public_signals: &[Field]) -> Vec<u8> {
        let mut hasher = blake3::Hasher::new_derive_key(MOCK_PROOF_CONTEXT);
        hasher.update(kind.as_bytes());
        for signal in public_signals {
            hasher.update(&signal.to_bytes_be());
        }

        // Mock proof is 256 bytes, digest first
        let mut proof = Vec::with_capacity(256);
        proof.extend_from_slice(hasher.finalize().as_bytes());
        proof.extend_from_slice(&[0u8; 224]);
        proof
    }
}

impl CircuitProver for MockProver {
    fn prove(&self, job: &ProveJob) -> Result<ProofOutput> {
        let public_signals = job.witness.public_values()?;
        let mut proof = Self::proof_for(job.kind.as_str(), &public_signals);
        if self.corrupt {
            proof[0] ^= 0xff;
        }

        Ok(ProofOutput {
            proof,
            public_signals,
            proving_time_ms: 0,
        })
    }

    fn verify(
        &self,
        kind: OperationKind,
        _verification_key: &[u8],
        public_signals: &[Field],
        proof: &[u8],
    ) -> Result<bool> {
        Ok(Self::proof_for(kind.as_str(), public_signals) == proof)
    }
}

/// Payload handed to the ledger authority. Field values serialize as
/// fixed-width `0x` hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionPayload {
    pub kind: OperationKind,
    #[serde(with = "hex::serde")]
    pub proof: Vec<u8>,
    pub public_signals: Vec<Field>,
    /// Accumulator root the spend was proven against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullifier: Option<Nullifier>,
    /// New commitments to append, in order
    pub commitments: Vec<Commitment>,
    pub token_id: TokenId,
    /// Public amount entering (deposit) or leaving (withdraw) the pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit_hash: Option<Field>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ProveJob {
        let mut witness = Witness::default();
        witness
            .scalar("secret", Field::from_u64(1))
            .scalar("root", Field::from_u64(2))
            .array("outs", vec![Field::from_u64(3), Field::from_u64(4)])
            .public("root")
            .public("outs");
        ProveJob {
            kind: OperationKind::Transfer,
            circuit: vec![],
            proving_key: vec![],
            witness,
        }
    }

    #[test]
    fn test_public_values_in_declared_order() {
        let values = job().witness.public_values().unwrap();
        assert_eq!(values, vec![Field::from_u64(2), Field::from_u64(3), Field::from_u64(4)]);
    }

    #[test]
    fn test_missing_public_input() {
        let mut witness = Witness::default();
        witness.public("nope");
        assert!(matches!(
            witness.public_values(),
            Err(CoreError::EncodingMismatch(_))
        ));
    }

    #[test]
    fn test_mock_prover() {
        let prover = MockProver::new();
        let output = prover.prove(&job()).unwrap();

        assert_eq!(output.proof.len(), 256);
        let kind = OperationKind::Transfer;
        assert!(prover.verify(kind, &[], &output.public_signals, &output.proof).unwrap());

        let mut tampered = output.public_signals.clone();
        tampered[0] = Field::from_u64(99);
        assert!(!prover.verify(kind, &[], &tampered, &output.proof).unwrap());
    }

    #[test]
    fn test_corrupt_mock_prover() {
        let prover = MockProver::corrupt();
        let output = prover.prove(&job()).unwrap();
        assert!(!prover.verify(OperationKind::Transfer, &[], &output.public_signals, &output.proof).unwrap());
    }

    #[test]
    fn test_mock_proof_is_bound_to_kind() {
        let prover = MockProver::new();
        let output = prover.prove(&job()).unwrap();
        for kind in [OperationKind::Deposit, OperationKind::Withdraw, OperationKind::Audit] {
            assert!(
                !prover.verify(kind, &[], &output.public_signals, &output.proof).unwrap(),
                "transfer proof accepted as {kind}"
            );
        }
    }

    #[test]
    fn test_operation_kind_parse() {
        assert_eq!("Withdraw".parse::<OperationKind>().unwrap(), OperationKind::Withdraw);
        assert!("swap".parse::<OperationKind>().is_err());
        assert_eq!(serde_json::to_string(&OperationKind::Audit).unwrap(), "\"audit\"");
    }
}
