use shade_privacy::PrivacyError;
use thiserror::Error;

/// Errors surfaced by the accounting core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No circuit configured for the operation, or one of its files is absent.
    #[error("artifact missing for {kind}: {detail}")]
    ArtifactMissing { kind: String, detail: String },

    /// The proof did not verify against the configured verification key.
    #[error("{0} proof failed local verification")]
    ProofVerificationFailed(String),

    /// Ledger authority or query service could not be reached.
    #[error("external service unavailable: {0}")]
    ExternalUnavailable(String),

    /// The ledger authority answered and refused the request.
    #[error("rejected by ledger authority: {0}")]
    Rejected(String),

    #[error("message {0} already stored")]
    DuplicateMessage(String),

    /// Data disagrees with its declared shape or with the hash it claims.
    #[error("encoding mismatch: {0}")]
    EncodingMismatch(String),

    #[error("bad public signals: {0}")]
    BadPublicSignals(String),

    /// Attempt to move a spent nullifier back to unused.
    #[error("refusing to downgrade spent nullifier {0}")]
    NullifierDowngrade(String),

    /// The input note is already spent.
    #[error("nullifier {0} is already spent")]
    AlreadySpent(String),

    #[error("value does not balance for token {token}: in {inflow}, out {outflow}")]
    Unbalanced {
        token: String,
        inflow: u128,
        outflow: u128,
    },

    #[error("unknown staged note handle {0}")]
    UnknownHandle(u64),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("prover unavailable: {0}")]
    ProverUnavailable(String),

    #[error(transparent)]
    Privacy(#[from] PrivacyError),
}

impl From<rocksdb::Error> for CoreError {
    fn from(err: rocksdb::Error) -> Self {
        CoreError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Storage(format!("record encoding: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
