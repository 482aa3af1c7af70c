//! Errors produced by the privacy primitives.

use thiserror::Error;

/// Errors produced while parsing field values, maintaining the accumulator or
/// opening encrypted notes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrivacyError {
    /// Input could not be read as a field element.
    #[error("invalid field encoding {input:?}: {reason}")]
    InvalidField { input: String, reason: &'static str },

    /// Input parsed as an integer but is not below the field modulus.
    #[error("value {0} is not below the field modulus")]
    FieldOutOfRange(String),

    /// The accumulator already holds `2^depth` leaves.
    #[error("accumulator capacity exceeded (depth {depth}, {capacity} leaves)")]
    CapacityExceeded { depth: usize, capacity: u64 },

    /// Accumulator depth outside the supported range.
    #[error("unsupported accumulator depth {0}")]
    InvalidDepth(usize),

    /// Requested a leaf that has not been appended.
    #[error("leaf index {index} out of range ({len} leaves)")]
    IndexOutOfRange { index: u64, len: u64 },

    /// Unknown chain descriptor.
    #[error("invalid chain {0:?}")]
    InvalidChain(String),

    /// Note plaintext could not be sealed.
    #[error("note encryption failed: {0}")]
    Encryption(&'static str),

    /// Note ciphertext could not be opened.
    #[error("note decryption failed: {0}")]
    Decryption(&'static str),
}

pub type Result<T> = core::result::Result<T, PrivacyError>;
