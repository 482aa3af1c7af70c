//! Message Envelopes
//!
//! Ciphertext addressed to a recipient key, identified by its content hash:
//!
//! ```text
//! content_hash = Hash(recipient_key, reduce(SHA-256(ciphertext)))
//! ```
//!
//! The content hash is the storage idempotency key. Two submissions with the
//! same recipient and ciphertext are the same message.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::field::Field;
use crate::poseidon;

/// What the ciphertext carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// An encrypted output note for its new owner
    Note,
    /// Disclosure material for an auditor
    Audit,
    /// Free-form payload
    Text,
}

/// An addressed ciphertext with its content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEnvelope {
    pub recipient_key: Field,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_key: Option<Field>,
    pub kind: MessageKind,
    #[serde(with = "hex::serde")]
    pub ciphertext: Vec<u8>,
    pub content_hash: Field,
}

impl ContentEnvelope {
    /// Build an envelope, computing its content hash.
    pub fn seal(
        recipient_key: Field,
        sender_key: Option<Field>,
        kind: MessageKind,
        ciphertext: Vec<u8>,
    ) -> Self {
        let content_hash = content_hash(&recipient_key, &ciphertext);
        Self {
            recipient_key,
            sender_key,
            kind,
            ciphertext,
            content_hash,
        }
    }

    /// Whether the carried hash matches recipient and ciphertext.
    pub fn verify_hash(&self) -> bool {
        content_hash(&self.recipient_key, &self.ciphertext) == self.content_hash
    }
}

/// Content hash of a message.
pub fn content_hash(recipient_key: &Field, ciphertext: &[u8]) -> Field {
    let digest = Sha256::digest(ciphertext);
    poseidon::hash(&[*recipient_key, Field::from_bytes_be_mod_order(&digest)])
}
