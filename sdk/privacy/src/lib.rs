//! Shade Privacy SDK
//!
//! Note-based privacy primitives for shielded accounting.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Shielded Note                            │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────────┐  │
//! │  │  Nullifier   │  │  Commitment  │  │   Encrypted Output    │  │
//! │  │  (spent)     │  │  (new notes) │  │   (for recipient)     │  │
//! │  └──────────────┘  └──────────────┘  └───────────────────────┘  │
//! │         │                 │                     │               │
//! │         ▼                 ▼                     ▼               │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │  Poseidon over BN254 Fr                                 │    │
//! │  │  • Commitment = Hash(amount, owner, r, token, memo)     │    │
//! │  │  • Nullifier  = Hash(owner, r, token)                   │    │
//! │  │  • Accumulator nodes = Hash(left, right)                │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod commitment;
pub mod encryption;
pub mod error;
pub mod field;
pub mod merkle;
pub mod message;
pub mod note;
pub mod nullifier;
pub mod poseidon;
pub mod token;

pub use commitment::{Commitment, commitment_of};
pub use encryption::{
    EncryptedNote, decrypt_note, encrypt_note, open_note_envelope, seal_note_envelope,
    try_decrypt_note,
};
pub use error::{PrivacyError, Result};
pub use field::{FIELD_BYTES, Field, normalize_hex};
pub use merkle::{
    CommitmentAccumulator, DEFAULT_TREE_DEPTH, MAX_TREE_DEPTH, MerklePath, RootHistory,
    compute_root, compute_root_from_path, path_indices,
};
pub use message::{ContentEnvelope, MessageKind, content_hash};
pub use note::{Note, NoteFields, NoteValue, Randomness};
pub use nullifier::{Nullifier, derive_nullifier};
pub use token::{Chain, TokenDescriptor, TokenId, TokenRegistry, compress_str, token_id_of};
