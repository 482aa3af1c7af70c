//! Note Encryption
//!
//! Encrypts note data for the recipient using ECDH + ChaCha20-Poly1305, so a
//! transfer output can be delivered inside a [`ContentEnvelope`].
//!
//! ```text
//! Flow:
//! 1. Sender generates ephemeral keypair (epk, esk)
//! 2. Shared secret = ECDH(esk, recipient_pk)
//! 3. Encryption key = BLAKE3-derive("shade-note-v1", shared_secret || epk)
//! 4. Ciphertext = ChaCha20-Poly1305(key, nonce, plaintext)
//! 5. Output = epk || nonce || ciphertext+tag
//! ```

use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use log::{debug, warn};
use rand::RngCore;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::commitment::Commitment;
use crate::error::{PrivacyError, Result};
use crate::field::{FIELD_BYTES, Field};
use crate::message::{ContentEnvelope, MessageKind};
use crate::note::{Note, NoteFields, Randomness};
use crate::token::TokenId;

const KEY_CONTEXT: &str = "shade-note-v1";

/// amount + token + owner + r + (flag + s) + (flag + memo)
const PLAINTEXT_LEN: usize = 16 + 3 * FIELD_BYTES + 2 * (1 + FIELD_BYTES);

/// An encrypted note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedNote {
    /// Ephemeral public key for ECDH
    pub ephemeral_pk: [u8; 32],
    /// Nonce for ChaCha20-Poly1305
    pub nonce: [u8; 12],
    /// Encrypted note data with authentication tag
    pub ciphertext: Vec<u8>,
}

impl EncryptedNote {
    /// Size of encrypted note (fixed overhead)
    pub const OVERHEAD: usize = 32 + 12 + 16; // epk + nonce + tag

    /// Wire form: `epk || nonce || ciphertext`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + 12 + self.ciphertext.len());
        out.extend_from_slice(&self.ephemeral_pk);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::OVERHEAD {
            return Err(PrivacyError::Decryption("ciphertext too short"));
        }
        let (epk, rest) = bytes.split_at(32);
        let (nonce, ciphertext) = rest.split_at(12);

        let mut ephemeral_pk = [0u8; 32];
        ephemeral_pk.copy_from_slice(epk);
        let mut nonce_bytes = [0u8; 12];
        nonce_bytes.copy_from_slice(nonce);

        Ok(Self {
            ephemeral_pk,
            nonce: nonce_bytes,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Encrypt a note for a recipient's X25519 public key
pub fn encrypt_note(note: &Note, recipient_pk: &[u8; 32]) -> Result<EncryptedNote> {
    let mut rng = rand::thread_rng();
    let ephemeral_secret = EphemeralSecret::random_from_rng(&mut rng);
    let ephemeral_pk = PublicKey::from(&ephemeral_secret);

    // ECDH shared secret
    let shared_secret = ephemeral_secret.diffie_hellman(&PublicKey::from(*recipient_pk));
    let key = derive_note_key(shared_secret.as_bytes(), ephemeral_pk.as_bytes());

    let mut nonce_bytes = [0u8; 12];
    rng.fill_bytes(&mut nonce_bytes);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), serialize_plaintext(note).as_slice())
        .map_err(|_| PrivacyError::Encryption("aead failure"))?;

    Ok(EncryptedNote {
        ephemeral_pk: *ephemeral_pk.as_bytes(),
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypt a note using the recipient's X25519 secret key
pub fn decrypt_note(encrypted: &EncryptedNote, recipient_sk: &[u8; 32]) -> Result<Note> {
    let secret = StaticSecret::from(*recipient_sk);
    let shared_secret = secret.diffie_hellman(&PublicKey::from(encrypted.ephemeral_pk));
    let key = derive_note_key(shared_secret.as_bytes(), &encrypted.ephemeral_pk);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&encrypted.nonce),
            encrypted.ciphertext.as_slice(),
        )
        .map_err(|_| PrivacyError::Decryption("authentication failed"))?;

    deserialize_plaintext(&plaintext)
}

/// Try to decrypt a note (scan mode - for wallet scanning)
///
/// Returns the note only if decryption succeeds and the commitment matches
pub fn try_decrypt_note(
    encrypted: &EncryptedNote,
    recipient_sk: &[u8; 32],
    expected_commitment: &Commitment,
) -> Option<Note> {
    let note = match decrypt_note(encrypted, recipient_sk) {
        Ok(note) => note,
        Err(e) => {
            debug!("note not for this key: {}", e);
            return None;
        }
    };
    if &note.commitment() != expected_commitment {
        warn!(
            "decrypted note does not open commitment {}, discarding",
            expected_commitment
        );
        return None;
    }
    Some(note)
}

/// Encrypt `note` and wrap it in an envelope addressed to `recipient_key`.
pub fn seal_note_envelope(
    note: &Note,
    recipient_key: Field,
    recipient_pk: &[u8; 32],
    sender_key: Option<Field>,
) -> Result<ContentEnvelope> {
    let encrypted = encrypt_note(note, recipient_pk)?;
    Ok(ContentEnvelope::seal(
        recipient_key,
        sender_key,
        MessageKind::Note,
        encrypted.to_bytes(),
    ))
}

/// Open a note envelope produced by [`seal_note_envelope`].
pub fn open_note_envelope(envelope: &ContentEnvelope, recipient_sk: &[u8; 32]) -> Result<Note> {
    if envelope.kind != MessageKind::Note {
        return Err(PrivacyError::Decryption("envelope does not carry a note"));
    }
    decrypt_note(&EncryptedNote::from_bytes(&envelope.ciphertext)?, recipient_sk)
}

/// Derive encryption key from shared secret
fn derive_note_key(shared_secret: &[u8], ephemeral_pk: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(KEY_CONTEXT);
    hasher.update(shared_secret);
    hasher.update(ephemeral_pk);
    *hasher.finalize().as_bytes()
}

fn serialize_plaintext(note: &Note) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(PLAINTEXT_LEN);
    bytes.extend_from_slice(&note.amount.as_u128().to_be_bytes());
    bytes.extend_from_slice(&note.token_id.to_field().to_bytes_be());
    bytes.extend_from_slice(&note.owner_key.to_bytes_be());
    bytes.extend_from_slice(&note.randomness.r.to_bytes_be());
    push_optional(&mut bytes, note.randomness.s);
    push_optional(&mut bytes, note.memo);
    bytes
}

fn push_optional(bytes: &mut Vec<u8>, value: Option<Field>) {
    match value {
        Some(f) => {
            bytes.push(1);
            bytes.extend_from_slice(&f.to_bytes_be());
        }
        None => {
            bytes.push(0);
            bytes.extend_from_slice(&[0u8; FIELD_BYTES]);
        }
    }
}

struct PlaintextReader<'a> {
    bytes: &'a [u8],
}

impl PlaintextReader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        if self.bytes.len() < N {
            return Err(PrivacyError::Decryption("truncated plaintext"));
        }
        let (head, tail) = self.bytes.split_at(N);
        self.bytes = tail;
        let mut out = [0u8; N];
        out.copy_from_slice(head);
        Ok(out)
    }

    fn field(&mut self) -> Result<Field> {
        Field::from_bytes_be(&self.take::<FIELD_BYTES>()?)
            .map_err(|_| PrivacyError::Decryption("non-canonical field in plaintext"))
    }

    fn optional(&mut self) -> Result<Option<Field>> {
        let [flag] = self.take::<1>()?;
        let value = self.field()?;
        match flag {
            0 => Ok(None),
            1 => Ok(Some(value)),
            _ => Err(PrivacyError::Decryption("bad option flag")),
        }
    }
}

fn deserialize_plaintext(bytes: &[u8]) -> Result<Note> {
    if bytes.len() != PLAINTEXT_LEN {
        return Err(PrivacyError::Decryption("unexpected plaintext length"));
    }
    let mut reader = PlaintextReader { bytes };

    let amount = u128::from_be_bytes(reader.take::<16>()?);
    let token_id = TokenId(reader.field()?);
    let owner_key = reader.field()?;
    let r = reader.field()?;
    let s = reader.optional()?;
    let memo = reader.optional()?;

    Ok(Note::with_randomness(
        NoteFields {
            amount,
            token_id,
            owner_key,
            memo,
        },
        Randomness { r, s },
    ))
}
