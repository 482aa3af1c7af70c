//! Shielded Notes
//!
//! A Note represents value held privately.
//!
//! ```text
//! Note = {
//!     amount:     u128,            // Amount in the token's smallest unit
//!     token_id:   Field,           // Derived from the token descriptor
//!     owner_key:  Field,           // Who can spend this note
//!     randomness: { r, s? },       // r: fresh blinding factor per note
//!     memo:       Field?,          // Optional committed memo
//! }
//! ```
//!
//! A note is never mutated once its commitment has been published.

use core::fmt;

use ark_std::rand::{CryptoRng, Rng};
use serde::de::{self, Deserializer, Unexpected, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::commitment::{Commitment, commitment_of};
use crate::field::Field;
use crate::nullifier::{Nullifier, derive_nullifier};
use crate::token::TokenId;

/// Note value with overflow protection
///
/// Serializes as a decimal string so the full `u128` range survives JSON.
/// Plain integers are accepted when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NoteValue(pub u128);

impl NoteValue {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(u128::MAX);

    pub fn new(value: u128) -> Self {
        Self(value)
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Checked subtraction
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }
}

impl fmt::Display for NoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for NoteValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NoteValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(NoteValueVisitor)
    }
}

struct NoteValueVisitor;

impl Visitor<'_> for NoteValueVisitor {
    type Value = NoteValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an unsigned 128-bit amount as a decimal string or integer")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<NoteValue, E> {
        Ok(NoteValue(u128::from(v)))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<NoteValue, E> {
        Ok(NoteValue(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<NoteValue, E> {
        // digits only, no sign or whitespace
        if v.is_empty() || !v.bytes().all(|b| b.is_ascii_digit()) {
            return Err(E::invalid_value(Unexpected::Str(v), &self));
        }
        v.parse()
            .map(NoteValue)
            .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
    }
}

/// Blinding material of a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Randomness {
    pub r: Field,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<Field>,
}

impl Randomness {
    pub fn new(r: Field) -> Self {
        Self { r, s: None }
    }

    pub fn with_secondary(r: Field, s: Field) -> Self {
        Self { r, s: Some(s) }
    }
}

/// Caller-provided part of a new note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteFields {
    pub amount: u128,
    pub token_id: TokenId,
    pub owner_key: Field,
    #[serde(default)]
    pub memo: Option<Field>,
}

/// A shielded note representing privately held value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Note {
    pub amount: NoteValue,
    pub token_id: TokenId,
    pub owner_key: Field,
    pub randomness: Randomness,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<Field>,
}

impl Note {
    /// Create a new note with fresh randomness sampled uniformly over the field.
    pub fn build<R: Rng + CryptoRng + ?Sized>(fields: NoteFields, rng: &mut R) -> Self {
        Self::with_randomness(fields, Randomness::new(Field::random(rng)))
    }

    /// Create a note with explicit randomness (for testing/recovery)
    pub fn with_randomness(fields: NoteFields, randomness: Randomness) -> Self {
        Self {
            amount: NoteValue(fields.amount),
            token_id: fields.token_id,
            owner_key: fields.owner_key,
            randomness,
            memo: fields.memo,
        }
    }

    /// Compute the commitment for this note
    pub fn commitment(&self) -> Commitment {
        commitment_of(self)
    }

    /// Derive the nullifier revealed when this note is spent
    pub fn nullifier(&self) -> Nullifier {
        derive_nullifier(&self.owner_key, &self.randomness, &self.token_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_std::rand::rngs::OsRng;

    fn fields() -> NoteFields {
        NoteFields {
            amount: 1000,
            token_id: TokenId(Field::from_u64(3)),
            owner_key: Field::from_u64(1),
            memo: None,
        }
    }

    #[test]
    fn test_build_samples_fresh_randomness() {
        let mut rng = OsRng;
        let n1 = Note::build(fields(), &mut rng);
        let n2 = Note::build(fields(), &mut rng);

        assert_ne!(n1.randomness.r, n2.randomness.r);
        assert_ne!(n1.commitment(), n2.commitment());
        assert!(n1.randomness.s.is_none());
    }

    #[test]
    fn test_note_commitment() {
        let note = Note::build(fields(), &mut OsRng);
        assert_eq!(note.commitment(), note.commitment(), "commitment should be deterministic");
    }

    #[test]
    fn test_nullifier_invariant() {
        let note = Note::with_randomness(fields(), Randomness::new(Field::from_u64(9)));
        let copy = Note::with_randomness(fields(), Randomness::new(Field::from_u64(9)));
        assert_eq!(note.nullifier(), copy.nullifier());
    }

    #[test]
    fn test_note_json_shape() {
        let note = Note::with_randomness(fields(), Randomness::new(Field::from_u64(9)));
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["amount"], "1000");
        assert_eq!(json["randomness"]["r"], Field::from_u64(9).to_hex());
        assert!(json.get("memo").is_none());

        let back: Note = serde_json::from_value(json).unwrap();
        assert_eq!(back, note);
    }

    #[test]
    fn test_note_json_full_u128_range() {
        let mut big = fields();
        big.amount = u128::MAX;
        let note = Note::with_randomness(big, Randomness::new(Field::from_u64(9)));

        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["amount"], u128::MAX.to_string());
        let back: Note = serde_json::from_value(json).unwrap();
        assert_eq!(back.amount, NoteValue::MAX);
    }

    #[test]
    fn test_note_value_reads_integer_or_string() {
        assert_eq!(serde_json::from_str::<NoteValue>("42").unwrap(), NoteValue::new(42));
        assert_eq!(
            serde_json::from_str::<NoteValue>("\"18446744073709551616\"").unwrap(),
            NoteValue::new(1 << 64)
        );
        assert!(serde_json::from_str::<NoteValue>("\"-1\"").is_err());
        assert!(serde_json::from_str::<NoteValue>("\"0x10\"").is_err());
        assert!(serde_json::from_str::<NoteValue>("-1").is_err());
    }

    #[test]
    fn test_note_value_checked_ops() {
        let v1 = NoteValue::new(100);
        let v2 = NoteValue::new(50);

        assert_eq!(v1.checked_add(v2), Some(NoteValue::new(150)));
        assert_eq!(v1.checked_sub(v2), Some(NoteValue::new(50)));
        assert_eq!(v2.checked_sub(v1), None); // Underflow
        assert_eq!(NoteValue::MAX.checked_add(NoteValue::new(1)), None); // Overflow
    }
}
