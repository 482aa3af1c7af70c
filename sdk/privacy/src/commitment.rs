//! Note Commitments
//!
//! Implements Poseidon-based commitments for notes.
//!
//! ```text
//! Commitment = Hash(amount, owner_key, r, token_id, memo)
//! ```
//!
//! The input order is fixed and must match the verifier's circuit exactly.
//! An absent memo commits as zero.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::field::Field;
use crate::note::Note;
use crate::poseidon;

/// A note commitment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Commitment(pub Field);

impl Commitment {
    pub fn to_field(&self) -> Field {
        self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Compute the commitment of a note.
pub fn commitment_of(note: &Note) -> Commitment {
    let inputs = [
        Field::from_u128(note.amount.as_u128()),
        note.owner_key,
        note.randomness.r,
        note.token_id.to_field(),
        note.memo.unwrap_or(Field::ZERO),
    ];
    Commitment(poseidon::hash(&inputs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::{NoteFields, Randomness};
    use crate::token::TokenId;

    fn fields(amount: u128) -> NoteFields {
        NoteFields {
            amount,
            token_id: TokenId(Field::from_u64(77)),
            owner_key: Field::from_u64(5),
            memo: None,
        }
    }

    #[test]
    fn test_commitment_deterministic() {
        let note = Note::with_randomness(fields(1000), Randomness::new(Field::from_u64(42)));
        assert_eq!(commitment_of(&note), commitment_of(&note.clone()));
    }

    #[test]
    fn test_commitment_field_order() {
        let note = Note::with_randomness(fields(1000), Randomness::new(Field::from_u64(42)));
        let expected = poseidon::hash(&[
            Field::from_u64(1000),
            Field::from_u64(5),
            Field::from_u64(42),
            Field::from_u64(77),
            Field::ZERO,
        ]);
        assert_eq!(commitment_of(&note).0, expected);
    }

    #[test]
    fn test_commitment_hiding() {
        let c1 = commitment_of(&Note::with_randomness(fields(1000), Randomness::new(Field::from_u64(1))));
        let c2 = commitment_of(&Note::with_randomness(fields(1000), Randomness::new(Field::from_u64(2))));
        assert_ne!(c1, c2, "different randomness should produce different commitments");
    }

    #[test]
    fn test_commitment_binding() {
        let r = Randomness::new(Field::from_u64(42));
        let c1 = commitment_of(&Note::with_randomness(fields(1000), r));
        let c2 = commitment_of(&Note::with_randomness(fields(2000), r));
        assert_ne!(c1, c2, "different values should produce different commitments");

        let mut with_memo = fields(1000);
        with_memo.memo = Some(Field::from_u64(3));
        let c3 = commitment_of(&Note::with_randomness(with_memo, r));
        assert_ne!(c1, c3, "memo is committed");
    }
}
