//! Nullifiers
//!
//! Implements nullifier derivation for double-spend prevention.
//!
//! ```text
//! Nullifier = Hash(owner_key, r, token_id)
//! ```
//!
//! `r` never leaves the note holder, so only they can compute it. Once a
//! nullifier is published, the corresponding note cannot be spent again.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PrivacyError, Result};
use crate::field::Field;
use crate::note::Randomness;
use crate::poseidon;
use crate::token::TokenId;

/// A nullifier - unique tag for a spent note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nullifier(pub Field);

impl Nullifier {
    pub fn to_field(&self) -> Field {
        self.0
    }

    /// Canonical hex form, used as the cache and ledger lookup key.
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes_be()
    }

    /// Parse a `0x`-prefixed hex nullifier, normalizing case and padding.
    pub fn from_hex(input: &str) -> Result<Self> {
        Field::parse_hex(input).map(Self)
    }
}

impl FromStr for Nullifier {
    type Err = PrivacyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Derive the nullifier of a note from its private material.
pub fn derive_nullifier(owner_key: &Field, randomness: &Randomness, token_id: &TokenId) -> Nullifier {
    Nullifier(poseidon::hash(&[*owner_key, randomness.r, token_id.to_field()]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> TokenId {
        TokenId(Field::from_u64(8))
    }

    #[test]
    fn test_nullifier_deterministic() {
        let r = Randomness::new(Field::from_u64(2));
        let n1 = derive_nullifier(&Field::from_u64(1), &r, &token());
        let n2 = derive_nullifier(&Field::from_u64(1), &r, &token());
        assert_eq!(n1, n2, "same inputs should produce same nullifier");
    }

    #[test]
    fn test_nullifier_unique_per_note() {
        let owner = Field::from_u64(1);
        let n1 = derive_nullifier(&owner, &Randomness::new(Field::from_u64(1)), &token());
        let n2 = derive_nullifier(&owner, &Randomness::new(Field::from_u64(2)), &token());
        assert_ne!(n1, n2, "different notes should have different nullifiers");
    }

    #[test]
    fn test_nullifier_binds_owner_and_token() {
        let r = Randomness::new(Field::from_u64(2));
        let base = derive_nullifier(&Field::from_u64(1), &r, &token());
        assert_ne!(base, derive_nullifier(&Field::from_u64(3), &r, &token()));
        assert_ne!(base, derive_nullifier(&Field::from_u64(1), &r, &TokenId(Field::from_u64(9))));
    }

    #[test]
    fn test_hex_lookup_key_is_normalized() {
        let n = Nullifier(Field::from_u64(0xBEEF));
        assert_eq!(Nullifier::from_hex("0xBEEF").unwrap(), n);
        assert_eq!(n.to_hex(), Nullifier::from_hex(&n.to_hex().to_uppercase().replace("0X", "0x")).unwrap().to_hex());
        assert!(Nullifier::from_hex("beef").is_err());
    }
}
