//! Field Elements
//!
//! Every value that is hashed, stored or compared lives in the scalar field
//! of BN254, the curve used by the proof system.
//!
//! ```text
//! external input                 canonical form
//! ──────────────                 ──────────────
//! "0xAB"            ─┐
//! "171"             ─┼─▶ Field ─▶ "0x00..00ab" (32 bytes, big-endian, lowercase)
//! 171u64 / BigUint  ─┘
//! ```
//!
//! Parsing is strict: hex requires the `0x` prefix, decimal allows digits
//! only, and values at or above the modulus are rejected. Callers that want
//! modular reduction ask for it explicitly with [`Field::reduce`].

use core::fmt;
use core::str::FromStr;
use std::sync::OnceLock;

use ark_bn254::Fr;
use ark_ff::{AdditiveGroup, BigInteger, Field as _, PrimeField};
use ark_std::UniformRand;
use ark_std::rand::Rng;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::{PrivacyError, Result};

/// Byte length of a serialized field element.
pub const FIELD_BYTES: usize = 32;

const HEX_DIGITS: usize = FIELD_BYTES * 2;

/// A canonically reduced element of the BN254 scalar field.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Field(Fr);

fn modulus() -> &'static BigUint {
    static MODULUS: OnceLock<BigUint> = OnceLock::new();
    MODULUS.get_or_init(|| BigUint::from_bytes_be(&Fr::MODULUS.to_bytes_be()))
}

impl Field {
    pub const ZERO: Self = Self(Fr::ZERO);
    pub const ONE: Self = Self(Fr::ONE);

    /// Wrap an arkworks field element.
    pub fn from_fr(value: Fr) -> Self {
        Self(value)
    }

    /// The underlying arkworks element.
    pub fn to_fr(self) -> Fr {
        self.0
    }

    pub fn from_u64(value: u64) -> Self {
        Self(Fr::from(value))
    }

    pub fn from_u128(value: u128) -> Self {
        Self(Fr::from(value))
    }

    /// Reduce an arbitrary non-negative integer modulo `p`.
    pub fn reduce(value: &BigUint) -> Self {
        Self(Fr::from_be_bytes_mod_order(&value.to_bytes_be()))
    }

    /// Reduce big-endian bytes of any length modulo `p`.
    pub fn from_bytes_be_mod_order(bytes: &[u8]) -> Self {
        Self(Fr::from_be_bytes_mod_order(bytes))
    }

    /// Strict conversion: fails unless `value < p`.
    pub fn from_biguint(value: &BigUint) -> Result<Self> {
        if value >= modulus() {
            return Err(PrivacyError::FieldOutOfRange(value.to_string()));
        }
        Ok(Self::reduce(value))
    }

    /// Strict conversion from the canonical 32-byte big-endian encoding.
    pub fn from_bytes_be(bytes: &[u8; FIELD_BYTES]) -> Result<Self> {
        Self::from_biguint(&BigUint::from_bytes_be(bytes))
    }

    /// Sample uniformly over the field.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(Fr::rand(rng))
    }

    /// Parse `0x`-prefixed hex (either case, at most 64 digits).
    pub fn parse_hex(input: &str) -> Result<Self> {
        let digits = input
            .strip_prefix("0x")
            .or_else(|| input.strip_prefix("0X"))
            .ok_or_else(|| invalid(input, "missing 0x prefix"))?;

        if digits.is_empty() {
            return Err(invalid(input, "no hex digits"));
        }
        if digits.len() > HEX_DIGITS {
            return Err(invalid(input, "more than 64 hex digits"));
        }
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid(input, "non-hex character"));
        }

        let value = BigUint::parse_bytes(digits.as_bytes(), 16)
            .ok_or_else(|| invalid(input, "unparseable hex"))?;
        Self::from_biguint(&value)
    }

    /// Parse an unsigned decimal integer.
    pub fn parse_decimal(input: &str) -> Result<Self> {
        if input.is_empty() {
            return Err(invalid(input, "empty string"));
        }
        if !input.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid(input, "non-decimal character"));
        }

        let value = BigUint::parse_bytes(input.as_bytes(), 10)
            .ok_or_else(|| invalid(input, "unparseable decimal"))?;
        Self::from_biguint(&value)
    }

    /// Canonical 32-byte big-endian encoding.
    pub fn to_bytes_be(&self) -> [u8; FIELD_BYTES] {
        let bytes = self.0.into_bigint().to_bytes_be();
        let mut out = [0u8; FIELD_BYTES];
        out[FIELD_BYTES - bytes.len()..].copy_from_slice(&bytes);
        out
    }

    /// Canonical boundary form: `0x` + 64 lowercase hex digits.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes_be()))
    }

    pub fn to_decimal(&self) -> String {
        self.to_biguint().to_string()
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.to_bytes_be())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == Fr::ZERO
    }
}

/// Canonicalize case and zero padding of a hex field value.
pub fn normalize_hex(input: &str) -> Result<String> {
    Field::parse_hex(input).map(|f| f.to_hex())
}

fn invalid(input: &str, reason: &'static str) -> PrivacyError {
    PrivacyError::InvalidField {
        input: input.to_string(),
        reason,
    }
}

impl FromStr for Field {
    type Err = PrivacyError;

    /// Hex when `0x`-prefixed, decimal otherwise. Anything else is rejected.
    fn from_str(s: &str) -> Result<Self> {
        if s.starts_with("0x") || s.starts_with("0X") {
            Self::parse_hex(s)
        } else {
            Self::parse_decimal(s)
        }
    }
}

impl TryFrom<String> for Field {
    type Error = PrivacyError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl TryFrom<&str> for Field {
    type Error = PrivacyError;

    fn try_from(value: &str) -> Result<Self> {
        value.parse()
    }
}

impl From<Field> for String {
    fn from(value: Field) -> Self {
        value.to_hex()
    }
}

impl From<Fr> for Field {
    fn from(value: Fr) -> Self {
        Self(value)
    }
}

impl From<u64> for Field {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl From<u128> for Field {
    fn from(value: u128) -> Self {
        Self::from_u128(value)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Field({})", self.to_hex())
    }
}
