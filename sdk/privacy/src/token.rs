//! Token Identifiers
//!
//! A token id is derived only from a token descriptor:
//!
//! ```text
//! TokenId = Hash(chain_tag, decimals, C(symbol), C(lowercase(address)), chain_id_or_0)
//!
//! chain_tag: 1 = EVM, 2 = Solana
//! C:         versioned string compressor (BLAKE3 derive-key, reduced mod p)
//! ```
//!
//! The compressor context is a protocol constant. Changing it changes every
//! derived id.

use core::fmt;
use core::str::FromStr;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{PrivacyError, Result};
use crate::field::Field;
use crate::poseidon;

/// Version of the string compressor used in token ids.
pub const TOKEN_COMPRESSOR_VERSION: u32 = 1;

/// BLAKE3 derive-key context for [`TOKEN_COMPRESSOR_VERSION`] 1.
pub const TOKEN_COMPRESSOR_CONTEXT: &str = "shade token-id string compressor v1";

/// Chain a token lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Chain {
    Evm { chain_id: u64 },
    Solana,
}

impl Chain {
    pub fn tag(&self) -> u64 {
        match self {
            Chain::Evm { .. } => 1,
            Chain::Solana => 2,
        }
    }

    pub fn chain_id_or_zero(&self) -> u64 {
        match self {
            Chain::Evm { chain_id } => *chain_id,
            Chain::Solana => 0,
        }
    }
}

impl FromStr for Chain {
    type Err = PrivacyError;

    /// Accepts `evm:<chain id>` or `solana`.
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        if lower == "solana" {
            return Ok(Chain::Solana);
        }
        lower
            .strip_prefix("evm:")
            .and_then(|id| id.parse().ok())
            .map(|chain_id| Chain::Evm { chain_id })
            .ok_or_else(|| PrivacyError::InvalidChain(s.to_string()))
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chain::Evm { chain_id } => write!(f, "evm:{chain_id}"),
            Chain::Solana => f.write_str("solana"),
        }
    }
}

/// Externally supplied token description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenDescriptor {
    pub chain: Chain,
    pub symbol: String,
    pub decimals: u8,
    /// Contract address (EVM) or mint address (Solana)
    pub address: String,
}

/// Field identifier of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub Field);

impl TokenId {
    pub fn to_field(&self) -> Field {
        self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TokenId {
    type Err = PrivacyError;

    fn from_str(s: &str) -> Result<Self> {
        s.parse().map(Self)
    }
}

/// Compress a variable-length string into one field slot.
pub fn compress_str(value: &str) -> Field {
    let digest = blake3::derive_key(TOKEN_COMPRESSOR_CONTEXT, value.as_bytes());
    Field::from_bytes_be_mod_order(&digest)
}

/// Derive the token id of a descriptor.
pub fn token_id_of(descriptor: &TokenDescriptor) -> TokenId {
    let tuple = [
        Field::from_u64(descriptor.chain.tag()),
        Field::from_u64(u64::from(descriptor.decimals)),
        compress_str(&descriptor.symbol),
        compress_str(&descriptor.address.to_lowercase()),
        Field::from_u64(descriptor.chain.chain_id_or_zero()),
    ];
    TokenId(poseidon::hash(&tuple))
}

/// Known tokens, keyed by derived id.
#[derive(Debug, Default, Clone)]
pub struct TokenRegistry {
    tokens: HashMap<TokenId, TokenDescriptor>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor and return its id. Re-registering is a no-op.
    pub fn register(&mut self, descriptor: TokenDescriptor) -> TokenId {
        let id = token_id_of(&descriptor);
        self.tokens.entry(id).or_insert(descriptor);
        id
    }

    pub fn get(&self, id: &TokenId) -> Option<&TokenDescriptor> {
        self.tokens.get(id)
    }

    /// Look a token up by chain and symbol (case-insensitive symbol).
    pub fn find(&self, chain: Chain, symbol: &str) -> Option<(TokenId, &TokenDescriptor)> {
        self.tokens
            .iter()
            .find(|(_, d)| d.chain == chain && d.symbol.eq_ignore_ascii_case(symbol))
            .map(|(id, d)| (*id, d))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usdc() -> TokenDescriptor {
        TokenDescriptor {
            chain: Chain::Evm { chain_id: 1 },
            symbol: "USDC".into(),
            decimals: 6,
            address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".into(),
        }
    }

    #[test]
    fn test_token_id_deterministic() {
        assert_eq!(token_id_of(&usdc()), token_id_of(&usdc()));
    }

    #[test]
    fn test_address_case_is_canonicalized() {
        let mut lower = usdc();
        lower.address = lower.address.to_lowercase();
        assert_eq!(token_id_of(&usdc()), token_id_of(&lower));
    }

    #[test]
    fn test_every_attribute_changes_id() {
        let base = token_id_of(&usdc());

        let mut d = usdc();
        d.chain = Chain::Evm { chain_id: 137 };
        assert_ne!(token_id_of(&d), base);

        let mut d = usdc();
        d.chain = Chain::Solana;
        assert_ne!(token_id_of(&d), base);

        let mut d = usdc();
        d.symbol = "USDT".into();
        assert_ne!(token_id_of(&d), base);

        let mut d = usdc();
        d.decimals = 18;
        assert_ne!(token_id_of(&d), base);

        let mut d = usdc();
        d.address = "0xdac17f958d2ee523a2206206994597c13d831ec7".into();
        assert_ne!(token_id_of(&d), base);
    }

    #[test]
    fn test_chain_parsing() {
        assert_eq!("evm:10".parse::<Chain>().unwrap(), Chain::Evm { chain_id: 10 });
        assert_eq!("Solana".parse::<Chain>().unwrap(), Chain::Solana);
        assert!("evm:".parse::<Chain>().is_err());
        assert!("bitcoin".parse::<Chain>().is_err());
        assert_eq!(Chain::Evm { chain_id: 10 }.to_string(), "evm:10");
    }

    #[test]
    fn test_registry() {
        let mut registry = TokenRegistry::new();
        let id = registry.register(usdc());
        assert_eq!(registry.register(usdc()), id);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&id), Some(&usdc()));

        let (found, _) = registry.find(Chain::Evm { chain_id: 1 }, "usdc").unwrap();
        assert_eq!(found, id);
        assert!(registry.find(Chain::Solana, "USDC").is_none());
    }
}
