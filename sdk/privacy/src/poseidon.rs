//! Poseidon Hash
//!
//! The single field hash used for commitments, nullifiers, token ids, message
//! hashes and accumulator nodes. Client and verifier must agree on it bit for
//! bit, so the parameters below are protocol constants.
//!
//! ```text
//! Hash(x_1, ..., x_n) = Poseidon.squeeze( absorb(n), absorb(x_1), ..., absorb(x_n) )
//! ```
//!
//! The arity is absorbed first, so `Hash(a)` and `Hash(a, 0)` differ.

use std::sync::OnceLock;

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    CryptographicSponge,
    poseidon::{PoseidonConfig, PoseidonSponge, find_poseidon_ark_and_mds},
};

use crate::field::Field;

/// Poseidon configuration for Shade
///
/// Field: BN254 Fr (254 bits)
/// Rate: 2, Capacity: 1
/// Security: 128 bits
pub fn poseidon_config() -> &'static PoseidonConfig<Fr> {
    static CONFIG: OnceLock<PoseidonConfig<Fr>> = OnceLock::new();

    CONFIG.get_or_init(|| {
        let prime_bits: u64 = 254;
        let rate: usize = 2;
        let capacity: usize = 1;
        let full_rounds: usize = 8;
        let partial_rounds: usize = 57;
        let alpha: u64 = 5;
        let skip_matrices: u64 = 0;

        let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
            prime_bits,
            rate,
            full_rounds as u64,
            partial_rounds as u64,
            skip_matrices,
        );

        PoseidonConfig::new(full_rounds, partial_rounds, alpha, mds, ark, rate, capacity)
    })
}

/// Hash any number of field elements into one.
pub fn hash(inputs: &[Field]) -> Field {
    let mut sponge = PoseidonSponge::new(poseidon_config());

    sponge.absorb(&Fr::from(inputs.len() as u64));
    for input in inputs {
        sponge.absorb(&input.to_fr());
    }

    let out: Vec<Fr> = sponge.squeeze_field_elements(1);
    Field::from_fr(out[0])
}

/// Hash a node pair. Used by the accumulator.
pub fn hash_pair(left: &Field, right: &Field) -> Field {
    hash(&[*left, *right])
}
