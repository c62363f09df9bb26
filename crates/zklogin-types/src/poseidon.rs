//! Poseidon over the BN254 scalar field (circom parameters) and the
//! string hash-to-field used for claim commitments.

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use light_poseidon::{Poseidon, PoseidonHasher};
use num_bigint::BigUint;
use std::sync::OnceLock;

use crate::AuthError;

/// Widest circom instance available.
const MAX_POSEIDON_INPUTS: usize = 12;

/// 248 bits per packed chunk keeps every chunk below the modulus.
const PACK_WIDTH_BYTES: usize = 31;

pub const MAX_KEY_CLAIM_NAME_LENGTH: usize = 32;
pub const MAX_KEY_CLAIM_VALUE_LENGTH: usize = 115;
pub const MAX_AUD_VALUE_LENGTH: usize = 145;

fn modulus() -> &'static BigUint {
    static MODULUS: OnceLock<BigUint> = OnceLock::new();
    MODULUS.get_or_init(|| BigUint::from_bytes_be(&Fr::MODULUS.to_bytes_be()))
}

/// Parse a decimal string into a field element. Values >= modulus are rejected.
pub fn parse_field_element(value: &str) -> Result<BigUint, AuthError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AuthError::InvalidInput(format!(
            "expected a decimal integer, got {value:?}"
        )));
    }
    let parsed = BigUint::parse_bytes(trimmed.as_bytes(), 10)
        .ok_or_else(|| AuthError::InvalidInput(format!("invalid decimal integer {value:?}")))?;
    if &parsed >= modulus() {
        return Err(AuthError::InvalidInput(
            "value exceeds the BN254 scalar field".into(),
        ));
    }
    Ok(parsed)
}

fn to_field(value: &BigUint) -> Result<Fr, AuthError> {
    if value >= modulus() {
        return Err(AuthError::InvalidInput(
            "poseidon input exceeds the BN254 scalar field".into(),
        ));
    }
    Ok(Fr::from_be_bytes_mod_order(&value.to_bytes_be()))
}

/// Circom-compatible Poseidon hash of 1..=12 field elements.
pub fn poseidon_hash(inputs: &[BigUint]) -> Result<BigUint, AuthError> {
    if inputs.is_empty() || inputs.len() > MAX_POSEIDON_INPUTS {
        return Err(AuthError::InvalidInput(format!(
            "poseidon accepts 1..={MAX_POSEIDON_INPUTS} inputs, got {}",
            inputs.len()
        )));
    }
    let elements = inputs.iter().map(to_field).collect::<Result<Vec<_>, _>>()?;

    let mut hasher = Poseidon::<Fr>::new_circom(elements.len())
        .map_err(|e| AuthError::InvalidInput(format!("poseidon parameters: {e}")))?;
    let digest = hasher
        .hash(&elements)
        .map_err(|e| AuthError::InvalidInput(format!("poseidon hash: {e}")))?;

    Ok(BigUint::from_bytes_be(&digest.into_bigint().to_bytes_be()))
}

/// Zero-pad `value` to `max_len` bytes, pack into 31-byte big-endian chunks
/// taken from the tail (only the leading chunk may be short), then hash.
pub fn hash_ascii_str_to_field(value: &str, max_len: usize) -> Result<BigUint, AuthError> {
    let bytes = value.as_bytes();
    if bytes.len() > max_len {
        return Err(AuthError::InvalidInput(format!(
            "string of {} bytes exceeds max length {max_len}",
            bytes.len()
        )));
    }

    let mut padded = bytes.to_vec();
    padded.resize(max_len, 0);

    let chunks: Vec<BigUint> = padded
        .rchunks(PACK_WIDTH_BYTES)
        .rev()
        .map(BigUint::from_bytes_be)
        .collect();

    poseidon_hash(&chunks)
}
