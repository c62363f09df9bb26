//! Binding of an ephemeral key, epoch bound and randomness into the
//! one-time nonce carried by the identity token.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::VerifyingKey;
use num_bigint::BigUint;
use rand::RngCore;

use crate::poseidon::{parse_field_element, poseidon_hash};
use crate::{sui_public_key_bytes, AuthError};

/// base64url of 20 bytes, unpadded.
pub const NONCE_LENGTH: usize = 27;

const NONCE_BYTES: usize = 20;
const RANDOMNESS_BYTES: usize = 16;

/// 128 bits of randomness as a decimal string.
pub fn generate_randomness() -> String {
    let mut bytes = [0u8; RANDOMNESS_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    BigUint::from_bytes_be(&bytes).to_str_radix(10)
}

/// `poseidon([pk_hi, pk_lo, max_epoch, randomness])`, low 20 bytes, base64url.
///
/// `pk` is the 33-byte flagged public key split at bit 128 so both halves
/// fit the field.
pub fn generate_nonce(
    public_key: &VerifyingKey,
    max_epoch: u64,
    randomness: &str,
) -> Result<String, AuthError> {
    let extended = BigUint::from_bytes_be(&sui_public_key_bytes(public_key));
    let pk_hi = &extended >> 128u32;
    let pk_lo = &extended & ((BigUint::from(1u8) << 128u32) - 1u8);

    let digest = poseidon_hash(&[
        pk_hi,
        pk_lo,
        BigUint::from(max_epoch),
        parse_field_element(randomness)?,
    ])?;

    let be = digest.to_bytes_be();
    let take = be.len().min(NONCE_BYTES);
    let mut low = [0u8; NONCE_BYTES];
    low[NONCE_BYTES - take..].copy_from_slice(&be[be.len() - take..]);

    let nonce = URL_SAFE_NO_PAD.encode(low);
    debug_assert_eq!(nonce.len(), NONCE_LENGTH);
    Ok(nonce)
}
