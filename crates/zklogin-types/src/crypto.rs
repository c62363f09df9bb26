//! Ed25519 key encoding, Sui intent signing and digest helpers.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use bech32::{Bech32, Hrp};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::{AuthError, SuiAddress};

/// Signature scheme flag for Ed25519.
pub const ED25519_FLAG: u8 = 0x00;
/// Signature scheme flag for zkLogin composite credentials.
pub const ZKLOGIN_FLAG: u8 = 0x05;
/// Bech32 human-readable part of exported Sui private keys.
pub const SUI_PRIVATE_KEY_PREFIX: &str = "suiprivkey";

/// Intent prefix for `TransactionData`: scope 0, version 0, app id 0 (Sui).
const TRANSACTION_INTENT: [u8; 3] = [0, 0, 0];
const TRANSACTION_DIGEST_SALT: &[u8] = b"TransactionData::";

/// Serialized Ed25519 signature: flag + 64-byte signature + 32-byte key.
const SERIALIZED_SIGNATURE_LEN: usize = 1 + 64 + 32;

/// Blake2b with a 32-byte output over the concatenation of `parts`.
pub fn blake2b256(parts: &[&[u8]]) -> [u8; 32] {
    let mut state = blake2b_simd::Params::new().hash_length(32).to_state();
    for part in parts {
        state.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(state.finalize().as_bytes());
    out
}

/// Extract 32 raw ed25519 public key bytes.
/// Accepts 32-byte (raw) or 33-byte (flag prefix + key) input.
pub fn ed25519_public_key_bytes(pk_raw: &[u8]) -> Result<[u8; 32], AuthError> {
    let raw = match pk_raw.len() {
        32 => pk_raw,
        33 if pk_raw[0] == ED25519_FLAG => &pk_raw[1..],
        _ => {
            return Err(AuthError::InvalidInput(
                "Invalid ed25519 public key bytes".into(),
            ))
        }
    };
    raw.try_into()
        .map_err(|_| AuthError::InvalidInput("Invalid ed25519 public key bytes".into()))
}

/// `flag || pk` as used for addresses and the prover's extended key.
pub fn sui_public_key_bytes(public_key: &VerifyingKey) -> [u8; 33] {
    let mut out = [0u8; 33];
    out[0] = ED25519_FLAG;
    out[1..].copy_from_slice(public_key.as_bytes());
    out
}

/// Base64 of `flag || pk`, the prover's `extendedEphemeralPublicKey`.
pub fn extended_public_key_base64(public_key: &VerifyingKey) -> String {
    B64.encode(sui_public_key_bytes(public_key))
}

/// Address owned by a plain Ed25519 key.
pub fn ed25519_address(public_key: &VerifyingKey) -> SuiAddress {
    SuiAddress::new(blake2b256(&[&sui_public_key_bytes(public_key)[..]]))
}

/// Digest actually signed for a transaction: `blake2b256(intent || tx_bytes)`.
pub fn intent_digest(tx_bytes: &[u8]) -> [u8; 32] {
    blake2b256(&[&TRANSACTION_INTENT[..], tx_bytes])
}

/// Network transaction digest, base58.
pub fn transaction_digest(tx_bytes: &[u8]) -> String {
    bs58::encode(blake2b256(&[TRANSACTION_DIGEST_SALT, tx_bytes])).into_string()
}

/// Sign transaction bytes. Returns the base64 serialized signature.
pub fn sign_transaction(key: &SigningKey, tx_bytes: &[u8]) -> String {
    let signature = key.sign(&intent_digest(tx_bytes));
    let mut out = Vec::with_capacity(SERIALIZED_SIGNATURE_LEN);
    out.push(ED25519_FLAG);
    out.extend_from_slice(&signature.to_bytes());
    out.extend_from_slice(key.verifying_key().as_bytes());
    B64.encode(out)
}

/// Verify a serialized Ed25519 signature over `tx_bytes`; returns the signer's key.
pub fn verify_transaction_signature(
    serialized: &str,
    tx_bytes: &[u8],
) -> Result<VerifyingKey, AuthError> {
    let raw = B64
        .decode(serialized)
        .map_err(|e| AuthError::InvalidInput(format!("signature is not base64: {e}")))?;
    if raw.len() != SERIALIZED_SIGNATURE_LEN || raw[0] != ED25519_FLAG {
        return Err(AuthError::InvalidInput(
            "not a serialized ed25519 signature".into(),
        ));
    }

    let sig_bytes: [u8; 64] = raw[1..65]
        .try_into()
        .map_err(|_| AuthError::InvalidInput("Invalid ed25519 signature bytes".into()))?;
    let pk_bytes = ed25519_public_key_bytes(&raw[65..])?;
    let public_key = VerifyingKey::from_bytes(&pk_bytes)
        .map_err(|e| AuthError::InvalidInput(format!("invalid ed25519 public key: {e}")))?;

    public_key
        .verify(&intent_digest(tx_bytes), &Signature::from_bytes(&sig_bytes))
        .map_err(|_| AuthError::InvalidInput("signature does not match transaction".into()))?;
    Ok(public_key)
}

/// Export as `suiprivkey1…` (bech32 of `flag || secret`).
pub fn encode_sui_private_key(key: &SigningKey) -> Result<String, AuthError> {
    let hrp = Hrp::parse(SUI_PRIVATE_KEY_PREFIX)
        .map_err(|e| AuthError::InvalidInput(format!("bech32 prefix: {e}")))?;
    let mut data = Vec::with_capacity(33);
    data.push(ED25519_FLAG);
    data.extend_from_slice(&key.to_bytes());
    bech32::encode::<Bech32>(hrp, &data)
        .map_err(|e| AuthError::InvalidInput(format!("bech32 encode: {e}")))
}

/// Decode a `suiprivkey1…` bech32 key or a 32-byte hex secret (optional `0x`).
pub fn decode_sui_private_key(encoded: &str) -> Result<SigningKey, AuthError> {
    let encoded = encoded.trim();
    if encoded.is_empty() {
        return Err(AuthError::InvalidInput("private key is empty".into()));
    }

    let secret: [u8; 32] = if encoded.starts_with(SUI_PRIVATE_KEY_PREFIX) {
        let (hrp, data) = bech32::decode(encoded)
            .map_err(|e| AuthError::InvalidInput(format!("bech32 decode: {e}")))?;
        if !hrp.as_str().eq_ignore_ascii_case(SUI_PRIVATE_KEY_PREFIX) {
            return Err(AuthError::InvalidInput(format!(
                "unexpected key prefix {}",
                hrp.as_str()
            )));
        }
        match data.split_first() {
            Some((&ED25519_FLAG, rest)) => rest.try_into().map_err(|_| {
                AuthError::InvalidInput("ed25519 secret must be 32 bytes".into())
            })?,
            Some((flag, _)) => {
                return Err(AuthError::InvalidInput(format!(
                    "unsupported key scheme flag {flag:#04x}"
                )))
            }
            None => return Err(AuthError::InvalidInput("empty bech32 payload".into())),
        }
    } else {
        let bytes = hex::decode(encoded.trim_start_matches("0x"))
            .map_err(|e| AuthError::InvalidInput(format!("private key is not hex: {e}")))?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| AuthError::InvalidInput("ed25519 secret must be 32 bytes".into()))?
    };

    Ok(SigningKey::from_bytes(&secret))
}
