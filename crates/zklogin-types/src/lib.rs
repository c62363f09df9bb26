//! Shared types and pure-logic primitives for Sui zkLogin.
//! No I/O: usable by clients, relayers and tests alike.

mod address;
mod claims;
mod crypto;
mod error;
mod nonce;
mod poseidon;
mod provider;
mod signature;

pub use address::{address_from_seed, derive_identity, gen_address_seed, DerivedIdentity, SuiAddress};
pub use claims::{decode_claims, Audience, IdentityClaims};
pub use crypto::{
    blake2b256, decode_sui_private_key, ed25519_address, ed25519_public_key_bytes,
    encode_sui_private_key, extended_public_key_base64, intent_digest, sign_transaction,
    sui_public_key_bytes, transaction_digest, verify_transaction_signature, ED25519_FLAG,
    SUI_PRIVATE_KEY_PREFIX, ZKLOGIN_FLAG,
};
pub use error::AuthError;
pub use nonce::{generate_nonce, generate_randomness, NONCE_LENGTH};
pub use poseidon::{
    hash_ascii_str_to_field, parse_field_element, poseidon_hash, MAX_AUD_VALUE_LENGTH,
    MAX_KEY_CLAIM_NAME_LENGTH, MAX_KEY_CLAIM_VALUE_LENGTH,
};
pub use provider::{normalize_issuer, OidcProvider, GOOGLE_AUTH_ENDPOINT, GOOGLE_ISSUER, KEY_CLAIM_NAME};
pub use signature::{zklogin_signature, IssBase64Details, ProofPoints, ZkProof};
