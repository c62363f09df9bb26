//! Deterministic zkLogin address derivation from identity claims and salt.

use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::poseidon::{
    hash_ascii_str_to_field, parse_field_element, poseidon_hash, MAX_AUD_VALUE_LENGTH,
    MAX_KEY_CLAIM_NAME_LENGTH, MAX_KEY_CLAIM_VALUE_LENGTH,
};
use crate::{blake2b256, AuthError, IdentityClaims, OidcProvider, KEY_CLAIM_NAME, ZKLOGIN_FLAG};

/// 32-byte Sui address, rendered as `0x`-prefixed lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SuiAddress([u8; 32]);

impl SuiAddress {
    pub const LENGTH: usize = 32;

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for SuiAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for SuiAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SuiAddress({self})")
    }
}

impl FromStr for SuiAddress {
    type Err = AuthError;

    /// Accepts `0x`-prefixed or bare hex; short forms are left-padded with zeros.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches("0x");
        if digits.is_empty() || digits.len() > Self::LENGTH * 2 {
            return Err(AuthError::InvalidInput(format!("invalid address {s:?}")));
        }
        let padded = format!("{digits:0>64}");
        let bytes = hex::decode(&padded)
            .map_err(|e| AuthError::InvalidInput(format!("invalid address {s:?}: {e}")))?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl Serialize for SuiAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SuiAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Address plus the seed committed inside the zero-knowledge proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedIdentity {
    pub address: SuiAddress,
    /// Decimal field element; goes into the composite credential.
    pub address_seed: String,
}

/// `poseidon([H(name), H(value), H(aud), poseidon([salt])])`.
pub fn gen_address_seed(
    salt: &str,
    claim_name: &str,
    claim_value: &str,
    aud: &str,
) -> Result<BigUint, AuthError> {
    let salt = parse_field_element(salt)?;
    poseidon_hash(&[
        hash_ascii_str_to_field(claim_name, MAX_KEY_CLAIM_NAME_LENGTH)?,
        hash_ascii_str_to_field(claim_value, MAX_KEY_CLAIM_VALUE_LENGTH)?,
        hash_ascii_str_to_field(aud, MAX_AUD_VALUE_LENGTH)?,
        poseidon_hash(&[salt])?,
    ])
}

/// `blake2b256(0x05 || len(iss) || iss || seed_be32)`.
pub fn address_from_seed(address_seed: &BigUint, iss: &str) -> Result<SuiAddress, AuthError> {
    let iss_bytes = iss.as_bytes();
    let iss_len = u8::try_from(iss_bytes.len())
        .map_err(|_| AuthError::InvalidInput("issuer longer than 255 bytes".into()))?;

    let seed = address_seed.to_bytes_be();
    if seed.len() > 32 {
        return Err(AuthError::InvalidInput("address seed wider than 32 bytes".into()));
    }
    let mut seed_be = [0u8; 32];
    seed_be[32 - seed.len()..].copy_from_slice(&seed);

    Ok(SuiAddress::new(blake2b256(&[
        &[ZKLOGIN_FLAG, iss_len][..],
        iss_bytes,
        &seed_be[..],
    ])))
}

/// Derive the stable address for `claims` under `provider`.
///
/// Audience and issuer come from the provider's canonical values, never the
/// token: token encodings of `aud`/`iss` vary across requests and providers,
/// and any variation would silently move the address.
pub fn derive_identity(
    claims: &IdentityClaims,
    salt: &str,
    provider: &OidcProvider,
) -> Result<DerivedIdentity, AuthError> {
    let aud = provider.canonical_audience_for(claims)?;
    let iss = provider.canonical_issuer_for(claims)?;

    let seed = gen_address_seed(salt, KEY_CLAIM_NAME, &claims.sub, aud)?;
    let address = address_from_seed(&seed, iss)?;

    Ok(DerivedIdentity {
        address,
        address_seed: seed.to_str_radix(10),
    })
}
