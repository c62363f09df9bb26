//! Sponsor signing key: the long-lived fee payer principal.

use ed25519_dalek::SigningKey;
use zklogin_types::{decode_sui_private_key, ed25519_address, sign_transaction, SuiAddress};

/// Local Ed25519 sponsor key with its derived address.
pub struct SponsorSigner {
    key: SigningKey,
    address: SuiAddress,
}

impl SponsorSigner {
    pub fn new(key: SigningKey) -> Self {
        let address = ed25519_address(&key.verifying_key());
        Self { key, address }
    }

    /// Parse a `suiprivkey1…` or hex secret.
    pub fn from_secret(secret: &str) -> Result<Self, crate::Error> {
        decode_sui_private_key(secret)
            .map(Self::new)
            .map_err(|e| crate::Error::SponsorKeyUnavailable(e.to_string()))
    }

    pub fn address(&self) -> SuiAddress {
        self.address
    }

    /// Sign transaction bytes; returns the base64 serialized signature.
    pub fn sign(&self, tx_bytes: &[u8]) -> String {
        sign_transaction(&self.key, tx_bytes)
    }
}

impl std::fmt::Debug for SponsorSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SponsorSigner({})", self.address)
    }
}
