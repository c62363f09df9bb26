//! Ephemeral session lifecycle: one live session per context, stored in a
//! single slot. A new `start` silently replaces the previous attempt.

use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};
use zklogin_types::{
    decode_sui_private_key, encode_sui_private_key, extended_public_key_base64, generate_nonce,
    generate_randomness, AuthError,
};

use crate::store::BlobStore;

/// Slot key of the transient session record.
pub const SESSION_KEY: &str = "zklogin/session";

/// Epochs of look-ahead bounding proof validity.
pub const DEFAULT_EPOCH_LOOKAHEAD: u64 = 2;

/// Per-attempt key material bound into the nonce.
#[derive(Clone)]
pub struct EphemeralSession {
    signing_key: SigningKey,
    randomness: String,
    max_epoch: u64,
    nonce: String,
}

impl EphemeralSession {
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Base64 `flag || pk`, as sent to the prover.
    pub fn extended_public_key(&self) -> String {
        extended_public_key_base64(&self.public_key())
    }

    pub fn randomness(&self) -> &str {
        &self.randomness
    }

    pub fn max_epoch(&self) -> u64 {
        self.max_epoch
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Consume the session, keeping only the signing key.
    pub fn into_signing_key(self) -> SigningKey {
        self.signing_key
    }
}

impl std::fmt::Debug for EphemeralSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralSession")
            .field("public_key", &self.extended_public_key())
            .field("max_epoch", &self.max_epoch)
            .field("nonce", &self.nonce)
            .finish_non_exhaustive()
    }
}

/// Stored layout of the session slot.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
struct SessionRecord {
    ephemeral_private_key: String,
    randomness: String,
    max_epoch: u64,
    nonce: String,
}

impl SessionRecord {
    fn encode(session: &EphemeralSession) -> Result<Vec<u8>, AuthError> {
        let record = SessionRecord {
            ephemeral_private_key: encode_sui_private_key(&session.signing_key)?,
            randomness: session.randomness.clone(),
            max_epoch: session.max_epoch,
            nonce: session.nonce.clone(),
        };
        serde_json::to_vec(&record)
            .map_err(|e| AuthError::Storage(format!("Failed to serialize session: {e}")))
    }

    fn decode(bytes: &[u8]) -> Result<EphemeralSession, AuthError> {
        let record: SessionRecord = serde_json::from_slice(bytes)
            .map_err(|e| AuthError::Storage(format!("Failed to parse session: {e}")))?;
        let signing_key = decode_sui_private_key(&record.ephemeral_private_key)
            .map_err(|e| AuthError::Storage(format!("Corrupt session key: {e}")))?;
        Ok(EphemeralSession {
            signing_key,
            randomness: record.randomness.clone(),
            max_epoch: record.max_epoch,
            nonce: record.nonce.clone(),
        })
    }
}

/// Owns the single session slot of a store.
pub struct SessionManager<S> {
    store: S,
    epoch_lookahead: u64,
}

impl<S: BlobStore> SessionManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            epoch_lookahead: DEFAULT_EPOCH_LOOKAHEAD,
        }
    }

    pub fn with_epoch_lookahead(mut self, epochs: u64) -> Self {
        self.epoch_lookahead = epochs;
        self
    }

    pub fn epoch_lookahead(&self) -> u64 {
        self.epoch_lookahead
    }

    /// Create and persist a fresh session. Exactly one store write, no network.
    pub fn start(&self, current_epoch: u64) -> Result<EphemeralSession, AuthError> {
        let max_epoch = current_epoch
            .checked_add(self.epoch_lookahead)
            .ok_or_else(|| AuthError::InvalidInput("epoch bound overflows u64".into()))?;

        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        let randomness = generate_randomness();
        let nonce = generate_nonce(&signing_key.verifying_key(), max_epoch, &randomness)?;

        let session = EphemeralSession {
            signing_key,
            randomness,
            max_epoch,
            nonce,
        };
        self.store.put(SESSION_KEY, &SessionRecord::encode(&session)?)?;

        info!(max_epoch, nonce = %session.nonce, "Ephemeral session started");
        Ok(session)
    }

    /// Load the live session; `SessionExpired` if none exists in this context.
    pub fn load(&self) -> Result<EphemeralSession, AuthError> {
        match self.store.get(SESSION_KEY)? {
            Some(bytes) => SessionRecord::decode(&bytes),
            None => Err(AuthError::SessionExpired),
        }
    }

    /// Destroy the session. Clearing an empty slot is a no-op.
    pub fn clear(&self) -> Result<(), AuthError> {
        self.store.delete(SESSION_KEY)?;
        debug!("Ephemeral session cleared");
        Ok(())
    }
}
