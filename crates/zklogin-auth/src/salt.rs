//! Durable per-identity salt. Losing or changing it moves the user's address.

use num_bigint::BigUint;
use rand::RngCore;
use tracing::{debug, info, warn};
use zklogin_types::{normalize_issuer, parse_field_element, AuthError};

use crate::store::{BlobStore, CasOutcome};

const SALT_KEY_PREFIX: &str = "zklogin/salt";

/// 16 random bytes as a decimal string.
pub fn generate_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    BigUint::from_bytes_be(&bytes).to_str_radix(10)
}

pub fn salt_key(issuer: &str, sub: &str) -> String {
    format!("{SALT_KEY_PREFIX}/{}/{sub}", normalize_issuer(issuer))
}

pub struct SaltManager<S> {
    store: S,
    static_salt: Option<String>,
}

impl<S: BlobStore> SaltManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            static_salt: None,
        }
    }

    /// Use one fixed salt for every identity. Never persisted.
    pub fn with_static_salt(mut self, salt: impl Into<String>) -> Result<Self, AuthError> {
        let salt = salt.into();
        parse_field_element(&salt)?;
        self.static_salt = Some(salt);
        Ok(self)
    }

    /// Stored salt for the identity, if any.
    pub fn get(&self, issuer: &str, sub: &str) -> Result<Option<String>, AuthError> {
        if let Some(salt) = &self.static_salt {
            return Ok(Some(salt.clone()));
        }
        self.store
            .get(&salt_key(issuer, sub))?
            .map(decode_salt)
            .transpose()
    }

    /// Return the identity's salt, creating it on first login.
    ///
    /// Creation is a compare-and-set against "absent": a concurrent winner's
    /// salt is adopted, never overwritten.
    pub fn get_or_create(&self, issuer: &str, sub: &str) -> Result<String, AuthError> {
        if let Some(salt) = self.get(issuer, sub)? {
            debug!(issuer, "Using existing salt");
            return Ok(salt);
        }

        let key = salt_key(issuer, sub);
        let fresh = generate_salt();
        match self.store.compare_and_swap(&key, None, fresh.as_bytes())? {
            CasOutcome::Swapped => {
                info!(issuer, "Created salt for new identity");
                Ok(fresh)
            }
            CasOutcome::Conflict(Some(winner)) => {
                warn!(issuer, "Concurrent salt creation, adopting stored salt");
                decode_salt(winner)
            }
            CasOutcome::Conflict(None) => Err(AuthError::Storage(format!(
                "salt write for {key} refused with no stored value"
            ))),
        }
    }
}

fn decode_salt(bytes: Vec<u8>) -> Result<String, AuthError> {
    let salt = String::from_utf8(bytes)
        .map_err(|_| AuthError::Storage("stored salt is not UTF-8".into()))?;
    parse_field_element(&salt)
        .map_err(|e| AuthError::Storage(format!("stored salt is invalid: {e}")))?;
    Ok(salt)
}
