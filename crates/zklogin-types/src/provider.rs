//! Identity provider canonical values used in address derivation.

use crate::{AuthError, IdentityClaims};

pub const GOOGLE_ISSUER: &str = "https://accounts.google.com";
pub const GOOGLE_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// The only key claim supported: the provider's stable subject identifier.
pub const KEY_CLAIM_NAME: &str = "sub";

/// Google tokens may carry the scheme-less issuer; both mean the same provider.
pub fn normalize_issuer(iss: &str) -> &str {
    if iss == "accounts.google.com" {
        GOOGLE_ISSUER
    } else {
        iss
    }
}

/// An OpenID provider and the client registered with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcProvider {
    issuer: String,
    client_id: String,
    /// Extra client ids accepted in `aud`; derivation still uses `client_id`.
    audience_aliases: Vec<String>,
    auth_endpoint: String,
}

impl OidcProvider {
    pub fn new(
        issuer: impl Into<String>,
        client_id: impl Into<String>,
        auth_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            client_id: client_id.into().trim().to_string(),
            audience_aliases: Vec::new(),
            auth_endpoint: auth_endpoint.into(),
        }
    }

    pub fn google(client_id: impl Into<String>) -> Self {
        Self::new(GOOGLE_ISSUER, client_id, GOOGLE_AUTH_ENDPOINT)
    }

    pub fn with_audience_aliases(mut self, aliases: Vec<String>) -> Self {
        self.audience_aliases = aliases;
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn auth_endpoint(&self) -> &str {
        &self.auth_endpoint
    }

    /// Canonical audience, provided the token was issued to this client.
    pub fn canonical_audience_for(&self, claims: &IdentityClaims) -> Result<&str, AuthError> {
        let issued_to_us = claims.aud.contains(&self.client_id)
            || self.audience_aliases.iter().any(|alias| claims.aud.contains(alias));
        if !issued_to_us {
            return Err(AuthError::MalformedToken(format!(
                "token audience does not include client {}",
                self.client_id
            )));
        }
        Ok(&self.client_id)
    }

    /// Canonical issuer, provided the token's issuer names this provider.
    pub fn canonical_issuer_for(&self, claims: &IdentityClaims) -> Result<&str, AuthError> {
        if normalize_issuer(&claims.iss) != normalize_issuer(&self.issuer) {
            return Err(AuthError::MalformedToken(format!(
                "token issuer {} is not {}",
                claims.iss, self.issuer
            )));
        }
        Ok(normalize_issuer(&self.issuer))
    }
}
