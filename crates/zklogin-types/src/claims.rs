//! Identity token (JWT) claim decoding. The signature is not checked here:
//! the prover holds the provider keys and is the trust anchor.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::AuthError;

/// `aud` is a string or an array of strings depending on the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Self::One(aud) => aud == audience,
            Self::Many(auds) => auds.iter().any(|aud| aud == audience),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::One(aud) => aud.is_empty(),
            Self::Many(auds) => auds.iter().all(String::is_empty),
        }
    }
}

/// Claims consumed by the login flow. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    pub aud: Audience,
    pub iss: String,
    pub nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Decode the payload segment of a compact JWT.
pub fn decode_claims(id_token: &str) -> Result<IdentityClaims, AuthError> {
    let mut segments = id_token.trim().split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_header), Some(payload), Some(_signature), None) => payload,
        _ => {
            return Err(AuthError::MalformedToken(
                "expected three dot-separated segments".into(),
            ))
        }
    };

    let json = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::MalformedToken(format!("payload is not base64url: {e}")))?;

    let claims: IdentityClaims = serde_json::from_slice(&json)
        .map_err(|e| AuthError::MalformedToken(format!("payload claims: {e}")))?;

    for (name, value) in [("sub", &claims.sub), ("iss", &claims.iss), ("nonce", &claims.nonce)] {
        if value.is_empty() {
            return Err(AuthError::MalformedToken(format!("empty `{name}` claim")));
        }
    }
    if claims.aud.is_empty() {
        return Err(AuthError::MalformedToken("empty `aud` claim".into()));
    }

    Ok(claims)
}
