//! Identity callback validation: the token must be bound to the live session.

use tracing::{info, warn};
use zklogin_types::{decode_claims, AuthError, IdentityClaims};

use crate::session::{EphemeralSession, SessionManager};
use crate::store::BlobStore;

/// A token whose nonce matches the session that requested it.
#[derive(Debug, Clone)]
pub struct ValidatedLogin {
    pub claims: IdentityClaims,
    pub session: EphemeralSession,
}

/// Byte-for-byte nonce comparison.
pub fn check_nonce(session: &EphemeralSession, claims: &IdentityClaims) -> Result<(), AuthError> {
    if claims.nonce.as_bytes() != session.nonce().as_bytes() {
        return Err(AuthError::NonceMismatch {
            expected: session.nonce().to_string(),
            found: claims.nonce.clone(),
        });
    }
    Ok(())
}

/// Validate a callback token against the live session. The session is left
/// in place; the caller clears it once the proof is obtained.
pub fn validate_callback<S: BlobStore>(
    sessions: &SessionManager<S>,
    id_token: &str,
) -> Result<ValidatedLogin, AuthError> {
    let session = sessions.load()?;
    let claims = decode_claims(id_token)?;

    if let Err(e) = check_nonce(&session, &claims) {
        warn!(iss = %claims.iss, "Identity token nonce does not match session");
        return Err(e);
    }

    info!(iss = %claims.iss, "Identity token bound to session");
    Ok(ValidatedLogin { claims, session })
}
