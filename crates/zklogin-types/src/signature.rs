//! Zero-knowledge proof shape and composite zkLogin credential assembly.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::{AuthError, ED25519_FLAG, ZKLOGIN_FLAG};

/// Groth16 points as decimal strings, exactly as the prover returns them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofPoints {
    pub a: Vec<String>,
    pub b: Vec<Vec<String>>,
    pub c: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssBase64Details {
    pub value: String,
    pub index_mod4: u8,
}

/// Prover output bound to (token, ephemeral key, max epoch, randomness, salt).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkProof {
    pub proof_points: ProofPoints,
    pub iss_base64_details: IssBase64Details,
    pub header_base64: String,
}

impl ZkProof {
    /// Reject structurally empty proofs before they are trusted.
    pub fn validate_shape(&self) -> Result<(), AuthError> {
        let points = &self.proof_points;
        if points.a.is_empty() || points.b.is_empty() || points.c.is_empty() {
            return Err(AuthError::InvalidInput("proof points are empty".into()));
        }
        if points.b.iter().any(Vec::is_empty) {
            return Err(AuthError::InvalidInput("proof point b has an empty row".into()));
        }
        let all_points = points
            .a
            .iter()
            .chain(points.b.iter().flatten())
            .chain(points.c.iter());
        for point in all_points {
            if point.is_empty() || !point.bytes().all(|b| b.is_ascii_digit()) {
                return Err(AuthError::InvalidInput(format!(
                    "proof coordinate {point:?} is not a decimal integer"
                )));
            }
        }
        if self.iss_base64_details.value.is_empty() {
            return Err(AuthError::InvalidInput("issBase64Details.value is empty".into()));
        }
        if self.iss_base64_details.index_mod4 > 3 {
            return Err(AuthError::InvalidInput("issBase64Details.indexMod4 out of range".into()));
        }
        if self.header_base64.is_empty() {
            return Err(AuthError::InvalidInput("headerBase64 is empty".into()));
        }
        Ok(())
    }
}

// BCS layout of the network's `ZkLoginSignature`; field order is significant.
#[derive(Serialize)]
struct ZkLoginInputsBcs<'a> {
    proof_points: &'a ProofPoints,
    iss_base64_details: IssDetailsBcs<'a>,
    header_base64: &'a str,
    address_seed: &'a str,
}

#[derive(Serialize)]
struct IssDetailsBcs<'a> {
    value: &'a str,
    index_mod4: u8,
}

#[derive(Serialize)]
struct ZkLoginSignatureBcs<'a> {
    inputs: ZkLoginInputsBcs<'a>,
    max_epoch: u64,
    user_signature: Vec<u8>,
}

/// Merge proof, address seed and the ephemeral signature into the user's
/// composite credential: `base64(0x05 || bcs(ZkLoginSignature))`.
pub fn zklogin_signature(
    proof: &ZkProof,
    address_seed: &str,
    max_epoch: u64,
    user_signature: &str,
) -> Result<String, AuthError> {
    proof.validate_shape()?;
    if address_seed.is_empty() {
        return Err(AuthError::InvalidInput("address seed is empty".into()));
    }

    let user_signature = B64
        .decode(user_signature)
        .map_err(|e| AuthError::InvalidInput(format!("user signature is not base64: {e}")))?;
    if user_signature.first() != Some(&ED25519_FLAG) {
        return Err(AuthError::InvalidInput(
            "user signature must be an ed25519 serialized signature".into(),
        ));
    }

    let payload = ZkLoginSignatureBcs {
        inputs: ZkLoginInputsBcs {
            proof_points: &proof.proof_points,
            iss_base64_details: IssDetailsBcs {
                value: &proof.iss_base64_details.value,
                index_mod4: proof.iss_base64_details.index_mod4,
            },
            header_base64: &proof.header_base64,
            address_seed,
        },
        max_epoch,
        user_signature,
    };
    let body = bcs::to_bytes(&payload)
        .map_err(|e| AuthError::InvalidInput(format!("bcs encode: {e}")))?;

    let mut out = Vec::with_capacity(1 + body.len());
    out.push(ZKLOGIN_FLAG);
    out.extend_from_slice(&body);
    Ok(B64.encode(out))
}
