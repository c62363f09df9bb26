//! Zero-knowledge proof acquisition from the external prover service.

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use zklogin_types::{extended_public_key_base64, ZkProof, KEY_CLAIM_NAME};

use crate::metrics::METRICS;
use ed25519_dalek::VerifyingKey;

/// Inputs bound into one proof.
#[derive(Clone, Copy)]
pub struct ProofInputs<'a> {
    pub id_token: &'a str,
    pub ephemeral_public_key: &'a VerifyingKey,
    pub max_epoch: u64,
    pub randomness: &'a str,
    pub salt: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProofRequest {
    jwt: String,
    extended_ephemeral_public_key: String,
    max_epoch: String,
    jwt_randomness: String,
    salt: String,
    key_claim_name: &'static str,
    key_exchange: String,
    key_exchange_network: String,
}

pub struct ProverClient {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
    key_exchange_network: String,
}

impl ProverClient {
    pub fn new(
        url: &str,
        timeout: Duration,
        key_exchange_network: &str,
    ) -> Result<Self, crate::Error> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| crate::Error::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.to_string(),
            timeout,
            key_exchange_network: key_exchange_network.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One proof request, no retries. Every failure is a `ProofService` error.
    ///
    /// The request runs on its own task. When the timeout fires the caller
    /// gets an error at once while the request is left to finish, and
    /// whatever the prover answers is dropped.
    pub async fn request_proof(&self, inputs: ProofInputs<'_>) -> Result<ZkProof, crate::Error> {
        let start = Instant::now();
        METRICS.proof_requests.inc();

        let call = tokio::spawn(send(
            self.http.clone(),
            self.url.clone(),
            self.body(&inputs),
        ));
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(crate::Error::ProofService(format!("prover task failed: {e}"))),
            Err(_) => Err(crate::Error::ProofService(format!(
                "timed out after {}ms",
                self.timeout.as_millis()
            ))),
        };
        METRICS.proof_latency.record(start);

        match &result {
            Ok(_) => info!(max_epoch = inputs.max_epoch, "Proof obtained"),
            Err(e) => {
                METRICS.proof_failures.inc();
                warn!(error = %e, prover = %self.url, "Proof request failed");
            }
        }
        result
    }

    fn body(&self, inputs: &ProofInputs<'_>) -> ProofRequest {
        ProofRequest {
            jwt: inputs.id_token.to_string(),
            extended_ephemeral_public_key: extended_public_key_base64(inputs.ephemeral_public_key),
            max_epoch: inputs.max_epoch.to_string(),
            jwt_randomness: inputs.randomness.to_string(),
            salt: inputs.salt.to_string(),
            key_claim_name: KEY_CLAIM_NAME,
            key_exchange: self.key_exchange_network.clone(),
            key_exchange_network: self.key_exchange_network.clone(),
        }
    }
}

async fn send(
    http: reqwest::Client,
    url: String,
    body: ProofRequest,
) -> Result<ZkProof, crate::Error> {
    let resp = http
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|e| crate::Error::ProofService(format!("prover unreachable: {e}")))?;

    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| crate::Error::ProofService(format!("reading prover response: {e}")))?;
    if !status.is_success() {
        return Err(crate::Error::ProofService(text));
    }

    let proof: ZkProof = serde_json::from_str(&text)
        .map_err(|e| crate::Error::ProofService(format!("invalid proof response: {e}")))?;
    proof
        .validate_shape()
        .map_err(|e| crate::Error::ProofService(format!("invalid proof response: {e}")))?;
    Ok(proof)
}
