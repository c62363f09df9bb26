use crate::utils::*;
use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use zklogin_auth::{MemoryStore, SaltManager, SessionManager};
use zklogin_sponsor::{Error, LoginFlow, ProverClient, RpcClient};
use zklogin_types::{decode_claims, derive_identity, OidcProvider};

type TestFlow = LoginFlow<Arc<RpcClient>, MemoryStore, Arc<MemoryStore>>;

struct Harness {
    flow: TestFlow,
    rpc: Arc<MockRpc>,
    prover: Arc<MockProver>,
    salts: Arc<MemoryStore>,
}

async fn harness_with(mode: ProverMode, prover_timeout: Duration) -> Result<Harness> {
    let rpc = MockRpc::new(10);
    let prover = MockProver::new(mode);
    let rpc_url = rpc.serve().await?;
    let prover_url = prover.serve().await?;

    let client = Arc::new(RpcClient::new(&rpc_url, "", Duration::from_secs(5))?);
    let prover_client = ProverClient::new(&prover_url, prover_timeout, "mainnet")?;
    let salts = Arc::new(MemoryStore::new());

    let flow = LoginFlow::new(
        client,
        prover_client,
        OidcProvider::google(CLIENT_ID),
        "http://localhost:5174/callback",
        SessionManager::new(MemoryStore::new()),
        SaltManager::new(Arc::clone(&salts)),
    );
    Ok(Harness {
        flow,
        rpc,
        prover,
        salts,
    })
}

async fn harness() -> Result<Harness> {
    harness_with(ProverMode::Proof, Duration::from_secs(5)).await
}

// ── Begin ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_begin_binds_nonce_into_redirect() -> Result<()> {
    let h = harness().await?;
    let start = h.flow.begin().await?;

    assert_eq!(start.max_epoch, 12);
    let params: HashMap<_, _> = start.authorization_url.query_pairs().into_owned().collect();
    assert_eq!(params["nonce"], start.nonce);
    assert_eq!(params["client_id"], CLIENT_ID);
    assert_eq!(params["response_type"], "id_token");
    assert_eq!(params["scope"], "openid email");
    assert_eq!(params["redirect_uri"], "http://localhost:5174/callback");

    let session = h.flow.sessions().load()?;
    assert_eq!(session.nonce(), start.nonce);
    assert_eq!(h.rpc.call_count("suix_getLatestSuiSystemState"), 1);
    Ok(())
}

#[tokio::test]
async fn test_second_begin_invalidates_first_nonce() -> Result<()> {
    let h = harness().await?;
    let first = h.flow.begin().await?;
    let second = h.flow.begin().await?;
    assert_ne!(first.nonce, second.nonce);

    let err = h
        .flow
        .complete(&google_token("123", &first.nonce))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NonceMismatch { .. }));
    Ok(())
}

// ── Complete ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_complete_produces_credentials() -> Result<()> {
    let h = harness().await?;
    let start = h.flow.begin().await?;
    let session = h.flow.sessions().load()?;
    let token = google_token("123", &start.nonce);

    let creds = h.flow.complete(&token).await?;

    let salt = h.flow_salt("123")?;
    let expected = derive_identity(&decode_claims(&token)?, &salt, h.flow.provider())?;
    assert_eq!(creds.address, expected.address);
    assert_eq!(creds.address_seed, expected.address_seed);
    assert_eq!(creds.max_epoch, 12);
    assert!(creds.proof.is_some());
    assert_eq!(creds.ephemeral_public_key(), session.public_key());

    // Session is single-use.
    assert!(matches!(
        h.flow.sessions().load(),
        Err(zklogin_types::AuthError::SessionExpired)
    ));

    let requests = h.prover.requests();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req["jwt"], token);
    assert_eq!(req["maxEpoch"], "12");
    assert_eq!(req["jwtRandomness"], session.randomness());
    assert_eq!(req["salt"], salt);
    assert_eq!(req["keyClaimName"], "sub");
    assert_eq!(req["keyExchange"], "mainnet");
    assert_eq!(req["keyExchangeNetwork"], "mainnet");
    assert_eq!(req["extendedEphemeralPublicKey"], session.extended_public_key());
    let extended = STANDARD.decode(req["extendedEphemeralPublicKey"].as_str().unwrap())?;
    assert_eq!(extended.len(), 33);
    assert_eq!(extended[0], 0x00);
    Ok(())
}

#[tokio::test]
async fn test_same_user_keeps_address_across_logins() -> Result<()> {
    let h = harness().await?;

    let start = h.flow.begin().await?;
    let first = h.flow.complete(&google_token("123", &start.nonce)).await?;

    let start = h.flow.begin().await?;
    let array_aud = id_token(json!({
        "iss": "accounts.google.com",
        "aud": ["other-client", CLIENT_ID],
        "sub": "123",
        "nonce": start.nonce,
    }));
    let second = h.flow.complete(&array_aud).await?;

    assert_eq!(first.address, second.address);
    assert_eq!(first.salt, second.salt);
    assert_ne!(first.ephemeral_public_key(), second.ephemeral_public_key());
    Ok(())
}

#[tokio::test]
async fn test_different_users_get_different_addresses() -> Result<()> {
    let h = harness().await?;
    let start = h.flow.begin().await?;
    let alice = h.flow.complete(&google_token("alice", &start.nonce)).await?;
    let start = h.flow.begin().await?;
    let bob = h.flow.complete(&google_token("bob", &start.nonce)).await?;
    assert_ne!(alice.address, bob.address);
    Ok(())
}

#[tokio::test]
async fn test_foreign_audience_rejected() -> Result<()> {
    let h = harness().await?;
    let start = h.flow.begin().await?;
    let token = id_token(json!({
        "iss": GOOGLE_ISS,
        "aud": "someone-else",
        "sub": "123",
        "nonce": start.nonce,
    }));
    assert!(matches!(
        h.flow.complete(&token).await,
        Err(Error::MalformedToken(_))
    ));
    assert!(h.prover.requests().is_empty());
    // Nothing durable is written for a rejected identity.
    assert_eq!(h.stored_salt("123")?, None);
    Ok(())
}

#[tokio::test]
async fn test_foreign_issuer_rejected() -> Result<()> {
    let h = harness().await?;
    let start = h.flow.begin().await?;
    let token = id_token(json!({
        "iss": "https://issuer.example",
        "aud": CLIENT_ID,
        "sub": "123",
        "nonce": start.nonce,
    }));
    assert!(matches!(
        h.flow.complete(&token).await,
        Err(Error::MalformedToken(_))
    ));
    assert_eq!(h.stored_salt("123")?, None);
    Ok(())
}

// ── Failures ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_nonce_mismatch_skips_prover() -> Result<()> {
    let h = harness().await?;
    let start = h.flow.begin().await?;
    let err = h
        .flow
        .complete(&google_token("123", "attacker-nonce"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        Error::NonceMismatch {
            expected: start.nonce.clone(),
            found: "attacker-nonce".into()
        }
    );
    assert!(h.prover.requests().is_empty());
    // The live attempt survives a stray callback.
    assert!(h.flow.sessions().load().is_ok());
    Ok(())
}

#[tokio::test]
async fn test_callback_without_session_expired() -> Result<()> {
    let h = harness().await?;
    let err = h.flow.complete(&google_token("123", "n")).await.unwrap_err();
    assert_eq!(err, Error::SessionExpired);
    Ok(())
}

#[tokio::test]
async fn test_callback_after_clear_expired() -> Result<()> {
    let h = harness().await?;
    let start = h.flow.begin().await?;
    h.flow.sessions().clear()?;
    h.flow.sessions().clear()?;
    let err = h
        .flow
        .complete(&google_token("123", &start.nonce))
        .await
        .unwrap_err();
    assert_eq!(err, Error::SessionExpired);
    Ok(())
}

#[tokio::test]
async fn test_prover_500_surfaces_body() -> Result<()> {
    let h = harness_with(
        ProverMode::Status(500, "prover exploded: nonce not in jwt".into()),
        Duration::from_secs(5),
    )
    .await?;
    let start = h.flow.begin().await?;
    let err = h
        .flow
        .complete(&google_token("123", &start.nonce))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        Error::ProofService("prover exploded: nonce not in jwt".into())
    );
    // Restart required.
    assert!(h.flow.sessions().load().is_err());
    assert_eq!(h.prover.requests().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_prover_timeout() -> Result<()> {
    let h = harness_with(
        ProverMode::Delay(Duration::from_secs(3)),
        Duration::from_millis(200),
    )
    .await?;
    let start = h.flow.begin().await?;
    let err = h
        .flow
        .complete(&google_token("123", &start.nonce))
        .await
        .unwrap_err();
    match err {
        Error::ProofService(msg) => assert!(msg.contains("timed out"), "{msg}"),
        other => panic!("expected ProofService, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_timed_out_proof_request_is_left_to_finish() -> Result<()> {
    let h = harness_with(
        ProverMode::Delay(Duration::from_millis(300)),
        Duration::from_millis(100),
    )
    .await?;
    let start = h.flow.begin().await?;
    let result = h.flow.complete(&google_token("123", &start.nonce)).await;
    assert!(matches!(result, Err(Error::ProofService(_))));
    assert_eq!(h.prover.completed(), 0);

    // The prover still sees its connection through; the late answer is ignored.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(h.prover.completed(), 1);
    assert_eq!(h.prover.requests().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_incomplete_proof_rejected() -> Result<()> {
    let mut proof = sample_proof_json();
    proof["proofPoints"]["a"] = json!([]);
    let h = harness_with(ProverMode::Body(proof), Duration::from_secs(5)).await?;
    let start = h.flow.begin().await?;
    assert!(matches!(
        h.flow.complete(&google_token("123", &start.nonce)).await,
        Err(Error::ProofService(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_malformed_token() -> Result<()> {
    let h = harness().await?;
    h.flow.begin().await?;
    assert!(matches!(
        h.flow.complete("definitely.not-a-jwt").await,
        Err(Error::MalformedToken(_))
    ));
    Ok(())
}

impl Harness {
    fn stored_salt(&self, sub: &str) -> Result<Option<String>> {
        Ok(SaltManager::new(Arc::clone(&self.salts)).get(GOOGLE_ISS, sub)?)
    }

    fn flow_salt(&self, sub: &str) -> Result<String> {
        self.stored_salt(sub)?
            .ok_or_else(|| anyhow::anyhow!("no salt stored for {sub}"))
    }
}
