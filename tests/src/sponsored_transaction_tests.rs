use crate::utils::*;
use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::SigningKey;
use std::sync::Arc;
use std::time::Duration;
use zklogin_sponsor::{Coordinator, Error, RpcClient, SuiNetwork, TxStage, ZkLoginCredentials};
use zklogin_types::{
    ed25519_address, verify_transaction_signature, SuiAddress, ZkProof, ZKLOGIN_FLAG,
};

const USER_ADDRESS: SuiAddress = SuiAddress::new([0xaa; 32]);

fn credentials() -> Result<ZkLoginCredentials> {
    let proof: ZkProof = serde_json::from_value(sample_proof_json())?;
    Ok(ZkLoginCredentials::new(
        USER_ADDRESS,
        "1234567890".into(),
        12,
        Some(proof),
        "42".into(),
        SigningKey::from_bytes(&[1u8; 32]),
    ))
}

fn sponsor_address() -> SuiAddress {
    ed25519_address(&SigningKey::from_bytes(&SPONSOR_SECRET).verifying_key())
}

async fn setup(sponsor_key: Option<&str>) -> Result<(Coordinator<Arc<RpcClient>>, Arc<MockRpc>)> {
    let mock = MockRpc::new(10);
    let url = mock.serve().await?;
    let rpc = Arc::new(RpcClient::new(&url, "", Duration::from_secs(5))?);
    Ok((Coordinator::new(rpc, sponsor_key), mock))
}

// ── Happy path ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_execute_submits_both_signatures_over_same_bytes() -> Result<()> {
    let (coord, mock) = setup(Some(&sponsor_key_hex())).await?;
    let outcome = coord.execute(&[0x00, 0x01], &credentials()?).await?;
    assert!(outcome.is_success());
    assert_eq!(outcome.digest.as_deref(), Some(MOCK_DIGEST));

    let executions = mock.executions();
    assert_eq!(executions.len(), 1);
    let params = &executions[0];
    let tx_bytes = STANDARD.decode(params[0].as_str().unwrap())?;
    let signatures = params[1].as_array().unwrap();
    assert_eq!(signatures.len(), 2);

    let composite = STANDARD.decode(signatures[0].as_str().unwrap())?;
    assert_eq!(composite[0], ZKLOGIN_FLAG);

    let sponsor_pk = verify_transaction_signature(signatures[1].as_str().unwrap(), &tx_bytes)?;
    assert_eq!(ed25519_address(&sponsor_pk), sponsor_address());

    assert_eq!(params[2]["showEffects"], true);
    assert_eq!(params[2]["showObjectChanges"], true);
    assert_eq!(params[3], "WaitForLocalExecution");
    Ok(())
}

#[tokio::test]
async fn test_stages_advance_in_order() -> Result<()> {
    let (coord, _mock) = setup(Some(&sponsor_key_hex())).await?;
    let creds = credentials()?;

    let mut tx = coord.build(&[0x00], &creds).await?;
    assert_eq!(tx.stage(), TxStage::Built);
    assert_eq!(tx.sender(), USER_ADDRESS);
    assert_eq!(tx.fee_payer(), sponsor_address());
    assert_eq!(tx.gas_budget(), 50_000_000);

    let epoch = coord.network().current_epoch().await?;
    coord.sign_user(&mut tx, &creds, epoch)?;
    assert_eq!(tx.stage(), TxStage::UserSigned);
    coord.sign_sponsor(&mut tx).await?;
    assert_eq!(tx.stage(), TxStage::SponsorSigned);
    coord.submit(&mut tx).await?;
    assert_eq!(tx.stage(), TxStage::Confirmed);

    // Confirmed transactions are spent.
    assert!(matches!(
        coord.submit(&mut tx).await,
        Err(Error::SignatureAssembly(_))
    ));
    Ok(())
}

// ── Sponsor failures ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_unparseable_sponsor_key_leaves_tx_built() -> Result<()> {
    let (coord, mock) = setup(Some("suiprivkey1notavalidkey")).await?;
    let coord = coord.with_sponsor_address(SuiAddress::new([0xcc; 32]))?;
    let creds = credentials()?;

    let mut tx = coord.build(&[0x00], &creds).await?;
    let err = coord.sign_sponsor(&mut tx).await.unwrap_err();
    assert!(matches!(err, Error::SponsorKeyUnavailable(_)));
    assert_eq!(tx.stage(), TxStage::Built);
    assert!(mock.executions().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unset_sponsor_key() -> Result<()> {
    let (coord, mock) = setup(None).await?;
    assert!(matches!(
        coord.execute(&[0x00], &credentials()?).await,
        Err(Error::SponsorKeyUnavailable(_))
    ));
    assert!(coord.sponsor_address().is_err());
    assert_eq!(mock.call_count("suix_getCoins"), 0);
    Ok(())
}

#[tokio::test]
async fn test_balance_check_blocks_underfunded_sponsor() -> Result<()> {
    let (coord, mock) = setup(Some(&sponsor_key_hex())).await?;
    *mock.balance.lock().unwrap() = 1_000;
    let coord = coord.with_balance_check(true);

    let err = coord.execute(&[0x00], &credentials()?).await.unwrap_err();
    assert_eq!(
        err,
        Error::InsufficientSponsorBalance {
            required: 50_000_000,
            available: 1_000
        }
    );
    assert!(mock.executions().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_sponsor_balance_reads_total() -> Result<()> {
    let (coord, _mock) = setup(Some(&sponsor_key_hex())).await?;
    assert_eq!(coord.sponsor_balance().await?, 10_000_000_000);
    Ok(())
}

// ── Submission ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failed_effects_are_rejected() -> Result<()> {
    let (coord, mock) = setup(Some(&sponsor_key_hex())).await?;
    mock.set_execute_mode(ExecuteMode::Failure("InsufficientCoinBalance".into()));

    let err = coord.execute(&[0x00], &credentials()?).await.unwrap_err();
    assert_eq!(
        err,
        Error::SubmissionRejected {
            digest: MOCK_DIGEST.into(),
            reason: "InsufficientCoinBalance".into()
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_node_refusal_is_rejected_with_local_digest() -> Result<()> {
    let (coord, mock) = setup(Some(&sponsor_key_hex())).await?;
    mock.set_execute_mode(ExecuteMode::RpcError("Invalid user signature".into()));
    let creds = credentials()?;

    let mut tx = coord.build(&[0x00], &creds).await?;
    coord.sign_user(&mut tx, &creds, 10)?;
    coord.sign_sponsor(&mut tx).await?;
    let err = coord.submit(&mut tx).await.unwrap_err();

    assert_eq!(
        err,
        Error::SubmissionRejected {
            digest: tx.digest().to_string(),
            reason: "Invalid user signature".into()
        }
    );
    assert_eq!(tx.stage(), TxStage::Rejected);
    Ok(())
}

#[tokio::test]
async fn test_expired_credentials_not_signed() -> Result<()> {
    let (coord, mock) = setup(Some(&sponsor_key_hex())).await?;
    *mock.epoch.lock().unwrap() = 13;
    assert!(matches!(
        coord.execute(&[0x00], &credentials()?).await,
        Err(Error::SignatureAssembly(_))
    ));
    assert!(mock.executions().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unreachable_network_keeps_submitted() -> Result<()> {
    let (coord, _mock) = setup(Some(&sponsor_key_hex())).await?;
    let creds = credentials()?;
    let mut tx = coord.build(&[0x00], &creds).await?;
    coord.sign_user(&mut tx, &creds, 10)?;
    coord.sign_sponsor(&mut tx).await?;

    // Move the same signed transaction to a coordinator whose network is gone.
    let dead = Arc::new(RpcClient::new(&dead_url().await?, "", Duration::from_secs(2))?);
    let offline = Coordinator::new(dead, Some(&sponsor_key_hex()));
    let err = offline.submit(&mut tx).await.unwrap_err();
    assert!(matches!(err, Error::Rpc(_) | Error::Timeout(_)));
    assert_eq!(tx.stage(), TxStage::Submitted);
    assert!(offline.submit(&mut tx).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_execute_as_sponsor_single_signer() -> Result<()> {
    let (coord, mock) = setup(Some(&sponsor_key_hex())).await?;
    coord.execute_as_sponsor(&[0x00, 0x05]).await?;

    let executions = mock.executions();
    let signatures = executions[0][1].as_array().unwrap();
    assert_eq!(signatures.len(), 1);
    let tx_bytes = STANDARD.decode(executions[0][0].as_str().unwrap())?;
    let pk = verify_transaction_signature(signatures[0].as_str().unwrap(), &tx_bytes)?;
    assert_eq!(ed25519_address(&pk), sponsor_address());
    Ok(())
}

// ── RPC failover ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reads_fail_over_to_fallback() -> Result<()> {
    let mock = MockRpc::new(77);
    let fallback = mock.serve().await?;
    let rpc = RpcClient::new(&dead_url().await?, &fallback, Duration::from_secs(2))?;
    assert_eq!(rpc.current_epoch().await?, 77);
    assert_eq!(rpc.reference_gas_price().await?, 750);
    Ok(())
}
