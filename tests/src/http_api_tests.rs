use crate::utils::*;
use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use zklogin_sponsor::{create_router, AppState, Config, Secrets};

struct Service {
    base: String,
    http: reqwest::Client,
    rpc: Arc<MockRpc>,
}

const API_KEY: &str = "test-api-key";

async fn service(sponsor_key: Option<String>) -> Result<Service> {
    service_with(Secrets {
        sponsor_key,
        store_key: Some([9u8; 32]),
        api_key: None,
    })
    .await
}

async fn service_with(secrets: Secrets) -> Result<Service> {
    let rpc = MockRpc::new(10);
    let prover = MockProver::new(ProverMode::Proof);
    let config = Config {
        rpc_url: rpc.serve().await?,
        fallback_rpc_url: String::new(),
        prover_url: prover.serve().await?,
        client_id: CLIENT_ID.into(),
        store_path: temp_store_path("http").display().to_string(),
        ..Config::default()
    };
    let state = Arc::new(AppState::new(config, secrets)?);
    let base = spawn(create_router(state)).await?;
    let http = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    Ok(Service { base, http, rpc })
}

async fn keyed_service() -> Result<Service> {
    service_with(Secrets {
        sponsor_key: Some(sponsor_key_hex()),
        store_key: None,
        api_key: Some(API_KEY.into()),
    })
    .await
}

impl Service {
    /// `GET /login`, returning the nonce from the provider redirect.
    async fn login_nonce(&self) -> Result<String> {
        let resp = self.http.get(format!("{}/login", self.base)).send().await?;
        assert_eq!(resp.status(), reqwest::StatusCode::FOUND);
        let location = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .ok_or_else(|| anyhow::anyhow!("no Location header"))?
            .to_str()?
            .to_string();
        let url = url::Url::parse(&location)?;
        assert!(location.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        Ok(params["nonce"].clone())
    }

    async fn post(&self, path: &str, body: Value) -> Result<(u16, Value)> {
        self.send(self.http.post(format!("{}{path}", self.base)).json(&body))
            .await
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<(u16, Value)> {
        let resp = request.send().await?;
        let status = resp.status().as_u16();
        Ok((status, resp.json().await?))
    }

    async fn sign_in(&self) -> Result<()> {
        let nonce = self.login_nonce().await?;
        let (status, body) = self
            .post("/callback", json!({ "id_token": google_token("123", &nonce) }))
            .await?;
        assert_eq!(status, 200, "{body}");
        Ok(())
    }
}

// ── Service surface ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_and_metrics() -> Result<()> {
    let svc = service(Some(sponsor_key_hex())).await?;
    let health: Value = svc
        .http
        .get(format!("{}/health", svc.base))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["logged_in"], false);
    assert!(health["sponsor_address"].as_str().unwrap().starts_with("0x"));

    let metrics = svc
        .http
        .get(format!("{}/metrics", svc.base))
        .send()
        .await?
        .text()
        .await?;
    assert!(metrics.contains("zklogin_tx_submitted_total"));
    Ok(())
}

#[tokio::test]
async fn test_callback_page_relays_fragment() -> Result<()> {
    let svc = service(None).await?;
    let page = svc
        .http
        .get(format!("{}/callback", svc.base))
        .send()
        .await?
        .text()
        .await?;
    assert!(page.contains("id_token"));
    assert!(page.contains("fetch(\"/callback\""));
    Ok(())
}

// ── Login + execute ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_then_execute() -> Result<()> {
    let svc = service(Some(sponsor_key_hex())).await?;
    let nonce = svc.login_nonce().await?;

    let (status, body) = svc
        .post("/callback", json!({ "id_token": google_token("123", &nonce) }))
        .await?;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["max_epoch"], 12);
    let address = body["address"].as_str().unwrap().to_string();

    let (status, body) = svc
        .post(
            "/execute",
            json!({ "tx_kind_base64": STANDARD.encode([0x00u8, 0x01]) }),
        )
        .await?;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["digest"], MOCK_DIGEST);
    assert_eq!(svc.rpc.executions().len(), 1);

    // A second login for the same user lands on the same address.
    let nonce = svc.login_nonce().await?;
    let (_, body) = svc
        .post("/callback", json!({ "id_token": google_token("123", &nonce) }))
        .await?;
    assert_eq!(body["address"], address);
    Ok(())
}

#[tokio::test]
async fn test_execute_before_login_unauthorized() -> Result<()> {
    let svc = service(Some(sponsor_key_hex())).await?;
    let (status, body) = svc
        .post("/execute", json!({ "tx_kind_base64": "AAE=" }))
        .await?;
    assert_eq!(status, 401);
    assert_eq!(body["kind"], "SessionExpired");
    Ok(())
}

#[tokio::test]
async fn test_callback_with_wrong_nonce() -> Result<()> {
    let svc = service(None).await?;
    svc.login_nonce().await?;
    let (status, body) = svc
        .post("/callback", json!({ "id_token": google_token("123", "wrong") }))
        .await?;
    assert_eq!(status, 401);
    assert_eq!(body["kind"], "NonceMismatch");
    Ok(())
}

#[tokio::test]
async fn test_execute_rejects_bad_base64() -> Result<()> {
    let svc = service(Some(sponsor_key_hex())).await?;
    let (status, body) = svc
        .post("/execute", json!({ "tx_kind_base64": "%%%" }))
        .await?;
    assert_eq!(status, 400);
    assert_eq!(body["kind"], "InvalidInput");
    Ok(())
}

#[tokio::test]
async fn test_sponsor_endpoint() -> Result<()> {
    let svc = service(Some(sponsor_key_hex())).await?;
    let body: Value = svc
        .http
        .get(format!("{}/sponsor", svc.base))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["balance"], "10000000000");

    let svc = service(None).await?;
    let resp = svc.http.get(format!("{}/sponsor", svc.base)).send().await?;
    assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}

// ── API key ──────────────────────────────────────────────────────────────

fn execute_body() -> Value {
    json!({ "tx_kind_base64": STANDARD.encode([0x00u8, 0x01]) })
}

#[tokio::test]
async fn test_execute_without_api_key_rejected() -> Result<()> {
    let svc = keyed_service().await?;
    svc.sign_in().await?;

    let (status, body) = svc.post("/execute", execute_body()).await?;
    assert_eq!(status, 401);
    assert_eq!(body["kind"], "Unauthorized");
    assert!(svc.rpc.executions().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_execute_with_wrong_api_key_rejected() -> Result<()> {
    let svc = keyed_service().await?;
    svc.sign_in().await?;

    let url = format!("{}/execute", svc.base);
    let (status, body) = svc
        .send(
            svc.http.post(&url)
                .header("x-api-key", "not-the-key")
                .json(&execute_body()),
        )
        .await?;
    assert_eq!(status, 401);
    assert_eq!(body["kind"], "Unauthorized");

    let (status, _) = svc
        .send(
            svc.http.post(&url)
                .bearer_auth("test-api-key-2")
                .json(&execute_body()),
        )
        .await?;
    assert_eq!(status, 401);
    assert!(svc.rpc.executions().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_execute_with_api_key_accepted() -> Result<()> {
    let svc = keyed_service().await?;
    svc.sign_in().await?;

    let url = format!("{}/execute", svc.base);
    let (status, body) = svc
        .send(
            svc.http.post(&url)
                .header("x-api-key", API_KEY)
                .json(&execute_body()),
        )
        .await?;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["digest"], MOCK_DIGEST);

    let (status, body) = svc
        .send(
            svc.http.post(&url)
                .bearer_auth(API_KEY)
                .json(&execute_body()),
        )
        .await?;
    assert_eq!(status, 200, "{body}");
    assert_eq!(svc.rpc.executions().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_api_key_leaves_public_routes_open() -> Result<()> {
    let svc = keyed_service().await?;
    let resp = svc.http.get(format!("{}/health", svc.base)).send().await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    // Login and callback carry no key.
    svc.sign_in().await?;
    Ok(())
}

// ── Request ids ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_request_id_is_echoed() -> Result<()> {
    let svc = service(None).await?;
    let resp = svc
        .http
        .get(format!("{}/health", svc.base))
        .header("x-request-id", "trace-abc-123")
        .send()
        .await?;
    assert_eq!(resp.headers()["x-request-id"], "trace-abc-123");
    Ok(())
}

#[tokio::test]
async fn test_request_id_is_generated() -> Result<()> {
    let svc = service(None).await?;
    let first = svc.http.get(format!("{}/health", svc.base)).send().await?;
    let second = svc.http.get(format!("{}/health", svc.base)).send().await?;

    let first = first.headers()["x-request-id"].to_str()?.to_string();
    let second = second.headers()["x-request-id"].to_str()?.to_string();
    assert!(first.starts_with("zkl-"), "{first}");
    assert_ne!(first, second);

    // Unprintable ids are replaced rather than echoed.
    let resp = svc
        .http
        .get(format!("{}/health", svc.base))
        .header("x-request-id", "has space")
        .send()
        .await?;
    assert!(resp.headers()["x-request-id"].to_str()?.starts_with("zkl-"));
    Ok(())
}

// ── Re-login ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failed_login_start_keeps_credentials() -> Result<()> {
    let svc = service(Some(sponsor_key_hex())).await?;
    svc.sign_in().await?;

    svc.rpc.set_system_state_down(true);
    let resp = svc.http.get(format!("{}/login", svc.base)).send().await?;
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_GATEWAY);
    svc.rpc.set_system_state_down(false);

    let (status, body) = svc.post("/execute", execute_body()).await?;
    assert_eq!(status, 200, "{body}");
    assert_eq!(svc.rpc.executions().len(), 1);
    Ok(())
}
