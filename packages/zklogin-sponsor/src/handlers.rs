//! HTTP request handlers.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::Json;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde::Deserialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

use crate::metrics::METRICS;
use crate::response::{ExecuteResponse, HealthResponse, LoginResponse, SponsorResponse};
use crate::state::AppState;

/// Prometheus metrics in text exposition format.
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.render(),
    )
}

/// Health check with RPC status.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let rpc_status = state.rpc.health_check().await.unwrap_or("unavailable");
    let sponsor_address = state.coordinator.sponsor_address().ok();

    let status = if rpc_status == "unavailable" {
        "unavailable"
    } else if rpc_status == "degraded" || sponsor_address.is_none() {
        "degraded"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status,
        sponsor_address: sponsor_address.map(|a| a.to_string()),
        logged_in: state.credentials.read().await.is_some(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        requests: state.request_count.load(Ordering::Relaxed),
        active_rpc: state.rpc.active_url().to_string(),
        failovers: state.rpc.failover_count(),
        rpc_status,
    })
}

/// Start a login and redirect to the identity provider.
pub async fn login(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, crate::Error> {
    let start = state.login.begin().await?;
    // Signed-in credentials survive a login attempt that could not start.
    state.credentials.write().await.take();
    info!(max_epoch = start.max_epoch, "Redirecting to identity provider");
    Ok((
        StatusCode::FOUND,
        [(header::LOCATION, start.authorization_url.to_string())],
    ))
}

// The provider returns the token in the URL fragment, which never reaches
// the server; this page relays it back as a POST.
const CALLBACK_PAGE: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>zkLogin</title></head>
<body>
<pre id="status">Completing login…</pre>
<script>
const params = new URLSearchParams(window.location.hash.slice(1) || window.location.search.slice(1));
const idToken = params.get("id_token");
const status = document.getElementById("status");
if (!idToken) {
  status.textContent = "No id_token in callback URL.";
} else {
  history.replaceState(null, "", window.location.pathname);
  fetch("/callback", {
    method: "POST",
    headers: { "Content-Type": "application/json" },
    body: JSON.stringify({ id_token: idToken }),
  })
    .then((r) => r.json())
    .then((body) => { status.textContent = JSON.stringify(body, null, 2); })
    .catch((e) => { status.textContent = String(e); });
}
</script>
</body>
</html>
"#;

pub async fn callback_page() -> Html<&'static str> {
    Html(CALLBACK_PAGE)
}

#[derive(Deserialize)]
pub struct CallbackRequest {
    pub id_token: String,
}

/// Complete the login with the relayed identity token.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CallbackRequest>,
) -> Result<Json<LoginResponse>, crate::Error> {
    let credentials = state.login.complete(&request.id_token).await?;
    let response = LoginResponse {
        success: true,
        address: credentials.address.to_string(),
        max_epoch: credentials.max_epoch,
    };
    *state.credentials.write().await = Some(credentials);
    Ok(Json(response))
}

#[derive(Deserialize)]
pub struct ExecuteRequest {
    /// BCS `TransactionKind`, base64.
    pub tx_kind_base64: String,
}

fn decode_kind(request: &ExecuteRequest) -> Result<Vec<u8>, crate::Error> {
    B64.decode(request.tx_kind_base64.trim())
        .map_err(|e| crate::Error::InvalidInput(format!("tx_kind_base64: {e}")))
}

/// Execute a transaction sent by the logged-in user and paid by the sponsor.
pub async fn execute(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, crate::Error> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let kind = decode_kind(&request)?;

    let credentials = state.credentials.read().await.clone();
    let Some(credentials) = credentials else {
        warn!("Execute without a completed login");
        return Err(crate::Error::SessionExpired);
    };

    let outcome = state.coordinator.execute(&kind, &credentials).await?;
    Ok(Json(outcome.into()))
}

/// Execute with the sponsor as sender and fee payer.
pub async fn execute_as_sponsor(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, crate::Error> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let kind = decode_kind(&request)?;
    let outcome = state.coordinator.execute_as_sponsor(&kind).await?;
    Ok(Json(outcome.into()))
}

/// Sponsor address and SUI balance.
pub async fn sponsor(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SponsorResponse>, crate::Error> {
    let address = state.coordinator.sponsor_address()?;
    let balance = state.coordinator.sponsor_balance().await?;
    Ok(Json(SponsorResponse {
        address: address.to_string(),
        balance: balance.to_string(),
    }))
}
