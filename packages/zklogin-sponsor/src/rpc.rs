//! Sui JSON-RPC client with primary → fallback failover and circuit breaker.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};
use zklogin_types::SuiAddress;

use crate::metrics::METRICS;

/// Coin type paying for gas.
pub const SUI_COIN_TYPE: &str = "0x2::sui::SUI";

/// Upper bound of gas coins fetched per owner.
const GAS_COIN_PAGE_LIMIT: u64 = 50;

const CIRCUIT_BREAKER_THRESHOLD: u64 = 5;
const CIRCUIT_BREAKER_WINDOW_MS: u64 = 30_000;
struct CircuitState {
    failures: u64,
    last_failure_ms: u64,
    open: bool,
}

/// A sponsor coin usable as gas payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasCoin {
    pub object_id: SuiAddress,
    pub version: u64,
    /// Base58 object digest.
    pub digest: String,
    pub balance: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    Failure(String),
}

/// Network answer to a submission, treated opaquely beyond its status.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub digest: Option<String>,
    pub status: ExecutionStatus,
    pub effects: Option<Value>,
    pub object_changes: Option<Value>,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            digest: None,
            status: ExecutionStatus::Failure(reason.into()),
            effects: None,
            object_changes: None,
        }
    }

    fn from_result(result: Value) -> Self {
        let digest = result["digest"].as_str().map(str::to_string);
        let status = match result["effects"]["status"]["status"].as_str() {
            Some("success") => ExecutionStatus::Success,
            Some(_) => ExecutionStatus::Failure(
                result["effects"]["status"]["error"]
                    .as_str()
                    .unwrap_or("execution failed")
                    .to_string(),
            ),
            None => ExecutionStatus::Failure("no effects returned".into()),
        };
        Self {
            digest,
            status,
            effects: result.get("effects").cloned(),
            object_changes: result.get("objectChanges").cloned(),
        }
    }
}

/// Network operations the coordinator and login flow depend on.
#[async_trait]
pub trait SuiNetwork: Send + Sync {
    async fn current_epoch(&self) -> Result<u64, crate::Error>;

    async fn reference_gas_price(&self) -> Result<u64, crate::Error>;

    /// SUI coins owned by `owner`, first page only.
    async fn gas_coins(&self, owner: &SuiAddress) -> Result<Vec<GasCoin>, crate::Error>;

    /// Total SUI balance of `owner`.
    async fn balance(&self, owner: &SuiAddress) -> Result<u128, crate::Error>;

    /// Submit signed bytes once. A node-side refusal is a failed outcome, not an error.
    async fn execute_transaction(
        &self,
        tx_bytes_b64: &str,
        signatures: &[String],
    ) -> Result<ExecutionOutcome, crate::Error>;
}

#[async_trait]
impl<T: SuiNetwork + ?Sized> SuiNetwork for Arc<T> {
    async fn current_epoch(&self) -> Result<u64, crate::Error> {
        (**self).current_epoch().await
    }

    async fn reference_gas_price(&self) -> Result<u64, crate::Error> {
        (**self).reference_gas_price().await
    }

    async fn gas_coins(&self, owner: &SuiAddress) -> Result<Vec<GasCoin>, crate::Error> {
        (**self).gas_coins(owner).await
    }

    async fn balance(&self, owner: &SuiAddress) -> Result<u128, crate::Error> {
        (**self).balance(owner).await
    }

    async fn execute_transaction(
        &self,
        tx_bytes_b64: &str,
        signatures: &[String],
    ) -> Result<ExecutionOutcome, crate::Error> {
        (**self).execute_transaction(tx_bytes_b64, signatures).await
    }
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorObject>,
}

type RpcReply = Result<Value, RpcErrorObject>;

/// JSON-RPC client with primary → fallback failover.
pub struct RpcClient {
    http: reqwest::Client,
    primary_url: String,
    fallback_url: String,
    circuit: Mutex<CircuitState>,
    total_failovers: AtomicU64,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(primary_url: &str, fallback_url: &str, timeout: Duration) -> Result<Self, crate::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::Error::Config(format!("Failed to build HTTP client: {e}")))?;
        info!(
            primary = primary_url,
            fallback = fallback_url,
            "RPC client initialized with failover"
        );
        Ok(Self {
            http,
            primary_url: primary_url.to_string(),
            fallback_url: fallback_url.to_string(),
            circuit: Mutex::new(CircuitState {
                failures: 0,
                last_failure_ms: 0,
                open: false,
            }),
            total_failovers: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn primary_url(&self) -> &str {
        &self.primary_url
    }

    pub fn fallback_url(&self) -> &str {
        &self.fallback_url
    }

    // --- JSON-RPC transport ---

    async fn post(&self, url: &str, method: &str, params: &Value) -> Result<RpcReply, crate::Error> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });
        let transport = |e: reqwest::Error| {
            if e.is_timeout() {
                crate::Error::Timeout(format!("{method} via {url}"))
            } else {
                crate::Error::Rpc(format!("{method} via {url}: {e}"))
            }
        };

        let resp = self.http.post(url).json(&body).send().await.map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(crate::Error::Rpc(format!("{method} via {url}: HTTP {status}")));
        }
        let parsed: RpcResponse = resp.json().await.map_err(transport)?;
        debug!(method, url, "RPC call complete");

        Ok(match (parsed.result, parsed.error) {
            (_, Some(err)) => Err(err),
            (result, None) => Ok(result.unwrap_or(Value::Null)),
        })
    }

    /// Call on the active endpoint, failing over once on transport errors.
    async fn request(&self, method: &str, params: Value) -> Result<RpcReply, crate::Error> {
        let active = self.active_url();
        match self.post(active, method, &params).await {
            Ok(reply) => {
                self.record_success();
                Ok(reply)
            }
            Err(e) => {
                self.record_failure();
                let backup = self.backup_for(active);
                if backup.is_empty() || backup == active {
                    return Err(e);
                }
                warn!(error = %e, method, "RPC call failed, trying fallback");
                self.post(backup, method, &params).await.map_err(|e2| match e2 {
                    crate::Error::Timeout(_) => e2,
                    _ => crate::Error::Rpc(format!("{method} failed: primary={e}, fallback={e2}")),
                })
            }
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, crate::Error> {
        self.request(method, params).await?.map_err(|err| {
            crate::Error::Rpc(format!("{method}: {} (code {})", err.message, err.code))
        })
    }

    /// Quick connectivity check. Returns "ok", "degraded", or error.
    pub async fn health_check(&self) -> Result<&'static str, crate::Error> {
        let params = json!([]);
        match self.post(&self.primary_url, "suix_getReferenceGasPrice", &params).await {
            Ok(_) => Ok("ok"),
            Err(_) if !self.fallback_url.is_empty() => {
                match self.post(&self.fallback_url, "suix_getReferenceGasPrice", &params).await {
                    Ok(_) => Ok("degraded"),
                    Err(e) => Err(crate::Error::Rpc(format!("Both RPCs unreachable: {e}"))),
                }
            }
            Err(e) => Err(e),
        }
    }

    // --- Failover / circuit breaker ---

    fn backup_for(&self, active: &str) -> &str {
        if active == self.primary_url {
            &self.fallback_url
        } else {
            &self.primary_url
        }
    }

    fn record_success(&self) {
        let mut circuit = self.circuit.lock().unwrap_or_else(|e| e.into_inner());
        if circuit.failures > 0 {
            info!(primary = %self.primary_url, "Primary RPC recovered");
            circuit.failures = 0;
            circuit.open = false;
        }
    }

    fn record_failure(&self) {
        METRICS.rpc_errors.inc();
        if self.fallback_url.is_empty() {
            return;
        }
        let mut circuit = self.circuit.lock().unwrap_or_else(|e| e.into_inner());
        circuit.failures += 1;
        circuit.last_failure_ms = now_ms();
        if circuit.failures >= CIRCUIT_BREAKER_THRESHOLD && !circuit.open {
            circuit.open = true;
            self.total_failovers.fetch_add(1, Ordering::Relaxed);
            METRICS.rpc_failovers.inc();
            warn!(
                failures = circuit.failures,
                fallback = %self.fallback_url,
                "Circuit breaker opened, routing to fallback"
            );
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        let mut circuit = self.circuit.lock().unwrap_or_else(|e| e.into_inner());
        if !circuit.open {
            return false;
        }
        if now_ms().saturating_sub(circuit.last_failure_ms) > CIRCUIT_BREAKER_WINDOW_MS {
            circuit.open = false;
            circuit.failures = 0;
            info!(primary = %self.primary_url, "Circuit breaker half-open, retrying primary");
            return false;
        }
        true
    }

    pub fn failover_count(&self) -> u64 {
        self.total_failovers.load(Ordering::Relaxed)
    }

    /// Currently active RPC URL.
    pub fn active_url(&self) -> &str {
        if self.is_circuit_open() {
            &self.fallback_url
        } else {
            &self.primary_url
        }
    }
}

#[async_trait]
impl SuiNetwork for RpcClient {
    async fn current_epoch(&self) -> Result<u64, crate::Error> {
        let state = self.call("suix_getLatestSuiSystemState", json!([])).await?;
        parse_u64(&state["epoch"], "epoch")
    }

    async fn reference_gas_price(&self) -> Result<u64, crate::Error> {
        let price = self.call("suix_getReferenceGasPrice", json!([])).await?;
        parse_u64(&price, "reference gas price")
    }

    async fn gas_coins(&self, owner: &SuiAddress) -> Result<Vec<GasCoin>, crate::Error> {
        let page = self
            .call(
                "suix_getCoins",
                json!([owner.to_string(), SUI_COIN_TYPE, null, GAS_COIN_PAGE_LIMIT]),
            )
            .await?;
        let data = page["data"]
            .as_array()
            .ok_or_else(|| crate::Error::Rpc("suix_getCoins: missing data".into()))?;
        data.iter().map(parse_coin).collect()
    }

    async fn balance(&self, owner: &SuiAddress) -> Result<u128, crate::Error> {
        let balance = self
            .call("suix_getBalance", json!([owner.to_string(), SUI_COIN_TYPE]))
            .await?;
        let total = &balance["totalBalance"];
        let parsed = match total {
            Value::String(s) => s.parse::<u128>().ok(),
            Value::Number(n) => n.as_u64().map(u128::from),
            _ => None,
        };
        parsed.ok_or_else(|| crate::Error::Rpc(format!("invalid totalBalance: {total}")))
    }

    async fn execute_transaction(
        &self,
        tx_bytes_b64: &str,
        signatures: &[String],
    ) -> Result<ExecutionOutcome, crate::Error> {
        let params = json!([
            tx_bytes_b64,
            signatures,
            { "showEffects": true, "showObjectChanges": true },
            "WaitForLocalExecution",
        ]);
        // Single attempt on the active endpoint: submissions are never retried.
        let url = self.active_url();
        match self.post(url, "sui_executeTransactionBlock", &params).await {
            Ok(Ok(result)) => {
                self.record_success();
                Ok(ExecutionOutcome::from_result(result))
            }
            Ok(Err(err)) => {
                self.record_success();
                Ok(ExecutionOutcome::rejected(err.message))
            }
            Err(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }
}

/// Sui encodes 64-bit values as decimal strings; accept plain numbers too.
fn parse_u64(value: &Value, what: &str) -> Result<u64, crate::Error> {
    let parsed = match value {
        Value::String(s) => s.parse::<u64>().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    };
    parsed.ok_or_else(|| crate::Error::Rpc(format!("invalid {what}: {value}")))
}

fn parse_coin(coin: &Value) -> Result<GasCoin, crate::Error> {
    let object_id = coin["coinObjectId"]
        .as_str()
        .ok_or_else(|| crate::Error::Rpc("coin without coinObjectId".into()))?
        .parse::<SuiAddress>()
        .map_err(|e| crate::Error::Rpc(format!("coin object id: {e}")))?;
    let digest = coin["digest"]
        .as_str()
        .ok_or_else(|| crate::Error::Rpc("coin without digest".into()))?
        .to_string();
    Ok(GasCoin {
        object_id,
        version: parse_u64(&coin["version"], "coin version")?,
        digest,
        balance: parse_u64(&coin["balance"], "coin balance")?,
    })
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
