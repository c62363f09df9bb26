//! Response types for the sponsor API.

use serde::Serialize;
use serde_json::Value;

use crate::rpc::ExecutionOutcome;

/// Response from the execute endpoints.
#[derive(Serialize)]
pub struct ExecuteResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effects: Option<Value>,
    #[serde(rename = "objectChanges", skip_serializing_if = "Option::is_none")]
    pub object_changes: Option<Value>,
}

impl From<ExecutionOutcome> for ExecuteResponse {
    fn from(outcome: ExecutionOutcome) -> Self {
        Self {
            success: outcome.is_success(),
            digest: outcome.digest,
            effects: outcome.effects,
            object_changes: outcome.object_changes,
        }
    }
}

/// Response from a completed login.
#[derive(Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub address: String,
    pub max_epoch: u64,
}

/// Sponsor account summary.
#[derive(Serialize)]
pub struct SponsorResponse {
    pub address: String,
    pub balance: String,
}

/// Response from the health endpoint.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub sponsor_address: Option<String>,
    pub logged_in: bool,
    pub uptime_secs: u64,
    pub requests: u64,
    pub active_rpc: String,
    pub failovers: u64,
    pub rpc_status: &'static str,
}
