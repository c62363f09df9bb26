//! # zkLogin Sponsor
//!
//! zkLogin for Sui with sponsored gas: the user logs in through an OpenID
//! provider, obtains a zero-knowledge proof, and sends transactions whose
//! fees are paid by a sponsor key co-signing the same bytes.
//!
//! ## Quick Start
//! ```bash
//! ZKLOGIN_CLIENT_ID=... ZKLOGIN_SPONSOR_KEY=suiprivkey1... cargo run --bin zklogin-sponsor
//! ```
//!
//! ## Endpoints
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics
//! - `GET /login` - Redirect to the identity provider
//! - `GET /callback` - Relays the token fragment to `POST /callback`
//! - `POST /callback` - Complete login with `{id_token}`
//! - `GET /sponsor` - Sponsor address and balance
//! - `POST /execute` - Sponsored transaction from `{tx_kind_base64}`
//! - `POST /sponsor/execute` - Transaction sent and paid by the sponsor

pub mod config;
pub mod coordinator;
mod error;
mod handlers;
pub mod key_store;
pub mod login;
pub mod metrics;
pub mod middleware;
pub mod prover;
mod response;
mod router;
pub mod rpc;
pub mod signer;
mod state;
pub mod transaction;

pub use config::{Config, Secrets};
pub use coordinator::{Coordinator, SponsoredTransaction, TxStage};
pub use error::Error;
pub use login::{LoginFlow, LoginStart, ZkLoginCredentials};
pub use prover::{ProofInputs, ProverClient};
pub use router::create as create_router;
pub use rpc::{ExecutionOutcome, ExecutionStatus, GasCoin, RpcClient, SuiNetwork};
pub use state::AppState;
