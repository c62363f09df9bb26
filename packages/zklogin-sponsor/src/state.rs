//! Application state shared across handlers.

use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::info;
use zklogin_auth::{MemoryStore, SaltManager, SessionManager};
use zklogin_types::{OidcProvider, SuiAddress};

use crate::config::{Config, Secrets};
use crate::coordinator::Coordinator;
use crate::key_store::FileStore;
use crate::login::{LoginFlow, ZkLoginCredentials};
use crate::prover::ProverClient;
use crate::rpc::RpcClient;

pub type ServiceLogin = LoginFlow<Arc<RpcClient>, MemoryStore, Arc<FileStore>>;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Required on the execute routes when set.
    pub api_key: Option<String>,
    pub rpc: Arc<RpcClient>,
    pub login: ServiceLogin,
    pub coordinator: Coordinator<Arc<RpcClient>>,
    /// Credentials of the last completed login, cleared on restart.
    pub credentials: RwLock<Option<ZkLoginCredentials>>,
    pub start_time: Instant,
    pub request_count: AtomicU64,
}

impl AppState {
    /// Create application state. Secrets are passed in, never read from `config`.
    pub fn new(config: Config, secrets: Secrets) -> Result<Self, crate::Error> {
        config.validate()?;

        let rpc = Arc::new(RpcClient::new(
            &config.rpc_url,
            &config.fallback_rpc_url,
            Duration::from_millis(config.rpc_timeout_ms),
        )?);
        let prover = ProverClient::new(
            &config.prover_url,
            Duration::from_millis(config.prover_timeout_ms),
            &config.key_exchange_network,
        )?;

        let store_path = PathBuf::from(&config.store_path);
        let durable = Arc::new(match secrets.store_key {
            Some(key) => FileStore::new_encrypted(store_path, key),
            None => FileStore::new_plaintext(store_path),
        });
        info!(path = %config.store_path, encrypted = durable.is_encrypted(), "Durable store ready");

        let mut salts = SaltManager::new(Arc::clone(&durable));
        if let Some(salt) = &config.static_salt {
            salts = salts.with_static_salt(salt.clone())?;
            info!("Using static salt for all identities");
        }
        let sessions =
            SessionManager::new(MemoryStore::new()).with_epoch_lookahead(config.epoch_lookahead);

        let provider = OidcProvider::new(&config.issuer, &config.client_id, &config.auth_endpoint)
            .with_audience_aliases(config.audience_aliases.clone());

        let login = LoginFlow::new(
            Arc::clone(&rpc),
            prover,
            provider,
            &config.redirect_uri,
            sessions,
            salts,
        )
        .with_network_timeout(Duration::from_millis(config.rpc_timeout_ms));

        let mut coordinator =
            Coordinator::new(Arc::clone(&rpc), secrets.sponsor_key.as_deref())
                .with_gas_budget(config.gas_budget)
                .with_balance_check(config.check_sponsor_balance);
        if let Some(address) = &config.sponsor_address {
            let address: SuiAddress = address.parse()?;
            coordinator = coordinator.with_sponsor_address(address)?;
        }

        Ok(Self {
            config,
            api_key: secrets.api_key,
            rpc,
            login,
            coordinator,
            credentials: RwLock::new(None),
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
        })
    }
}
