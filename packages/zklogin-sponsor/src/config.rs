//! Sponsor service configuration.

use serde::{Deserialize, Deserializer};
use std::fmt;
use tracing::error;

const ENV_PREFIX: &str = "ZKLOGIN";

/// Environment variable holding the sponsor's private key.
pub const SPONSOR_KEY_ENV: &str = "ZKLOGIN_SPONSOR_KEY";
/// Environment variable holding the 32-byte hex durable store key.
pub const STORE_KEY_ENV: &str = "ZKLOGIN_STORE_KEY";
/// Environment variable guarding the execute endpoints.
pub const API_KEY_ENV: &str = "ZKLOGIN_API_KEY";

/// Configuration for the sponsor service. Secrets are never read from here.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "defaults::rpc_url")]
    pub rpc_url: String,

    #[serde(default = "defaults::fallback_rpc_url")]
    pub fallback_rpc_url: String,

    #[serde(default = "defaults::prover_url")]
    pub prover_url: String,

    #[serde(default)]
    pub client_id: String,

    /// Extra client ids accepted in a token's `aud`. A comma-separated string in env.
    #[serde(default, deserialize_with = "list_or_csv")]
    pub audience_aliases: Vec<String>,

    #[serde(default = "defaults::issuer")]
    pub issuer: String,

    #[serde(default = "defaults::auth_endpoint")]
    pub auth_endpoint: String,

    #[serde(default = "defaults::redirect_uri")]
    pub redirect_uri: String,

    #[serde(default = "defaults::bind_address")]
    pub bind_address: String,

    /// Fee payer address; derived from the sponsor key when unset.
    #[serde(default)]
    pub sponsor_address: Option<String>,

    #[serde(default = "defaults::gas_budget")]
    pub gas_budget: u64,

    #[serde(default = "defaults::epoch_lookahead")]
    pub epoch_lookahead: u64,

    #[serde(default = "defaults::prover_timeout_ms")]
    pub prover_timeout_ms: u64,

    #[serde(default = "defaults::rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,

    #[serde(default = "defaults::store_path")]
    pub store_path: String,

    /// One fixed salt for every identity instead of durable per-user salts.
    #[serde(default)]
    pub static_salt: Option<String>,

    #[serde(default)]
    pub check_sponsor_balance: bool,

    #[serde(default = "defaults::key_exchange_network")]
    pub key_exchange_network: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: defaults::rpc_url(),
            fallback_rpc_url: defaults::fallback_rpc_url(),
            prover_url: defaults::prover_url(),
            client_id: String::new(),
            audience_aliases: Vec::new(),
            issuer: defaults::issuer(),
            auth_endpoint: defaults::auth_endpoint(),
            redirect_uri: defaults::redirect_uri(),
            bind_address: defaults::bind_address(),
            sponsor_address: None,
            gas_budget: defaults::gas_budget(),
            epoch_lookahead: defaults::epoch_lookahead(),
            prover_timeout_ms: defaults::prover_timeout_ms(),
            rpc_timeout_ms: defaults::rpc_timeout_ms(),
            store_path: defaults::store_path(),
            static_salt: None,
            check_sponsor_balance: false,
            key_exchange_network: defaults::key_exchange_network(),
        }
    }
}

impl Config {
    /// Load `<file>.toml` (optional) overlaid with `ZKLOGIN_*` environment variables.
    pub fn load(file: &str) -> Result<Self, crate::Error> {
        Self::load_with_env(file, None)
    }

    /// As [`Config::load`], reading variables from `env` instead of the process
    /// environment when given.
    ///
    /// Values stay strings until serde sees the target field, so decimal salts
    /// and numeric client ids are never coerced through a float.
    pub fn load_with_env(
        file: &str,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, crate::Error> {
        let loaded: Result<Config, config::ConfigError> = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).source(env))
            .build()
            .and_then(|c| c.try_deserialize());

        let config = loaded.map_err(|e| {
            error!(error = %e, "Config error: fix env vars or {file}.toml");
            crate::Error::Config(e.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.client_id.trim().is_empty() {
            return Err(crate::Error::Config("client_id must be set".into()));
        }
        if self.gas_budget == 0 {
            return Err(crate::Error::Config("gas_budget must be positive".into()));
        }
        if self.prover_timeout_ms == 0 || self.rpc_timeout_ms == 0 {
            return Err(crate::Error::Config("timeouts must be positive".into()));
        }
        Ok(())
    }
}

/// Accept a TOML array or one comma-separated string.
fn list_or_csv<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::List(items) => items,
        Raw::Joined(joined) => joined
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect(),
    })
}

/// Secrets, read from the environment only and kept out of [`Config`].
#[derive(Clone, Default)]
pub struct Secrets {
    pub sponsor_key: Option<String>,
    pub store_key: Option<[u8; 32]>,
    /// Required `x-api-key` for the execute endpoints; `None` disables the check.
    pub api_key: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Result<Self, crate::Error> {
        let store_key = match non_empty_env(STORE_KEY_ENV) {
            Some(hex_key) => Some(parse_store_key(&hex_key)?),
            None => None,
        };
        Ok(Self {
            sponsor_key: non_empty_env(SPONSOR_KEY_ENV),
            store_key,
            api_key: non_empty_env(API_KEY_ENV),
        })
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("sponsor_key", &self.sponsor_key.is_some())
            .field("store_key", &self.store_key.is_some())
            .field("api_key", &self.api_key.is_some())
            .finish()
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub fn parse_store_key(hex_key: &str) -> Result<[u8; 32], crate::Error> {
    let bytes = hex::decode(hex_key.trim())
        .map_err(|e| crate::Error::Config(format!("{STORE_KEY_ENV} is not hex: {e}")))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        crate::Error::Config(format!("{STORE_KEY_ENV} must be 32 bytes, got {}", b.len()))
    })
}

mod defaults {
    pub fn rpc_url() -> String {
        "https://fullnode.testnet.sui.io:443".into()
    }

    pub fn fallback_rpc_url() -> String {
        "https://sui-testnet-rpc.publicnode.com".into()
    }

    pub fn prover_url() -> String {
        "https://prover-dev.mystenlabs.com/v1".into()
    }

    pub fn issuer() -> String {
        zklogin_types::GOOGLE_ISSUER.into()
    }

    pub fn auth_endpoint() -> String {
        zklogin_types::GOOGLE_AUTH_ENDPOINT.into()
    }

    pub fn redirect_uri() -> String {
        "http://localhost:5174/callback".into()
    }

    pub fn bind_address() -> String {
        "127.0.0.1:5174".into()
    }

    pub fn gas_budget() -> u64 {
        50_000_000
    }

    pub fn epoch_lookahead() -> u64 {
        zklogin_auth::DEFAULT_EPOCH_LOOKAHEAD
    }

    pub fn prover_timeout_ms() -> u64 {
        30_000
    }

    pub fn rpc_timeout_ms() -> u64 {
        10_000
    }

    pub fn store_path() -> String {
        "./zklogin-store.json".into()
    }

    pub fn key_exchange_network() -> String {
        "mainnet".into()
    }
}
