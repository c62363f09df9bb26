//! End-to-end login: session → provider redirect → callback → salt →
//! address → proof → credentials.

use ed25519_dalek::{SigningKey, VerifyingKey};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;
use zklogin_auth::{authorization_url, validate_callback, BlobStore, SaltManager, SessionManager};
use zklogin_types::{derive_identity, OidcProvider, SuiAddress, ZkProof};

use crate::metrics::METRICS;
use crate::prover::{ProofInputs, ProverClient};
use crate::rpc::SuiNetwork;

/// Everything needed to sign as the zkLogin address until `max_epoch`.
#[derive(Clone)]
pub struct ZkLoginCredentials {
    pub address: SuiAddress,
    pub address_seed: String,
    pub max_epoch: u64,
    pub proof: Option<ZkProof>,
    pub salt: String,
    ephemeral_key: SigningKey,
}

impl ZkLoginCredentials {
    pub fn new(
        address: SuiAddress,
        address_seed: String,
        max_epoch: u64,
        proof: Option<ZkProof>,
        salt: String,
        ephemeral_key: SigningKey,
    ) -> Self {
        Self {
            address,
            address_seed,
            max_epoch,
            proof,
            salt,
            ephemeral_key,
        }
    }

    pub fn ephemeral_key(&self) -> &SigningKey {
        &self.ephemeral_key
    }

    pub fn ephemeral_public_key(&self) -> VerifyingKey {
        self.ephemeral_key.verifying_key()
    }
}

impl std::fmt::Debug for ZkLoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZkLoginCredentials")
            .field("address", &self.address)
            .field("max_epoch", &self.max_epoch)
            .field("has_proof", &self.proof.is_some())
            .finish_non_exhaustive()
    }
}

/// Redirect target of a freshly started login.
#[derive(Debug, Clone)]
pub struct LoginStart {
    pub authorization_url: Url,
    pub nonce: String,
    pub max_epoch: u64,
}

pub struct LoginFlow<N, T, D> {
    network: N,
    prover: ProverClient,
    provider: OidcProvider,
    redirect_uri: String,
    sessions: SessionManager<T>,
    salts: SaltManager<D>,
    network_timeout: Duration,
}

impl<N: SuiNetwork, T: BlobStore, D: BlobStore> LoginFlow<N, T, D> {
    pub fn new(
        network: N,
        prover: ProverClient,
        provider: OidcProvider,
        redirect_uri: impl Into<String>,
        sessions: SessionManager<T>,
        salts: SaltManager<D>,
    ) -> Self {
        Self {
            network,
            prover,
            provider,
            redirect_uri: redirect_uri.into(),
            sessions,
            salts,
            network_timeout: Duration::from_secs(10),
        }
    }

    /// Bound on each network read made by the flow (the prover has its own).
    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = timeout;
        self
    }

    pub fn provider(&self) -> &OidcProvider {
        &self.provider
    }

    pub fn sessions(&self) -> &SessionManager<T> {
        &self.sessions
    }

    /// Start a fresh attempt, discarding any stale session.
    pub async fn begin(&self) -> Result<LoginStart, crate::Error> {
        let epoch = self
            .bounded("current epoch", self.network.current_epoch())
            .await?;

        self.sessions.clear()?;
        let session = self.sessions.start(epoch)?;
        let url = authorization_url(&self.provider, &self.redirect_uri, session.nonce())?;
        METRICS.logins_started.inc();

        Ok(LoginStart {
            authorization_url: url,
            nonce: session.nonce().to_string(),
            max_epoch: session.max_epoch(),
        })
    }

    /// Finish the attempt with the provider's identity token.
    pub async fn complete(&self, id_token: &str) -> Result<ZkLoginCredentials, crate::Error> {
        let result = self.try_complete(id_token).await;
        match &result {
            Ok(credentials) => {
                METRICS.logins_completed.inc();
                info!(address = %credentials.address, "Login complete");
            }
            Err(e) => {
                METRICS.login_failures.inc();
                warn!(kind = e.kind(), error = %e, "Login failed");
            }
        }
        result
    }

    async fn try_complete(&self, id_token: &str) -> Result<ZkLoginCredentials, crate::Error> {
        let login = validate_callback(&self.sessions, id_token)?;
        // Reject foreign tokens before anything is persisted for their subject.
        self.provider.canonical_audience_for(&login.claims)?;
        let issuer = self.provider.canonical_issuer_for(&login.claims)?;
        let salt = self.salts.get_or_create(issuer, &login.claims.sub)?;
        let identity = derive_identity(&login.claims, &salt, &self.provider)?;

        let session = login.session;
        let proof = self
            .prover
            .request_proof(ProofInputs {
                id_token,
                ephemeral_public_key: &session.public_key(),
                max_epoch: session.max_epoch(),
                randomness: session.randomness(),
                salt: &salt,
            })
            .await;

        // The session is single-use whatever the prover answered.
        self.sessions.clear()?;
        let proof = proof?;

        Ok(ZkLoginCredentials::new(
            identity.address,
            identity.address_seed,
            session.max_epoch(),
            Some(proof),
            salt,
            session.into_signing_key(),
        ))
    }

    async fn bounded<R>(
        &self,
        what: &str,
        fut: impl Future<Output = Result<R, crate::Error>>,
    ) -> Result<R, crate::Error> {
        tokio::time::timeout(self.network_timeout, fut)
            .await
            .map_err(|_| {
                crate::Error::Timeout(format!(
                    "{what} after {}ms",
                    self.network_timeout.as_millis()
                ))
            })?
    }
}
