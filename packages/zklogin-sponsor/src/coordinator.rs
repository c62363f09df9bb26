//! Sponsored transaction coordinator.
//!
//! One transaction moves `Built → UserSigned → SponsorSigned → Submitted →
//! {Confirmed | Rejected}`. Both signatures cover the bytes stored at build
//! time; there is no way to mutate them afterwards, only to rebuild.

use std::fmt;
use std::time::Instant;
use tracing::{info, warn};
use zklogin_types::{sign_transaction, zklogin_signature, SuiAddress};

use crate::login::ZkLoginCredentials;
use crate::metrics::METRICS;
use crate::rpc::{ExecutionOutcome, ExecutionStatus, SuiNetwork};
use crate::signer::SponsorSigner;
use crate::transaction::{build_transaction, select_gas_coins, BuiltTransaction, GasConfig};

pub const DEFAULT_GAS_BUDGET: u64 = 50_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStage {
    Built,
    UserSigned,
    SponsorSigned,
    Submitted,
    Confirmed,
    Rejected,
}

impl TxStage {
    /// Submitted or terminal: only a rebuild moves forward.
    pub fn is_spent(self) -> bool {
        matches!(self, Self::Submitted | Self::Confirmed | Self::Rejected)
    }
}

impl fmt::Display for TxStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Built => "Built",
            Self::UserSigned => "UserSigned",
            Self::SponsorSigned => "SponsorSigned",
            Self::Submitted => "Submitted",
            Self::Confirmed => "Confirmed",
            Self::Rejected => "Rejected",
        };
        f.write_str(name)
    }
}

/// A transaction with a sender (the user) and a fee payer (the sponsor).
#[derive(Debug, Clone)]
pub struct SponsoredTransaction {
    built: BuiltTransaction,
    sender: SuiAddress,
    fee_payer: SuiAddress,
    gas_budget: u64,
    stage: TxStage,
    user_signature: Option<String>,
    sponsor_signature: Option<String>,
    outcome: Option<ExecutionOutcome>,
}

impl SponsoredTransaction {
    pub fn stage(&self) -> TxStage {
        self.stage
    }

    pub fn bytes(&self) -> &[u8] {
        self.built.bytes()
    }

    pub fn digest(&self) -> &str {
        self.built.digest()
    }

    pub fn sender(&self) -> SuiAddress {
        self.sender
    }

    pub fn fee_payer(&self) -> SuiAddress {
        self.fee_payer
    }

    pub fn gas_budget(&self) -> u64 {
        self.gas_budget
    }

    /// Composite zkLogin credential, once user-signed.
    pub fn user_signature(&self) -> Option<&str> {
        self.user_signature.as_deref()
    }

    pub fn sponsor_signature(&self) -> Option<&str> {
        self.sponsor_signature.as_deref()
    }

    pub fn outcome(&self) -> Option<&ExecutionOutcome> {
        self.outcome.as_ref()
    }

    fn require(&self, stage: TxStage) -> Result<(), crate::Error> {
        if self.stage.is_spent() {
            return Err(crate::Error::SignatureAssembly(format!(
                "transaction must be rebuilt (stage {})",
                self.stage
            )));
        }
        if self.stage != stage {
            return Err(crate::Error::SignatureAssembly(format!(
                "expected stage {stage}, found {}",
                self.stage
            )));
        }
        Ok(())
    }
}

/// Builds, co-signs and submits sponsored transactions.
pub struct Coordinator<N> {
    network: N,
    /// Resolved once at construction; unusable keys surface at signing time.
    sponsor: Result<SponsorSigner, String>,
    fee_payer: Option<SuiAddress>,
    gas_budget: u64,
    check_balance: bool,
}

impl<N: SuiNetwork> Coordinator<N> {
    /// `sponsor_key` is a `suiprivkey1…` or hex secret; `None` means unset.
    pub fn new(network: N, sponsor_key: Option<&str>) -> Self {
        let sponsor = match sponsor_key {
            Some(secret) => SponsorSigner::from_secret(secret).map_err(|e| e.to_string()),
            None => Err("sponsor key is not configured".to_string()),
        };
        match &sponsor {
            Ok(signer) => info!(sponsor = %signer.address(), "Sponsor key loaded"),
            Err(e) => warn!(error = %e, "Sponsor key unavailable"),
        }
        Self {
            network,
            sponsor,
            fee_payer: None,
            gas_budget: DEFAULT_GAS_BUDGET,
            check_balance: false,
        }
    }

    /// Declare the fee payer explicitly. Must match the sponsor key when one loaded.
    pub fn with_sponsor_address(mut self, address: SuiAddress) -> Result<Self, crate::Error> {
        if let Ok(signer) = &self.sponsor {
            if signer.address() != address {
                return Err(crate::Error::Config(format!(
                    "sponsor address {address} does not match sponsor key {}",
                    signer.address()
                )));
            }
        }
        self.fee_payer = Some(address);
        Ok(self)
    }

    pub fn with_gas_budget(mut self, gas_budget: u64) -> Self {
        self.gas_budget = gas_budget;
        self
    }

    /// Enable the advisory balance check before sponsor signing.
    pub fn with_balance_check(mut self, enabled: bool) -> Self {
        self.check_balance = enabled;
        self
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn gas_budget(&self) -> u64 {
        self.gas_budget
    }

    fn signer(&self) -> Result<&SponsorSigner, crate::Error> {
        self.sponsor
            .as_ref()
            .map_err(|e| crate::Error::SponsorKeyUnavailable(e.clone()))
    }

    /// Fee payer address.
    pub fn sponsor_address(&self) -> Result<SuiAddress, crate::Error> {
        match (&self.sponsor, self.fee_payer) {
            (Ok(signer), _) => Ok(signer.address()),
            (Err(_), Some(address)) => Ok(address),
            (Err(e), None) => Err(crate::Error::SponsorKeyUnavailable(e.clone())),
        }
    }

    pub async fn sponsor_balance(&self) -> Result<u128, crate::Error> {
        let address = self.sponsor_address()?;
        self.network.balance(&address).await
    }

    /// Assemble `kind_bytes` into a transaction sent by the user, paid by the sponsor.
    pub async fn build(
        &self,
        kind_bytes: &[u8],
        credentials: &ZkLoginCredentials,
    ) -> Result<SponsoredTransaction, crate::Error> {
        let fee_payer = self.sponsor_address()?;
        self.build_for(kind_bytes, credentials.address, fee_payer).await
    }

    async fn build_for(
        &self,
        kind_bytes: &[u8],
        sender: SuiAddress,
        fee_payer: SuiAddress,
    ) -> Result<SponsoredTransaction, crate::Error> {
        let price = self.network.reference_gas_price().await?;
        let coins = self.network.gas_coins(&fee_payer).await?;
        let payment = select_gas_coins(coins, self.gas_budget)?;

        let built = build_transaction(
            kind_bytes,
            sender,
            &GasConfig {
                owner: fee_payer,
                price,
                budget: self.gas_budget,
                payment,
            },
        )?;
        info!(
            digest = %built.digest(),
            sender = %sender,
            fee_payer = %fee_payer,
            gas_price = price,
            "Transaction built"
        );

        Ok(SponsoredTransaction {
            built,
            sender,
            fee_payer,
            gas_budget: self.gas_budget,
            stage: TxStage::Built,
            user_signature: None,
            sponsor_signature: None,
            outcome: None,
        })
    }

    /// Sign the stored bytes with the ephemeral key and assemble the composite credential.
    pub fn sign_user(
        &self,
        tx: &mut SponsoredTransaction,
        credentials: &ZkLoginCredentials,
        current_epoch: u64,
    ) -> Result<(), crate::Error> {
        tx.require(TxStage::Built)?;
        if credentials.address != tx.sender {
            return Err(crate::Error::SignatureAssembly(format!(
                "credentials are for {}, transaction sender is {}",
                credentials.address, tx.sender
            )));
        }
        let proof = credentials
            .proof
            .as_ref()
            .ok_or_else(|| crate::Error::SignatureAssembly("zero-knowledge proof is missing".into()))?;
        if current_epoch > credentials.max_epoch {
            return Err(crate::Error::SignatureAssembly(format!(
                "ephemeral key expired: epoch {current_epoch} > max epoch {}",
                credentials.max_epoch
            )));
        }

        let ephemeral_signature = sign_transaction(credentials.ephemeral_key(), tx.bytes());
        let composite = zklogin_signature(
            proof,
            &credentials.address_seed,
            credentials.max_epoch,
            &ephemeral_signature,
        )
        .map_err(|e| crate::Error::SignatureAssembly(e.to_string()))?;

        tx.user_signature = Some(composite);
        tx.stage = TxStage::UserSigned;
        info!(digest = %tx.digest(), "User signature attached");
        Ok(())
    }

    /// Co-sign the identical bytes with the sponsor key.
    pub async fn sign_sponsor(&self, tx: &mut SponsoredTransaction) -> Result<(), crate::Error> {
        let signer = self.signer()?;
        tx.require(TxStage::UserSigned)?;
        if signer.address() != tx.fee_payer {
            return Err(crate::Error::SignatureAssembly(format!(
                "sponsor key {} is not the fee payer {}",
                signer.address(),
                tx.fee_payer
            )));
        }

        if self.check_balance {
            let available = self.network.balance(&tx.fee_payer).await?;
            if available < u128::from(tx.gas_budget) {
                warn!(available, required = tx.gas_budget, "Sponsor balance below gas budget");
                return Err(crate::Error::InsufficientSponsorBalance {
                    required: tx.gas_budget,
                    available,
                });
            }
        }

        tx.sponsor_signature = Some(signer.sign(tx.bytes()));
        tx.stage = TxStage::SponsorSigned;
        info!(digest = %tx.digest(), "Sponsor signature attached");
        Ok(())
    }

    /// Submit once. Transport failures leave the transaction `Submitted`.
    pub async fn submit(
        &self,
        tx: &mut SponsoredTransaction,
    ) -> Result<ExecutionOutcome, crate::Error> {
        tx.require(TxStage::SponsorSigned)?;
        let (Some(user), Some(sponsor)) = (&tx.user_signature, &tx.sponsor_signature) else {
            return Err(crate::Error::SignatureAssembly("signatures are incomplete".into()));
        };
        let signatures = vec![user.clone(), sponsor.clone()];

        tx.stage = TxStage::Submitted;
        let outcome = self.send(&tx.built, &signatures).await?;
        tx.outcome = Some(outcome.clone());
        self.settle(tx, outcome)
    }

    async fn send(
        &self,
        built: &BuiltTransaction,
        signatures: &[String],
    ) -> Result<ExecutionOutcome, crate::Error> {
        let start = Instant::now();
        METRICS.tx_submitted.inc();
        info!(digest = %built.digest(), "Submitting transaction");
        let result = self
            .network
            .execute_transaction(&built.to_base64(), signatures)
            .await;
        METRICS.tx_latency.record(start);
        if let Err(e) = &result {
            warn!(digest = %built.digest(), error = %e, "Submission outcome unknown");
        }
        result
    }

    fn settle(
        &self,
        tx: &mut SponsoredTransaction,
        outcome: ExecutionOutcome,
    ) -> Result<ExecutionOutcome, crate::Error> {
        match &outcome.status {
            ExecutionStatus::Success => {
                METRICS.tx_confirmed.inc();
                tx.stage = TxStage::Confirmed;
                info!(digest = %tx.digest(), "Transaction confirmed");
                Ok(outcome)
            }
            ExecutionStatus::Failure(reason) => {
                METRICS.tx_rejected.inc();
                tx.stage = TxStage::Rejected;
                warn!(digest = %tx.digest(), reason = %reason, "Transaction rejected");
                Err(crate::Error::SubmissionRejected {
                    digest: outcome
                        .digest
                        .clone()
                        .unwrap_or_else(|| tx.digest().to_string()),
                    reason: reason.clone(),
                })
            }
        }
    }

    /// Build → fetch epoch → sign user → sign sponsor → submit. No retries.
    pub async fn execute(
        &self,
        kind_bytes: &[u8],
        credentials: &ZkLoginCredentials,
    ) -> Result<ExecutionOutcome, crate::Error> {
        let mut tx = self.build(kind_bytes, credentials).await?;
        let epoch = self.network.current_epoch().await?;
        self.sign_user(&mut tx, credentials, epoch)?;
        self.sign_sponsor(&mut tx).await?;
        self.submit(&mut tx).await
    }

    /// Sponsor as both sender and fee payer, single signature.
    pub async fn execute_as_sponsor(
        &self,
        kind_bytes: &[u8],
    ) -> Result<ExecutionOutcome, crate::Error> {
        let signer = self.signer()?;
        let address = signer.address();
        let mut tx = self.build_for(kind_bytes, address, address).await?;

        let signature = signer.sign(tx.bytes());
        tx.sponsor_signature = Some(signature.clone());
        tx.stage = TxStage::Submitted;
        let outcome = self.send(&tx.built, &[signature]).await?;
        tx.outcome = Some(outcome.clone());
        self.settle(&mut tx, outcome)
    }
}
