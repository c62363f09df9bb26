//! `TransactionData` assembly in the network's BCS wire format.
//!
//! The caller's `TransactionKind` is already BCS-encoded and opaque here; it
//! is spliced in verbatim between the version tag and the sender.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde::Serialize;
use zklogin_types::{transaction_digest, SuiAddress};

use crate::rpc::GasCoin;

/// Most gas payment objects one transaction may reference.
pub const MAX_GAS_PAYMENT_OBJECTS: usize = 256;

// `TransactionData::V1` variant tag.
const TRANSACTION_DATA_V1: u8 = 0x00;

/// Serialized transaction bytes and their digest. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltTransaction {
    bytes: Vec<u8>,
    digest: String,
}

impl BuiltTransaction {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn to_base64(&self) -> String {
        B64.encode(&self.bytes)
    }
}

/// Fee payer side of a transaction.
#[derive(Debug, Clone)]
pub struct GasConfig {
    pub owner: SuiAddress,
    pub price: u64,
    pub budget: u64,
    pub payment: Vec<GasCoin>,
}

#[derive(Serialize)]
struct ObjectRefBcs {
    object_id: [u8; 32],
    version: u64,
    digest: Vec<u8>,
}

#[derive(Serialize)]
struct GasDataBcs {
    payment: Vec<ObjectRefBcs>,
    owner: [u8; 32],
    price: u64,
    budget: u64,
}

#[derive(Serialize)]
enum ExpirationBcs {
    None,
}

// Everything after the transaction kind.
#[derive(Serialize)]
struct TransactionTailBcs {
    sender: [u8; 32],
    gas_data: GasDataBcs,
    expiration: ExpirationBcs,
}

/// Serialize `TransactionData::V1 { kind, sender, gas_data, expiration: None }`.
pub fn build_transaction(
    kind_bytes: &[u8],
    sender: SuiAddress,
    gas: &GasConfig,
) -> Result<BuiltTransaction, crate::Error> {
    if kind_bytes.is_empty() {
        return Err(crate::Error::InvalidInput("transaction kind is empty".into()));
    }
    if gas.payment.is_empty() {
        return Err(crate::Error::InvalidInput("no gas payment coins".into()));
    }

    let payment = gas
        .payment
        .iter()
        .map(object_ref)
        .collect::<Result<Vec<_>, _>>()?;
    let tail = TransactionTailBcs {
        sender: *sender.as_bytes(),
        gas_data: GasDataBcs {
            payment,
            owner: *gas.owner.as_bytes(),
            price: gas.price,
            budget: gas.budget,
        },
        expiration: ExpirationBcs::None,
    };
    let tail_bytes = bcs::to_bytes(&tail)
        .map_err(|e| crate::Error::InvalidInput(format!("bcs encode: {e}")))?;

    let mut bytes = Vec::with_capacity(1 + kind_bytes.len() + tail_bytes.len());
    bytes.push(TRANSACTION_DATA_V1);
    bytes.extend_from_slice(kind_bytes);
    bytes.extend_from_slice(&tail_bytes);

    let digest = transaction_digest(&bytes);
    Ok(BuiltTransaction { bytes, digest })
}

fn object_ref(coin: &GasCoin) -> Result<ObjectRefBcs, crate::Error> {
    let digest = bs58::decode(&coin.digest)
        .into_vec()
        .map_err(|e| crate::Error::Rpc(format!("coin digest {}: {e}", coin.digest)))?;
    if digest.len() != 32 {
        return Err(crate::Error::Rpc(format!(
            "coin digest {} is {} bytes",
            coin.digest,
            digest.len()
        )));
    }
    Ok(ObjectRefBcs {
        object_id: *coin.object_id.as_bytes(),
        version: coin.version,
        digest,
    })
}

/// Largest coins first until `budget` is covered.
///
/// When the coins cannot cover it, all of them are used and the network
/// decides; an empty coin set is always an error.
pub fn select_gas_coins(mut coins: Vec<GasCoin>, budget: u64) -> Result<Vec<GasCoin>, crate::Error> {
    if coins.is_empty() {
        return Err(crate::Error::InsufficientSponsorBalance {
            required: budget,
            available: 0,
        });
    }
    coins.sort_by(|a, b| b.balance.cmp(&a.balance));

    let mut selected = Vec::new();
    let mut covered: u128 = 0;
    for coin in coins.into_iter().take(MAX_GAS_PAYMENT_OBJECTS) {
        covered += u128::from(coin.balance);
        selected.push(coin);
        if covered >= u128::from(budget) {
            break;
        }
    }
    Ok(selected)
}
