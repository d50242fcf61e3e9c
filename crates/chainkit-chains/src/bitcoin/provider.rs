//! Bitcoin data providers.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use chainkit_core::{ChainError, ConfigError, NetworkError, NetworkProvider, TransactionStatus};
use chainkit_network::{ProviderConfig, RestClient};

use super::builder::FeeRates;

/// An unspent output as reported for one address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressUtxo {
    pub txid: String,
    pub vout: u32,
    pub value: u64,
    pub confirmed: bool,
}

/// Calls a Bitcoin-family backend must serve.
#[async_trait]
pub trait UtxoProvider: NetworkProvider {
    /// Unspent outputs locked to `address`, mempool included.
    async fn utxos(&self, address: &str) -> Result<Vec<AddressUtxo>, ChainError>;

    /// Per-kB rates for the minimum, normal and priority tiers.
    async fn fee_rates(&self) -> Result<FeeRates, ChainError>;

    /// Broadcast a hex transaction and return its txid.
    async fn broadcast(&self, raw_hex: &str) -> Result<String, ChainError>;

    async fn transaction_status(&self, txid: &str) -> Result<TransactionStatus, ChainError>;
}

/// Confirmation targets (in blocks) backing each fee tier.
const PRIORITY_TARGET: &str = "1";
const NORMAL_TARGET: &str = "6";
const MINIMUM_TARGET: &str = "144";

#[derive(Debug, Deserialize)]
struct EsploraStatus {
    confirmed: bool,
}

#[derive(Debug, Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    value: u64,
    status: EsploraStatus,
}

#[derive(Debug, Deserialize)]
struct RpcRejection {
    code: i64,
    message: String,
}

/// A 400 from `POST /tx` is the node refusing the transaction. Esplora relays
/// bitcoind's reply as `sendrawtransaction RPC error: {"code":..,"message":..}`.
fn submission_error(err: ChainError) -> ChainError {
    match err {
        ChainError::Network(NetworkError::Http { status: 400, body }) => {
            let rejection = body
                .find('{')
                .and_then(|start| serde_json::from_str::<RpcRejection>(&body[start..]).ok());
            match rejection {
                Some(RpcRejection { code, message }) => ChainError::remote(code, message),
                None => ChainError::remote(400, body.trim()),
            }
        }
        other => other,
    }
}

/// Esplora REST API (Blockstream, mempool.space and self-hosted instances).
#[derive(Debug)]
pub struct EsploraProvider {
    client: RestClient,
}

impl EsploraProvider {
    pub fn new(base_url: impl Into<String>, config: &ProviderConfig) -> Result<Self, ConfigError> {
        Ok(Self { client: RestClient::new(base_url, config)? })
    }
}

impl NetworkProvider for EsploraProvider {
    fn base_url(&self) -> &str {
        self.client.base_url()
    }
}

fn per_kb(estimates: &HashMap<String, f64>, target: &str) -> Result<u64, ChainError> {
    let sat_per_vbyte = estimates
        .get(target)
        .ok_or_else(|| NetworkError::Decode(format!("no fee estimate for {target} blocks")))?;
    Ok((sat_per_vbyte * 1_000.0).ceil() as u64)
}

#[async_trait]
impl UtxoProvider for EsploraProvider {
    async fn utxos(&self, address: &str) -> Result<Vec<AddressUtxo>, ChainError> {
        let utxos: Vec<EsploraUtxo> = self.client.get_json(&format!("address/{address}/utxo")).await?;
        Ok(utxos
            .into_iter()
            .map(|u| AddressUtxo { txid: u.txid, vout: u.vout, value: u.value, confirmed: u.status.confirmed })
            .collect())
    }

    async fn fee_rates(&self) -> Result<FeeRates, ChainError> {
        let estimates: HashMap<String, f64> = self.client.get_json("fee-estimates").await?;
        Ok(FeeRates {
            minimum: per_kb(&estimates, MINIMUM_TARGET)?,
            normal: per_kb(&estimates, NORMAL_TARGET)?,
            priority: per_kb(&estimates, PRIORITY_TARGET)?,
        })
    }

    async fn broadcast(&self, raw_hex: &str) -> Result<String, ChainError> {
        let txid = self.client.post_text("tx", raw_hex.to_string()).await.map_err(submission_error)?;
        Ok(txid.trim().to_string())
    }

    async fn transaction_status(&self, txid: &str) -> Result<TransactionStatus, ChainError> {
        match self.client.get_json::<EsploraStatus>(&format!("tx/{txid}/status")).await {
            Ok(EsploraStatus { confirmed: true }) => Ok(TransactionStatus::Confirmed),
            Ok(_) => Ok(TransactionStatus::Unconfirmed),
            // not propagated to this backend yet
            Err(ChainError::Network(NetworkError::Http { status: 404, .. })) => {
                Ok(TransactionStatus::Unconfirmed)
            }
            Err(err) => Err(err),
        }
    }
}
