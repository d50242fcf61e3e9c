//! Substrate data providers.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::json;
use std::fmt::Display;
use std::str::FromStr;

use chainkit_core::{ChainError, ConfigError, NetworkError, NetworkProvider};
use chainkit_network::{ProviderConfig, RestClient};

/// Balances of one account as of the best block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubstrateAccount {
    pub nonce: u64,
    pub free: u128,
    pub reserved: u128,
}

/// Everything needed to sign against the current runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeMaterial {
    pub block_hash: [u8; 32],
    pub block_number: u64,
    pub genesis_hash: [u8; 32],
    pub spec_version: u32,
    pub transaction_version: u32,
}

#[async_trait]
pub trait SubstrateProvider: NetworkProvider {
    async fn account(&self, address: &str) -> Result<SubstrateAccount, ChainError>;

    async fn runtime(&self) -> Result<RuntimeMaterial, ChainError>;

    /// Partial fee of a signed (or dummy-signed) extrinsic.
    async fn fee_estimate(&self, extrinsic: &[u8]) -> Result<u128, ChainError>;

    /// Returns the extrinsic hash.
    async fn submit(&self, extrinsic: &[u8]) -> Result<String, ChainError>;
}

/// Sidecar renders every integer as a decimal string.
fn from_decimal<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

fn hash32(value: &str) -> Result<[u8; 32], NetworkError> {
    let bytes = hex::decode(value.trim_start_matches("0x")).map_err(|e| NetworkError::Decode(format!("{value}: {e}")))?;
    bytes.try_into().map_err(|_| NetworkError::Decode(format!("expected a 32-byte hash: {value}")))
}

fn extrinsic_hex(extrinsic: &[u8]) -> String {
    format!("0x{}", hex::encode(extrinsic))
}

#[derive(Debug, Deserialize)]
struct BalanceInfo {
    #[serde(deserialize_with = "from_decimal")]
    nonce: u64,
    #[serde(deserialize_with = "from_decimal")]
    free: u128,
    #[serde(deserialize_with = "from_decimal")]
    reserved: u128,
}

#[derive(Debug, Deserialize)]
struct BlockAt {
    hash: String,
    #[serde(deserialize_with = "from_decimal")]
    height: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Material {
    at: BlockAt,
    genesis_hash: String,
    #[serde(deserialize_with = "from_decimal")]
    spec_version: u32,
    #[serde(deserialize_with = "from_decimal")]
    tx_version: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeeInfo {
    #[serde(deserialize_with = "from_decimal")]
    partial_fee: u128,
}

#[derive(Debug, Deserialize)]
struct Submitted {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct Rejection {
    #[serde(default)]
    error: String,
    #[serde(default)]
    cause: Option<serde_json::Value>,
}

/// A 400 from the submit endpoint is the node refusing the extrinsic.
fn submission_error(err: ChainError) -> ChainError {
    match err {
        ChainError::Network(NetworkError::Http { status: 400, body }) => {
            let message = match serde_json::from_str::<Rejection>(&body) {
                Ok(Rejection { cause: Some(serde_json::Value::String(cause)), .. }) => cause,
                Ok(Rejection { error, .. }) if !error.is_empty() => error,
                _ => body,
            };
            ChainError::remote(400, message)
        }
        other => other,
    }
}

/// Substrate API Sidecar REST gateway.
#[derive(Debug)]
pub struct SidecarProvider {
    client: RestClient,
}

impl SidecarProvider {
    pub fn new(base_url: impl Into<String>, config: &ProviderConfig) -> Result<Self, ConfigError> {
        Ok(Self { client: RestClient::new(base_url, config)? })
    }
}

impl NetworkProvider for SidecarProvider {
    fn base_url(&self) -> &str {
        self.client.base_url()
    }
}

#[async_trait]
impl SubstrateProvider for SidecarProvider {
    async fn account(&self, address: &str) -> Result<SubstrateAccount, ChainError> {
        let info: BalanceInfo = self.client.get_json(&format!("accounts/{address}/balance-info")).await?;
        Ok(SubstrateAccount { nonce: info.nonce, free: info.free, reserved: info.reserved })
    }

    async fn runtime(&self) -> Result<RuntimeMaterial, ChainError> {
        let material: Material = self.client.get_json("transaction/material?noMeta=true").await?;
        Ok(RuntimeMaterial {
            block_hash: hash32(&material.at.hash)?,
            block_number: material.at.height,
            genesis_hash: hash32(&material.genesis_hash)?,
            spec_version: material.spec_version,
            transaction_version: material.tx_version,
        })
    }

    async fn fee_estimate(&self, extrinsic: &[u8]) -> Result<u128, ChainError> {
        let fee: FeeInfo = self
            .client
            .post_json("transaction/fee-estimate", &json!({ "tx": extrinsic_hex(extrinsic) }))
            .await?;
        Ok(fee.partial_fee)
    }

    async fn submit(&self, extrinsic: &[u8]) -> Result<String, ChainError> {
        let submitted: Submitted = self
            .client
            .post_json("transaction", &json!({ "tx": extrinsic_hex(extrinsic) }))
            .await
            .map_err(submission_error)?;
        Ok(submitted.hash)
    }
}
