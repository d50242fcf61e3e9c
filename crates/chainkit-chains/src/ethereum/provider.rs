//! EVM JSON-RPC calls.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use chainkit_core::{ChainError, ConfigError, NetworkError, NetworkProvider, TransactionStatus};
use chainkit_network::{JsonRpcClient, ProviderConfig};

/// Which state a nonce lookup reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockTag {
    /// Mined transactions only; used to detect confirmations.
    Latest,
    /// Including the mempool; used to build the next transaction.
    Pending,
}

impl BlockTag {
    fn as_str(self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::Pending => "pending",
        }
    }
}

/// Recent fee market as reported by `eth_feeHistory`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeeHistory {
    /// Base fee of each block in the window, then of the pending block.
    pub base_fee_per_gas: Vec<u128>,
    /// Per block, the priority fee paid at each requested percentile.
    pub reward: Vec<Vec<u128>>,
}

/// Blocks inspected by [`EvmProvider::fee_history`].
pub const FEE_HISTORY_BLOCKS: u64 = 5;

/// Reward percentiles backing the low, market and fast priority fees.
pub const REWARD_PERCENTILES: [u8; 3] = [25, 50, 75];

#[async_trait]
pub trait EvmProvider: NetworkProvider {
    async fn balance(&self, address: &str) -> Result<u128, ChainError>;
    async fn transaction_count(&self, address: &str, tag: BlockTag) -> Result<u64, ChainError>;
    async fn gas_price(&self) -> Result<u128, ChainError>;
    /// Fee history of the last [`FEE_HISTORY_BLOCKS`] blocks at [`REWARD_PERCENTILES`].
    async fn fee_history(&self) -> Result<FeeHistory, ChainError>;
    async fn estimate_gas(&self, from: &str, to: &str, value: u128, data: &[u8]) -> Result<u64, ChainError>;
    /// ERC-20 `balanceOf(holder)` on `contract`.
    async fn token_balance(&self, holder: &str, contract: &str) -> Result<u128, ChainError>;
    /// Returns the transaction hash.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, ChainError>;
    async fn receipt_status(&self, hash: &str) -> Result<TransactionStatus, ChainError>;
}

/// `balanceOf(address)`
const BALANCE_OF_SELECTOR: &str = "70a08231";

/// Decode a `0x`-prefixed hex quantity. `0x` alone is zero.
pub fn parse_quantity(value: &str) -> Result<u128, NetworkError> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| NetworkError::Decode(format!("quantity without 0x: {value}")))?;
    if digits.is_empty() {
        return Ok(0);
    }
    // eth_call returns 32-byte words; anything above u128 is not a balance we can hold
    let significant = digits.trim_start_matches('0');
    if significant.len() > 32 {
        return Err(NetworkError::Decode(format!("quantity overflows u128: {value}")));
    }
    if significant.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(significant, 16).map_err(|e| NetworkError::Decode(format!("{value}: {e}")))
}

fn quantity(value: u128) -> String {
    format!("0x{value:x}")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFeeHistory {
    #[serde(default)]
    base_fee_per_gas: Vec<String>,
    #[serde(default)]
    reward: Vec<Vec<String>>,
}

impl TryFrom<RawFeeHistory> for FeeHistory {
    type Error = NetworkError;

    fn try_from(raw: RawFeeHistory) -> Result<Self, NetworkError> {
        let parse_all =
            |values: &[String]| values.iter().map(|v| parse_quantity(v)).collect::<Result<Vec<_>, _>>();
        Ok(Self {
            base_fee_per_gas: parse_all(raw.base_fee_per_gas.as_slice())?,
            reward: raw.reward.iter().map(|block| parse_all(block.as_slice())).collect::<Result<_, _>>()?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Receipt {
    status: Option<String>,
}

#[derive(Debug)]
pub struct JsonRpcEvmProvider {
    client: JsonRpcClient,
}

impl JsonRpcEvmProvider {
    pub fn new(endpoint: impl Into<String>, config: &ProviderConfig) -> Result<Self, ConfigError> {
        Ok(Self { client: JsonRpcClient::new(endpoint, config)? })
    }

    async fn call_quantity(&self, method: &str, params: Value) -> Result<u128, ChainError> {
        let raw: String = self.client.call(method, params).await?;
        Ok(parse_quantity(&raw)?)
    }
}

impl NetworkProvider for JsonRpcEvmProvider {
    fn base_url(&self) -> &str {
        self.client.base_url()
    }
}

#[async_trait]
impl EvmProvider for JsonRpcEvmProvider {
    async fn balance(&self, address: &str) -> Result<u128, ChainError> {
        self.call_quantity("eth_getBalance", json!([address, "latest"])).await
    }

    async fn transaction_count(&self, address: &str, tag: BlockTag) -> Result<u64, ChainError> {
        let count = self.call_quantity("eth_getTransactionCount", json!([address, tag.as_str()])).await?;
        Ok(u64::try_from(count).map_err(|_| NetworkError::Decode(format!("nonce {count} out of range")))?)
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        self.call_quantity("eth_gasPrice", json!([])).await
    }

    async fn fee_history(&self) -> Result<FeeHistory, ChainError> {
        let raw: RawFeeHistory = self
            .client
            .call(
                "eth_feeHistory",
                json!([quantity(u128::from(FEE_HISTORY_BLOCKS)), "latest", REWARD_PERCENTILES]),
            )
            .await?;
        Ok(FeeHistory::try_from(raw)?)
    }

    async fn estimate_gas(&self, from: &str, to: &str, value: u128, data: &[u8]) -> Result<u64, ChainError> {
        let mut call = json!({ "from": from, "to": to, "value": quantity(value) });
        if !data.is_empty() {
            call["data"] = Value::String(format!("0x{}", hex::encode(data)));
        }
        let gas = self.call_quantity("eth_estimateGas", json!([call])).await?;
        Ok(u64::try_from(gas).map_err(|_| NetworkError::Decode(format!("gas {gas} out of range")))?)
    }

    async fn token_balance(&self, holder: &str, contract: &str) -> Result<u128, ChainError> {
        let holder = holder.trim_start_matches("0x").to_lowercase();
        let data = format!("0x{BALANCE_OF_SELECTOR}{holder:0>64}");
        self.call_quantity("eth_call", json!([{ "to": contract, "data": data }, "latest"])).await
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, ChainError> {
        self.client
            .call("eth_sendRawTransaction", json!([format!("0x{}", hex::encode(raw))]))
            .await
    }

    async fn receipt_status(&self, hash: &str) -> Result<TransactionStatus, ChainError> {
        let receipt: Option<Receipt> = self.client.call("eth_getTransactionReceipt", json!([hash])).await?;
        Ok(match receipt {
            None => TransactionStatus::Unconfirmed,
            // pre-Byzantium receipts carry no status; being mined is all we know
            Some(Receipt { status: None }) => TransactionStatus::Confirmed,
            Some(Receipt { status: Some(status) }) if parse_quantity(&status)? == 1 => {
                TransactionStatus::Confirmed
            }
            Some(_) => TransactionStatus::Failed,
        })
    }
}
