//! EVM plugin: EIP-55 addresses, EIP-155 and EIP-1559 transactions and a
//! JSON-RPC backed [`ChainAdapter`] with ERC-20 support.

pub mod address;
pub mod builder;
pub mod provider;

pub use address::EthereumAddressService;
pub use builder::{EthereumBuilder, EvmSigningState};
pub use provider::{BlockTag, EvmProvider, FeeHistory, JsonRpcEvmProvider};

use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::debug;

use chainkit_core::{
    AddressService, Amount, AmountType, BuildError, ChainError, ChainFamily, ChainSpec, ConfigError,
    Fee, FeeParams, Token, TransactionData, TransactionExtras, TransactionFee, TransactionStatus,
    Wallet,
};
use chainkit_network::{EngineConfig, MultiNetworkProvider};
use chainkit_wallet::{AccountSnapshot, ChainAdapter};

pub struct EthereumAdapter<P> {
    chain: Arc<ChainSpec>,
    providers: MultiNetworkProvider<P>,
    builder: EthereumBuilder,
    tokens: Vec<Token>,
    eip1559: bool,
}

/// Price multipliers for the minimum, normal and priority tiers, in tenths.
const TIER_TENTHS: [u128; 3] = [10, 12, 15];

impl<P: EvmProvider> EthereumAdapter<P> {
    pub fn new(chain: Arc<ChainSpec>, providers: Vec<P>) -> Result<Self, ConfigError> {
        Ok(Self {
            builder: EthereumBuilder::for_chain(&chain)?,
            providers: MultiNetworkProvider::new(providers)?,
            eip1559: matches!(chain.family, ChainFamily::Ethereum { eip1559: true, .. }),
            chain,
            tokens: Vec::new(),
        })
    }

    /// Track ERC-20 balances of `tokens` on every refresh.
    pub fn with_tokens(mut self, tokens: impl IntoIterator<Item = Token>) -> Self {
        self.tokens.extend(tokens);
        self
    }

    pub fn providers(&self) -> &MultiNetworkProvider<P> {
        &self.providers
    }

    fn tracked_tokens(&self, wallet: &Wallet) -> Vec<Token> {
        let mut tokens = self.tokens.clone();
        for token in wallet.tokens() {
            if !tokens.iter().any(|t| t.contract_address.eq_ignore_ascii_case(&token.contract_address)) {
                tokens.push(token.clone());
            }
        }
        tokens
    }

    /// Recipient, value and call data a transfer of `amount` produces on chain.
    fn call_target(&self, amount: &Amount, destination: &str) -> Result<(String, u128, Vec<u8>), ChainError> {
        match &amount.amount_type {
            AmountType::Coin => Ok((destination.to_string(), amount.value, Vec::new())),
            AmountType::Token(token) => {
                let to = EthereumAddressService::parse(destination)?;
                Ok((token.contract_address.clone(), 0, builder::erc20_transfer_data(&to, amount.value)))
            }
            other => Err(BuildError::InvalidIntent(format!("cannot transfer {other:?}")).into()),
        }
    }
}

impl EthereumAdapter<JsonRpcEvmProvider> {
    pub fn from_config(chain: Arc<ChainSpec>, config: &EngineConfig) -> Result<Self, ConfigError> {
        let providers = config
            .endpoints(chain.id.as_str())?
            .iter()
            .map(|url| JsonRpcEvmProvider::new(url.clone(), &config.providers))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(chain, providers)
    }
}

/// Pending base fee plus the low, market and fast priority fees.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeMarket {
    pub base_fee: u128,
    pub priority_fees: [u128; 3],
}

impl FeeMarket {
    /// Market from a fee history at the 25/50/75 reward percentiles: the
    /// pending base fee and, per percentile, the rounded mean of the non-zero
    /// rewards. `None` when the history cannot price a tier.
    pub fn from_history(history: &FeeHistory) -> Option<Self> {
        let base_fee = *history.base_fee_per_gas.last()?;
        if base_fee == 0 {
            return None;
        }
        let mut priority_fees = [0u128; 3];
        for (percentile, fee) in priority_fees.iter_mut().enumerate() {
            let rewards: Vec<u128> = history
                .reward
                .iter()
                .filter_map(|block| block.get(percentile).copied())
                .filter(|&reward| reward != 0)
                .collect();
            if rewards.is_empty() {
                return None;
            }
            let count = rewards.len() as u128;
            *fee = (rewards.iter().sum::<u128>() + count / 2) / count;
        }
        Some(Self { base_fee, priority_fees })
    }

    /// Stand-in market when the history is unusable: the gas price as base
    /// fee and scaled by tier as tip.
    pub fn from_gas_price(gas_price: u128) -> Self {
        Self { base_fee: gas_price, priority_fees: TIER_TENTHS.map(|tenths| gas_price * tenths / 10) }
    }
}

/// One EIP-1559 fee per tier: scaled base fee plus that tier's tip, times `gas_limit`.
pub fn eip1559_fee_tiers(market: FeeMarket, gas_limit: u64, chain: &ChainSpec) -> TransactionFee {
    let [minimum, normal, priority] = [0, 1, 2].map(|tier| {
        let priority_fee = market.priority_fees[tier];
        let max_fee_per_gas = market.base_fee * TIER_TENTHS[tier] / 10 + priority_fee;
        Fee::new(
            Amount::coin(max_fee_per_gas * u128::from(gas_limit), chain),
            FeeParams::Eip1559 { gas_limit, max_fee_per_gas, priority_fee },
        )
    });
    TransactionFee::Choosable { minimum, normal, priority }
}

/// One fee per tier for `gas_limit` at multiples of `gas_price`.
pub fn gas_fee_tiers(gas_price: u128, gas_limit: u64, chain: &ChainSpec) -> TransactionFee {
    let [minimum, normal, priority] = TIER_TENTHS.map(|tenths| {
        let price = gas_price * tenths / 10;
        Fee::new(
            Amount::coin(price * u128::from(gas_limit), chain),
            FeeParams::EvmLegacy { gas_limit, gas_price: price },
        )
    });
    TransactionFee::Choosable { minimum, normal, priority }
}

#[async_trait]
impl<P: EvmProvider> ChainAdapter for EthereumAdapter<P> {
    type Builder = EthereumBuilder;

    fn builder(&self) -> &EthereumBuilder {
        &self.builder
    }

    async fn fetch_account(&self, wallet: &Wallet) -> Result<AccountSnapshot, ChainError> {
        let address = wallet.address();
        let tokens = self.tracked_tokens(wallet);
        let (balance, nonce, token_balances) = futures::try_join!(
            self.providers.perform_request(|p| p.balance(address)),
            self.providers.perform_request(|p| p.transaction_count(address, BlockTag::Latest)),
            try_join_all(tokens.iter().map(|token| {
                self.providers.perform_request(move |p| p.token_balance(address, &token.contract_address))
            })),
        )?;
        debug!(chain = %self.chain.id, nonce, tokens = tokens.len(), "fetched account");

        let mut amounts = vec![Amount::coin(balance, &self.chain)];
        amounts.extend(tokens.iter().zip(token_balances).map(|(token, value)| Amount::token(value, token)));
        Ok(AccountSnapshot { amounts, sequence: Some(nonce), ..Default::default() })
    }

    async fn transaction_status(&self, hash: &str) -> Result<TransactionStatus, ChainError> {
        self.providers.perform_request(|p| p.receipt_status(hash)).await
    }

    async fn estimate_fee(
        &self,
        wallet: &Wallet,
        amount: &Amount,
        destination: &str,
    ) -> Result<TransactionFee, ChainError> {
        let (to, value, data) = self.call_target(amount, destination)?;
        let from = wallet.address();
        if !self.eip1559 {
            let (gas_limit, gas_price) = futures::try_join!(
                self.providers.perform_request(|p| p.estimate_gas(from, &to, value, &data)),
                self.providers.perform_request(|p| p.gas_price()),
            )?;
            return Ok(gas_fee_tiers(gas_price, gas_limit, &self.chain));
        }

        let (gas_limit, history) = futures::try_join!(
            self.providers.perform_request(|p| p.estimate_gas(from, &to, value, &data)),
            self.providers.perform_request(|p| p.fee_history()),
        )?;
        let market = match FeeMarket::from_history(&history) {
            Some(market) => market,
            None => {
                debug!(chain = %self.chain.id, "fee history unusable, pricing from gas price");
                FeeMarket::from_gas_price(self.providers.perform_request(|p| p.gas_price()).await?)
            }
        };
        Ok(eip1559_fee_tiers(market, gas_limit, &self.chain))
    }

    async fn signing_state(
        &self,
        wallet: &Wallet,
        transaction: &TransactionData,
    ) -> Result<EvmSigningState, ChainError> {
        let nonce = match transaction.extras {
            Some(TransactionExtras::Nonce(nonce)) => nonce,
            _ => {
                let address = wallet.address();
                self.providers
                    .perform_request(|p| p.transaction_count(address, BlockTag::Pending))
                    .await?
            }
        };
        Ok(EvmSigningState { nonce, public_key: wallet.public_key().blockchain_key().to_vec() })
    }

    fn sequence_of(&self, state: &EvmSigningState) -> Option<u64> {
        Some(state.nonce)
    }

    fn validate(&self, _wallet: &Wallet, transaction: &TransactionData) -> Result<(), ChainError> {
        if !EthereumAddressService.validate(&transaction.destination_address) {
            return Err(BuildError::InvalidIntent(format!(
                "invalid destination {}",
                transaction.destination_address
            ))
            .into());
        }
        Ok(())
    }

    async fn submit(&self, raw: &[u8]) -> Result<String, ChainError> {
        self.providers.perform_request(|p| p.send_raw_transaction(raw)).await
    }

    fn current_host(&self) -> String {
        self.providers.current_host().to_string()
    }
}
