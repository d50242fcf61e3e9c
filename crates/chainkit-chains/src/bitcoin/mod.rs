//! Bitcoin-family plugin: addresses, transaction assembly and an
//! Esplora-backed [`ChainAdapter`].

pub mod address;
pub mod builder;
pub mod provider;
pub mod transaction;

pub use address::BitcoinAddressService;
pub use builder::{BitcoinBuilder, BitcoinSigningState, FeeRates, MIN_RELAY_FEE_PER_KB};
pub use provider::{AddressUtxo, EsploraProvider, UtxoProvider};

use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::debug;

use chainkit_core::{
    AccountError, AddressService, Amount, AmountError, AmountType, BuildError, ChainError,
    ChainSpec, ConfigError, TransactionData, TransactionFee, TransactionStatus, Wallet,
};
use chainkit_network::{EngineConfig, MultiNetworkProvider};
use chainkit_wallet::{select_utxos, AccountSnapshot, ChainAdapter, UnspentOutput};

use crate::keys;

/// Size estimates assume a payment output plus change.
const ESTIMATE_OUTPUTS: usize = 2;

pub struct BitcoinAdapter<P> {
    chain: Arc<ChainSpec>,
    providers: MultiNetworkProvider<P>,
    builder: BitcoinBuilder,
    addresses: BitcoinAddressService,
}

impl<P: UtxoProvider> BitcoinAdapter<P> {
    pub fn new(chain: Arc<ChainSpec>, providers: Vec<P>) -> Result<Self, ConfigError> {
        Ok(Self {
            builder: BitcoinBuilder::for_chain(&chain)?,
            addresses: BitcoinAddressService::for_chain(&chain)?,
            providers: MultiNetworkProvider::new(providers)?,
            chain,
        })
    }

    pub fn providers(&self) -> &MultiNetworkProvider<P> {
        &self.providers
    }

    /// Unspent outputs of every wallet address, with their locking scripts.
    async fn owned_utxos(&self, wallet: &Wallet) -> Result<Vec<UnspentOutput>, ChainError> {
        let per_address = try_join_all(wallet.addresses().iter().map(|address| async move {
            let script_pubkey = self.addresses.script_pubkey(&address.value)?;
            let utxos = self.providers.perform_request(|p| p.utxos(&address.value)).await?;
            Ok::<_, ChainError>(
                utxos
                    .into_iter()
                    .map(|u| UnspentOutput {
                        txid: u.txid,
                        vout: u.vout,
                        amount: u.value,
                        script_pubkey: script_pubkey.clone(),
                    })
                    .collect::<Vec<_>>(),
            )
        }))
        .await?;
        Ok(per_address.into_iter().flatten().collect())
    }
}

impl BitcoinAdapter<EsploraProvider> {
    /// Adapter over the Esplora endpoints configured for `chain`.
    pub fn from_config(chain: Arc<ChainSpec>, config: &EngineConfig) -> Result<Self, ConfigError> {
        let providers = config
            .endpoints(chain.id.as_str())?
            .iter()
            .map(|url| EsploraProvider::new(url.clone(), &config.providers))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(chain, providers)
    }
}

#[async_trait]
impl<P: UtxoProvider> ChainAdapter for BitcoinAdapter<P> {
    type Builder = BitcoinBuilder;

    fn builder(&self) -> &BitcoinBuilder {
        &self.builder
    }

    async fn fetch_account(&self, wallet: &Wallet) -> Result<AccountSnapshot, ChainError> {
        let utxos = self.owned_utxos(wallet).await?;
        let balance: u128 = utxos.iter().map(|u| u128::from(u.amount)).sum();
        debug!(chain = %self.chain.id, outputs = utxos.len(), balance, "fetched utxos");
        Ok(AccountSnapshot { amounts: vec![Amount::coin(balance, &self.chain)], ..Default::default() })
    }

    async fn transaction_status(&self, hash: &str) -> Result<TransactionStatus, ChainError> {
        self.providers.perform_request(|p| p.transaction_status(hash)).await
    }

    async fn estimate_fee(
        &self,
        wallet: &Wallet,
        amount: &Amount,
        destination: &str,
    ) -> Result<TransactionFee, ChainError> {
        self.addresses.script_pubkey(destination)?;
        let (utxos, rates) = futures::try_join!(
            self.owned_utxos(wallet),
            self.providers.perform_request(|p| p.fee_rates()),
        )?;

        let spend = u64::try_from(amount.value).map_err(|_| AmountError::Overflow)?;
        let selection = select_utxos(&utxos, spend, 0, Some(self.builder.dust()))?;
        if selection.insufficient {
            return Err(AccountError::InsufficientBalance {
                available: selection.total,
                required: u128::from(selection.target),
            }
            .into());
        }
        let size = builder::estimate_vsize(
            selection.selected.iter().map(|u| u.script_pubkey.as_slice()),
            ESTIMATE_OUTPUTS,
        );
        Ok(builder::fee_tiers(rates, size, MIN_RELAY_FEE_PER_KB, &self.chain))
    }

    async fn signing_state(
        &self,
        wallet: &Wallet,
        _transaction: &TransactionData,
    ) -> Result<BitcoinSigningState, ChainError> {
        let public_key = keys::compressed(wallet.public_key().blockchain_key())?;
        let utxos = self.owned_utxos(wallet).await?;
        Ok(BitcoinSigningState { utxos, public_key, change_address: wallet.address().to_string() })
    }

    fn validate(&self, _wallet: &Wallet, transaction: &TransactionData) -> Result<(), ChainError> {
        if transaction.amount.amount_type != AmountType::Coin {
            return Err(AccountError::Unsupported("token transfers".into()).into());
        }
        if !self.addresses.validate(&transaction.destination_address) {
            return Err(BuildError::InvalidIntent(format!(
                "invalid destination {}",
                transaction.destination_address
            ))
            .into());
        }
        Ok(())
    }

    async fn submit(&self, raw: &[u8]) -> Result<String, ChainError> {
        let raw_hex = hex::encode(raw);
        self.providers.perform_request(|p| p.broadcast(&raw_hex)).await
    }

    fn current_host(&self) -> String {
        self.providers.current_host().to_string()
    }
}
