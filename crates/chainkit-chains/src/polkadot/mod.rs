//! Relay-chain plugin: SS58 addresses, SCALE-encoded balance transfers and a
//! Sidecar backed [`ChainAdapter`].

pub mod address;
pub mod builder;
pub mod provider;
pub mod scale;

pub use address::Ss58AddressService;
pub use builder::{PolkadotBuilder, SubstrateSigningState};
pub use provider::{RuntimeMaterial, SidecarProvider, SubstrateAccount, SubstrateProvider};

/// Address service of the Polkadot family.
pub type PolkadotAddressService = Ss58AddressService;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use chainkit_core::{
    AccountError, Amount, AmountType, BuildError, ChainError, ChainSpec, ConfigError, Fee,
    TransactionData, TransactionFee, TransactionStatus, Wallet,
};
use chainkit_network::{EngineConfig, MultiNetworkProvider};
use chainkit_wallet::{AccountSnapshot, ChainAdapter};

pub struct PolkadotAdapter<P> {
    chain: Arc<ChainSpec>,
    providers: MultiNetworkProvider<P>,
    builder: PolkadotBuilder,
    addresses: Ss58AddressService,
}

impl<P: SubstrateProvider> PolkadotAdapter<P> {
    pub fn new(chain: Arc<ChainSpec>, providers: Vec<P>) -> Result<Self, ConfigError> {
        Ok(Self {
            builder: PolkadotBuilder::for_chain(&chain)?,
            addresses: Ss58AddressService::for_chain(&chain)?,
            providers: MultiNetworkProvider::new(providers)?,
            chain,
        })
    }

    pub fn providers(&self) -> &MultiNetworkProvider<P> {
        &self.providers
    }

    fn account_id(wallet: &Wallet) -> Result<[u8; 32], ChainError> {
        wallet
            .public_key()
            .blockchain_key()
            .try_into()
            .map_err(|_| BuildError::InvalidIntent("signer key is not a 32-byte ed25519 key".into()).into())
    }

    async fn state_for(&self, wallet: &Wallet) -> Result<SubstrateSigningState, ChainError> {
        let public_key = Self::account_id(wallet)?;
        let address = wallet.address();
        let (account, runtime) = futures::try_join!(
            self.providers.perform_request(|p| p.account(address)),
            self.providers.perform_request(|p| p.runtime()),
        )?;
        Ok(SubstrateSigningState {
            nonce: account.nonce,
            spec_version: runtime.spec_version,
            transaction_version: runtime.transaction_version,
            genesis_hash: runtime.genesis_hash,
            block_hash: runtime.block_hash,
            block_number: runtime.block_number,
            public_key,
        })
    }
}

impl PolkadotAdapter<SidecarProvider> {
    pub fn from_config(chain: Arc<ChainSpec>, config: &EngineConfig) -> Result<Self, ConfigError> {
        let providers = config
            .endpoints(chain.id.as_str())?
            .iter()
            .map(|url| SidecarProvider::new(url.clone(), &config.providers))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(chain, providers)
    }
}

#[async_trait]
impl<P: SubstrateProvider> ChainAdapter for PolkadotAdapter<P> {
    type Builder = PolkadotBuilder;

    fn builder(&self) -> &PolkadotBuilder {
        &self.builder
    }

    async fn fetch_account(&self, wallet: &Wallet) -> Result<AccountSnapshot, ChainError> {
        let address = wallet.address();
        let account = self.providers.perform_request(|p| p.account(address)).await?;
        debug!(chain = %self.chain.id, nonce = account.nonce, "fetched account");

        let mut amounts = vec![Amount::coin(account.free, &self.chain)];
        if account.reserved > 0 {
            amounts.push(Amount { amount_type: AmountType::Reserve, ..Amount::coin(account.reserved, &self.chain) });
        }
        Ok(AccountSnapshot { amounts, sequence: Some(account.nonce), ..Default::default() })
    }

    /// Extrinsic hashes are not indexed by the gateway; confirmation comes from the nonce.
    async fn transaction_status(&self, _hash: &str) -> Result<TransactionStatus, ChainError> {
        Ok(TransactionStatus::Unconfirmed)
    }

    async fn estimate_fee(
        &self,
        wallet: &Wallet,
        amount: &Amount,
        destination: &str,
    ) -> Result<TransactionFee, ChainError> {
        if amount.amount_type != AmountType::Coin {
            return Err(AccountError::Unsupported(format!("{} has no token transfers", self.chain.name)).into());
        }
        let state = self.state_for(wallet).await?;
        let transaction = TransactionData::new(amount.clone(), None, wallet.address(), destination);
        // the runtime weighs the extrinsic without checking the signature
        let dummy = self.builder.assemble(&transaction, &state, &[0u8; 64])?;
        let fee = self.providers.perform_request(|p| p.fee_estimate(&dummy)).await?;
        Ok(TransactionFee::Single(Fee::common(Amount::coin(fee, &self.chain))))
    }

    async fn signing_state(
        &self,
        wallet: &Wallet,
        _transaction: &TransactionData,
    ) -> Result<SubstrateSigningState, ChainError> {
        self.state_for(wallet).await
    }

    fn sequence_of(&self, state: &SubstrateSigningState) -> Option<u64> {
        Some(state.nonce)
    }

    fn validate(&self, _wallet: &Wallet, transaction: &TransactionData) -> Result<(), ChainError> {
        if transaction.amount.amount_type != AmountType::Coin {
            return Err(AccountError::Unsupported(format!("{} has no token transfers", self.chain.name)).into());
        }
        self.addresses
            .decode(&transaction.destination_address)
            .map_err(|e| BuildError::InvalidIntent(format!("destination: {e}")))?;
        Ok(())
    }

    async fn submit(&self, raw: &[u8]) -> Result<String, ChainError> {
        self.providers.perform_request(|p| p.submit(raw)).await
    }

    fn current_host(&self) -> String {
        self.providers.current_host().to_string()
    }
}
