//! Shared fixtures for the scenario tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chainkit_chains::bitcoin::{AddressUtxo, BitcoinAdapter, FeeRates, UtxoProvider};
use chainkit_chains::ChainPlugins;
use chainkit_core::{
    ChainError, ChainRegistry, ChainSpec, NetworkError, NetworkProvider, PublicKey, SignerError,
    TransactionSigner, TransactionStatus, Wallet,
};
use chainkit_wallet::{KeySigner, WalletManager};

/// Destination used by the Bitcoin scenarios (BIP-173 example address).
pub const BITCOIN_DESTINATION: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";

pub fn chain(id: &str) -> Arc<ChainSpec> {
    ChainRegistry::builtin().get(id).expect("built-in chain")
}

/// Software signer with a fixed secp256k1 key.
pub fn secp256k1_signer(seed: u8) -> KeySigner {
    KeySigner::secp256k1([seed; 32]).expect("valid secret")
}

/// Wallet whose addresses are derived from `signer` by the chain's plugin.
pub fn wallet_for(chain_id: &str, signer: &KeySigner) -> Wallet {
    let spec = chain(chain_id);
    let plugins = ChainPlugins::for_chain(&spec).expect("chain has a plugin");
    let addresses = plugins
        .address_service
        .make_addresses(signer.public_key(), signer.curve())
        .expect("address derivation");
    Wallet::new(spec, PublicKey::new(signer.public_key().to_vec()), addresses).expect("default address")
}

pub fn utxo(txid_byte: u8, value: u64) -> AddressUtxo {
    AddressUtxo { txid: hex::encode([txid_byte; 32]), vout: 0, value, confirmed: true }
}

/// In-memory Esplora backend whose failures are scripted per call.
pub struct ScriptedEsplora {
    url: String,
    utxos: HashMap<String, Vec<AddressUtxo>>,
    /// Consumed front to back by every call; `Ok(())` lets the call through.
    script: Mutex<VecDeque<Result<(), ChainError>>>,
    /// Outcome of every call once the script is exhausted.
    fallback: Mutex<Result<(), ChainError>>,
    broadcast_error: Option<ChainError>,
    pub attempts: AtomicUsize,
    pub broadcasts: Mutex<Vec<String>>,
}

impl ScriptedEsplora {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.into(),
            utxos: HashMap::new(),
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(())),
            broadcast_error: None,
            attempts: AtomicUsize::new(0),
            broadcasts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_utxos(mut self, address: &str, utxos: Vec<AddressUtxo>) -> Self {
        self.utxos.insert(address.to_string(), utxos);
        self
    }

    /// Every call fails with a timeout.
    pub fn down(self) -> Self {
        *self.fallback.lock() = Err(NetworkError::Timeout.into());
        self
    }

    pub fn scripted(self, outcomes: impl IntoIterator<Item = Result<(), ChainError>>) -> Self {
        self.script.lock().extend(outcomes);
        self
    }

    pub fn rejecting_broadcasts(mut self, err: ChainError) -> Self {
        self.broadcast_error = Some(err);
        self
    }

    /// Change the outcome of calls after the script, e.g. to bring a backend down.
    pub fn set_fallback(&self, outcome: Result<(), ChainError>) {
        *self.fallback.lock() = outcome;
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Result<(), ChainError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().pop_front() {
            Some(outcome) => outcome,
            None => self.fallback.lock().clone(),
        }
    }
}

impl NetworkProvider for ScriptedEsplora {
    fn base_url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl UtxoProvider for ScriptedEsplora {
    async fn utxos(&self, address: &str) -> Result<Vec<AddressUtxo>, ChainError> {
        self.next_outcome()?;
        Ok(self.utxos.get(address).cloned().unwrap_or_default())
    }

    async fn fee_rates(&self) -> Result<FeeRates, ChainError> {
        self.next_outcome()?;
        Ok(FeeRates { minimum: 1_000, normal: 5_000, priority: 12_000 })
    }

    async fn broadcast(&self, raw_hex: &str) -> Result<String, ChainError> {
        self.next_outcome()?;
        if let Some(err) = &self.broadcast_error {
            return Err(err.clone());
        }
        self.broadcasts.lock().push(raw_hex.to_string());
        Ok(format!("{:064x}", self.broadcasts.lock().len()))
    }

    async fn transaction_status(&self, _txid: &str) -> Result<TransactionStatus, ChainError> {
        self.next_outcome()?;
        Ok(TransactionStatus::Unconfirmed)
    }
}

pub type BitcoinManager = WalletManager<BitcoinAdapter<ScriptedEsplora>>;

/// Manager over a secp256k1 wallet whose default address holds 40 000 and
/// 25 000 sat on every backend `configure` returns.
pub fn bitcoin_manager(
    backends: &[&str],
    configure: impl Fn(ScriptedEsplora) -> ScriptedEsplora,
) -> (BitcoinManager, KeySigner) {
    let signer = secp256k1_signer(0x21);
    let wallet = wallet_for("bitcoin", &signer);
    let address = wallet.address().to_string();
    let providers = backends
        .iter()
        .map(|url| {
            configure(ScriptedEsplora::new(url).with_utxos(&address, vec![utxo(1, 40_000), utxo(2, 25_000)]))
        })
        .collect();
    let adapter = BitcoinAdapter::new(chain("bitcoin"), providers).expect("non-empty backend list");
    (WalletManager::new(wallet, adapter), signer)
}

/// Signer that never answers, for dropping a send mid-flight.
pub struct PendingSigner;

#[async_trait]
impl TransactionSigner for PendingSigner {
    async fn sign(&self, _hash: &[u8], _public_key: &PublicKey) -> Result<Vec<u8>, SignerError> {
        std::future::pending().await
    }

    async fn sign_batch(
        &self,
        _hashes: &[Vec<u8>],
        _public_key: &PublicKey,
    ) -> Result<Vec<Vec<u8>>, SignerError> {
        std::future::pending().await
    }
}
