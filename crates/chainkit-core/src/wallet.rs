//! Account-state aggregate owned by a wallet manager.
//!
//! A [`Wallet`] knows its chain, key, addresses, balances and the
//! transactions it has broadcast itself. It never talks to the network; the
//! owning manager replaces its state after each successful refresh.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::amount::{Amount, AmountType, Token};
use crate::chain::ChainSpec;
use crate::error::AddressError;
use crate::transaction::{TransactionData, TransactionStatus};

/// Extended key derived along a path from the seed key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HdKey {
    pub path: String,
    pub public_key: Vec<u8>,
}

/// Public key material of an account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    pub seed_key: Vec<u8>,
    pub derivation: Option<HdKey>,
}

impl PublicKey {
    pub fn new(seed_key: impl Into<Vec<u8>>) -> Self {
        Self { seed_key: seed_key.into(), derivation: None }
    }

    pub fn with_derivation(seed_key: impl Into<Vec<u8>>, derivation: HdKey) -> Self {
        Self { seed_key: seed_key.into(), derivation: Some(derivation) }
    }

    /// The key the chain sees: the derived key when present, else the seed key.
    pub fn blockchain_key(&self) -> &[u8] {
        match &self.derivation {
            Some(hd) => &hd.public_key,
            None => &self.seed_key,
        }
    }

    pub fn derivation_path(&self) -> Option<&str> {
        self.derivation.as_ref().map(|hd| hd.path.as_str())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}", hex::encode(self.blockchain_key()))?;
        if let Some(path) = self.derivation_path() {
            write!(f, " @ {path}")?;
        }
        write!(f, ")")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressKind {
    /// The current format; used for display and as the change address.
    Default,
    Legacy,
}

/// One encoding of the account's address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub value: String,
    pub kind: AddressKind,
    /// Lower sorts first when picking a display address.
    pub priority: u8,
}

impl Address {
    pub fn new(value: impl Into<String>, kind: AddressKind, priority: u8) -> Self {
        Self { value: value.into(), kind, priority }
    }

    pub fn default_kind(value: impl Into<String>) -> Self {
        Self::new(value, AddressKind::Default, 0)
    }
}

/// Balances, addresses and locally broadcast transactions of one account.
#[derive(Clone, Debug)]
pub struct Wallet {
    chain: Arc<ChainSpec>,
    public_key: PublicKey,
    addresses: Vec<Address>,
    amounts: HashMap<AmountType, Amount>,
    recent_transactions: Vec<TransactionData>,
}

impl Wallet {
    /// Create a wallet; `addresses` must contain a [`AddressKind::Default`] entry.
    pub fn new(
        chain: Arc<ChainSpec>,
        public_key: PublicKey,
        addresses: Vec<Address>,
    ) -> Result<Self, AddressError> {
        let mut unique: Vec<Address> = Vec::with_capacity(addresses.len());
        for address in addresses {
            if !unique.iter().any(|a| a.value == address.value) {
                unique.push(address);
            }
        }
        if !unique.iter().any(|a| a.kind == AddressKind::Default) {
            return Err(AddressError::MissingDefault);
        }
        unique.sort_by_key(|a| a.priority);
        Ok(Self {
            chain,
            public_key,
            addresses: unique,
            amounts: HashMap::new(),
            recent_transactions: Vec::new(),
        })
    }

    pub fn chain(&self) -> &ChainSpec {
        &self.chain
    }

    pub fn chain_arc(&self) -> Arc<ChainSpec> {
        Arc::clone(&self.chain)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    /// The default display address.
    pub fn address(&self) -> &str {
        self.addresses
            .iter()
            .find(|a| a.kind == AddressKind::Default)
            .or_else(|| self.addresses.first())
            .map(|a| a.value.as_str())
            .unwrap_or_default()
    }

    pub fn owns_address(&self, address: &str) -> bool {
        self.addresses.iter().any(|a| a.value == address)
    }

    // --- balances ---

    pub fn amounts(&self) -> &HashMap<AmountType, Amount> {
        &self.amounts
    }

    /// Known balance of `amount_type`; `None` means not fetched yet.
    pub fn amount(&self, amount_type: &AmountType) -> Option<&Amount> {
        self.amounts.get(amount_type)
    }

    pub fn coin_amount(&self) -> Option<&Amount> {
        self.amounts.get(&AmountType::Coin)
    }

    /// Spendable value of `amount_type`, zero when unknown.
    pub fn funds_available(&self, amount_type: &AmountType) -> u128 {
        self.amounts.get(amount_type).map_or(0, |a| a.value)
    }

    pub fn set_amount(&mut self, amount: Amount) {
        self.amounts.insert(amount.amount_type.clone(), amount);
    }

    /// Replace every known balance with a freshly fetched set.
    pub fn replace_amounts(&mut self, amounts: impl IntoIterator<Item = Amount>) {
        self.amounts = amounts
            .into_iter()
            .map(|a| (a.amount_type.clone(), a))
            .collect();
    }

    pub fn remove_token(&mut self, token: &Token) {
        self.amounts.remove(&AmountType::Token(token.clone()));
    }

    /// Balances of every tracked token.
    pub fn token_amounts(&self) -> Vec<&Amount> {
        self.amounts
            .iter()
            .filter(|(k, _)| matches!(k, AmountType::Token(_)))
            .map(|(_, amount)| amount)
            .collect()
    }

    pub fn tokens(&self) -> Vec<&Token> {
        self.amounts
            .keys()
            .filter_map(|k| match k {
                AmountType::Token(token) => Some(token),
                _ => None,
            })
            .collect()
    }

    // --- recent transactions ---

    pub fn recent_transactions(&self) -> &[TransactionData] {
        &self.recent_transactions
    }

    /// Record a broadcast transaction. The hash is lowercased and a record
    /// whose hash is already present is ignored.
    pub fn add_outgoing_transaction(&mut self, mut transaction: TransactionData) {
        transaction.hash = transaction.hash.map(|h| h.to_lowercase());
        if transaction.date.is_none() {
            transaction.date = Some(Utc::now());
        }
        if let Some(hash) = &transaction.hash {
            if self.recent_transactions.iter().any(|t| t.has_hash(hash)) {
                return;
            }
        }
        self.recent_transactions.push(transaction);
    }

    /// Hashes of recent transactions still awaiting confirmation.
    pub fn pending_hashes(&self) -> Vec<String> {
        self.recent_transactions
            .iter()
            .filter(|t| t.status == TransactionStatus::Unconfirmed)
            .filter_map(|t| t.hash.clone())
            .collect()
    }

    /// Update the status of the recent transaction with `hash`. Returns
    /// whether a record was found.
    pub fn set_transaction_status(&mut self, hash: &str, status: TransactionStatus) -> bool {
        match self.recent_transactions.iter_mut().find(|t| t.has_hash(hash)) {
            Some(tx) => {
                tx.status = status;
                true
            }
            None => false,
        }
    }

    /// Mutable access for reconciliation by the owning manager.
    pub fn recent_transactions_mut(&mut self) -> &mut [TransactionData] {
        &mut self.recent_transactions
    }
}
