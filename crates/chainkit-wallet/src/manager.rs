//! Orchestration of refresh, fee estimation and the send pipeline.
//!
//! A [`WalletManager`] owns one [`Wallet`] and the [`ChainAdapter`] that
//! talks to its chain. All wallet mutation happens here and only after the
//! network work it depends on has succeeded, so a failed or cancelled call
//! leaves the wallet exactly as it was.

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use chainkit_core::{
    AccountCreator, AccountError, Amount, BuildError, ChainError, DataStorage, Fee, SignerError,
    StorageError, TransactionBuilder, TransactionData, TransactionFee, TransactionSendResult,
    TransactionSigner, TransactionStatus, Wallet,
};

use crate::validation::{check_transfer, validate_transfer, TransactionValidationError};

/// Account state as fetched from the chain in one refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountSnapshot {
    /// Every known balance; replaces the wallet's amounts wholesale.
    pub amounts: Vec<Amount>,
    /// Next nonce or sequence the chain expects from this account.
    pub sequence: Option<u64>,
    /// Hashes the provider reports as confirmed (e.g. from address history).
    pub confirmed: HashSet<String>,
    pub failed: HashSet<String>,
}

/// Everything chain-specific the manager needs. Implementations route their
/// network calls through a `MultiNetworkProvider`.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    type Builder: TransactionBuilder;

    fn builder(&self) -> &Self::Builder;

    async fn fetch_account(&self, wallet: &Wallet) -> Result<AccountSnapshot, ChainError>;

    /// Status of a broadcast transaction; unknown hashes are `Unconfirmed`.
    async fn transaction_status(&self, hash: &str) -> Result<TransactionStatus, ChainError>;

    async fn estimate_fee(
        &self,
        wallet: &Wallet,
        amount: &Amount,
        destination: &str,
    ) -> Result<TransactionFee, ChainError>;

    /// Fetch nonce, sequence, UTXOs or runtime data right before building.
    async fn signing_state(
        &self,
        wallet: &Wallet,
        transaction: &TransactionData,
    ) -> Result<<Self::Builder as TransactionBuilder>::State, ChainError>;

    /// Nonce or sequence the built transaction is bound to, if the chain has one.
    fn sequence_of(&self, _state: &<Self::Builder as TransactionBuilder>::State) -> Option<u64> {
        None
    }

    /// Chain-specific checks run after the generic balance rules.
    fn validate(&self, _wallet: &Wallet, _transaction: &TransactionData) -> Result<(), ChainError> {
        Ok(())
    }

    /// Broadcast signed wire bytes and return the ledger hash.
    async fn submit(&self, raw: &[u8]) -> Result<String, ChainError>;

    fn current_host(&self) -> String;
}

/// What a manager is currently doing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    #[default]
    Idle,
    Updating,
    Building,
    AwaitingSignature,
    Submitting,
}

/// Read-only view of a manager's [`Phase`], usable while the manager is
/// mutably borrowed by a running operation.
#[derive(Clone, Debug)]
pub struct PhaseWatch(Arc<Mutex<Phase>>);

impl PhaseWatch {
    pub fn get(&self) -> Phase {
        *self.0.lock()
    }
}

/// Sets a phase for the lifetime of an operation and resets to `Idle` on
/// drop, including when the operation's future is dropped mid-flight.
struct PhaseGuard(Arc<Mutex<Phase>>);

impl PhaseGuard {
    fn enter(phase: &Arc<Mutex<Phase>>, initial: Phase) -> Self {
        *phase.lock() = initial;
        Self(Arc::clone(phase))
    }

    fn set(&self, phase: Phase) {
        *self.0.lock() = phase;
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        *self.0.lock() = Phase::Idle;
    }
}

pub struct WalletManager<A: ChainAdapter> {
    wallet: Wallet,
    adapter: A,
    phase: Arc<Mutex<Phase>>,
    last_snapshot: Option<AccountSnapshot>,
    account_creator: Option<Arc<dyn AccountCreator>>,
    storage: Option<Arc<dyn DataStorage>>,
}

impl<A: ChainAdapter> WalletManager<A> {
    pub fn new(wallet: Wallet, adapter: A) -> Self {
        Self {
            wallet,
            adapter,
            phase: Arc::new(Mutex::new(Phase::Idle)),
            last_snapshot: None,
            account_creator: None,
            storage: None,
        }
    }

    /// Register accounts that the chain reports as missing during [`update`](Self::update).
    pub fn with_account_creator(mut self, creator: Arc<dyn AccountCreator>) -> Self {
        self.account_creator = Some(creator);
        self
    }

    /// Persist recent transactions across sessions.
    pub fn with_storage(mut self, storage: Arc<dyn DataStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    pub fn phase_watch(&self) -> PhaseWatch {
        PhaseWatch(Arc::clone(&self.phase))
    }

    pub fn last_snapshot(&self) -> Option<&AccountSnapshot> {
        self.last_snapshot.as_ref()
    }

    /// Backend currently serving this manager's chain.
    pub fn current_host(&self) -> String {
        self.adapter.current_host()
    }

    // --- refresh ---

    /// Refresh balances and the status of pending transactions.
    ///
    /// The account fetch and one status lookup per pending hash run
    /// concurrently. If the account fetch fails the wallet is not touched.
    pub async fn update(&mut self) -> Result<(), ChainError> {
        let _phase = PhaseGuard::enter(&self.phase, Phase::Updating);
        let pending = self.wallet.pending_hashes();

        let (account, statuses) = futures::join!(
            self.adapter.fetch_account(&self.wallet),
            join_all(pending.iter().map(|hash| self.adapter.transaction_status(hash))),
        );

        let snapshot = match account {
            Ok(snapshot) => snapshot,
            Err(ChainError::Account(AccountError::NotFound(address)))
                if self.account_creator.is_some() =>
            {
                self.create_account(&address).await?
            }
            Err(err) => {
                warn!(chain = %self.wallet.chain().id, error = %err, "account refresh failed");
                return Err(err);
            }
        };

        let mut confirmed: HashSet<String> =
            snapshot.confirmed.iter().map(|h| h.to_lowercase()).collect();
        let mut failed: HashSet<String> = snapshot.failed.iter().map(|h| h.to_lowercase()).collect();
        for (hash, status) in pending.iter().zip(statuses) {
            match status {
                Ok(TransactionStatus::Confirmed) => {
                    confirmed.insert(hash.to_lowercase());
                }
                Ok(TransactionStatus::Failed) => {
                    failed.insert(hash.to_lowercase());
                }
                Ok(TransactionStatus::Unconfirmed) => {}
                Err(err) => warn!(hash = %hash, error = %err, "transaction status lookup failed"),
            }
        }

        self.wallet.replace_amounts(snapshot.amounts.iter().cloned());
        let mut settled = 0usize;
        for tx in self.wallet.recent_transactions_mut() {
            if tx.status != TransactionStatus::Unconfirmed {
                continue;
            }
            let Some(hash) = tx.hash.as_ref().map(|h| h.to_lowercase()) else {
                continue;
            };
            if failed.contains(&hash) {
                tx.status = TransactionStatus::Failed;
                settled += 1;
            } else if confirmed.contains(&hash) || sequence_advanced(snapshot.sequence, tx.sequence) {
                tx.status = TransactionStatus::Confirmed;
                settled += 1;
            }
        }
        debug!(
            chain = %self.wallet.chain().id,
            balances = snapshot.amounts.len(),
            settled,
            "wallet updated"
        );

        self.last_snapshot = Some(snapshot);
        if settled > 0 {
            self.persist_recent().await;
        }
        Ok(())
    }

    async fn create_account(&self, address: &str) -> Result<AccountSnapshot, ChainError> {
        let Some(creator) = &self.account_creator else {
            return Err(AccountError::NotFound(address.to_string()).into());
        };
        info!(chain = %self.wallet.chain().id, address, "creating account");
        creator.create_account(self.wallet.chain(), self.wallet.public_key()).await?;
        self.adapter.fetch_account(&self.wallet).await
    }

    // --- fees and intents ---

    /// Fee suggestion for sending `amount` to `destination`. Never mutates.
    pub async fn get_fee(&self, amount: &Amount, destination: &str) -> Result<TransactionFee, ChainError> {
        self.adapter.estimate_fee(&self.wallet, amount, destination).await
    }

    /// Transfer intent from the wallet's default address.
    pub fn create_transaction(
        &self,
        amount: Amount,
        fee: Option<Fee>,
        destination: impl Into<String>,
    ) -> TransactionData {
        TransactionData::new(amount, fee, self.wallet.address(), destination)
    }

    pub fn validate_transaction(&self, amount: &Amount, fee: Option<&Amount>) -> Vec<TransactionValidationError> {
        validate_transfer(&self.wallet, amount, fee)
    }

    // --- send ---

    /// Validate, build, sign, assemble and broadcast `transaction`.
    ///
    /// The wallet records the transaction only after the broadcast succeeded.
    pub async fn send(
        &mut self,
        transaction: TransactionData,
        signer: &dyn TransactionSigner,
    ) -> Result<TransactionSendResult, ChainError> {
        if let Some(hash) = &transaction.hash {
            return Err(BuildError::AlreadySubmitted(hash.clone()).into());
        }
        let phase = PhaseGuard::enter(&self.phase, Phase::Building);

        check_transfer(&self.wallet, &transaction.amount, transaction.fee_amount())?;
        self.adapter.validate(&self.wallet, &transaction)?;

        let state = self.adapter.signing_state(&self.wallet, &transaction).await?;
        let builder = self.adapter.builder();
        let payload = builder.build_for_sign(&transaction, &state)?;
        if payload.is_empty() {
            return Err(BuildError::InvalidIntent("nothing to sign".into()).into());
        }

        phase.set(Phase::AwaitingSignature);
        let public_key = self.wallet.public_key();
        let signed = if payload.len() == 1 {
            signer.sign(&payload.hashes[0], public_key).await.map(|sig| vec![sig])
        } else {
            signer.sign_batch(&payload.hashes, public_key).await
        };
        let signatures = match signed {
            Ok(signatures) => signatures,
            Err(SignerError::Cancelled) => {
                debug!(chain = %self.wallet.chain().id, "signing cancelled");
                return Err(SignerError::Cancelled.into());
            }
            Err(err) => {
                warn!(chain = %self.wallet.chain().id, error = %err, "signer failed");
                return Err(err.into());
            }
        };
        if signatures.len() != payload.len() {
            return Err(BuildError::SignatureCount {
                expected: payload.len(),
                actual: signatures.len(),
            }
            .into());
        }

        phase.set(Phase::Building);
        let raw = builder.build_for_send(&transaction, &state, &signatures)?;

        phase.set(Phase::Submitting);
        let hash = self.adapter.submit(&raw).await?.to_lowercase();
        info!(
            chain = %self.wallet.chain().id,
            hash = %hash,
            host = %self.adapter.current_host(),
            "transaction broadcast"
        );

        let sequence = self.adapter.sequence_of(&state).or(transaction.sequence);
        let mut record = transaction;
        record.hash = Some(hash.clone());
        record.status = TransactionStatus::Unconfirmed;
        record.sequence = sequence;
        self.wallet.add_outgoing_transaction(record);
        self.persist_recent().await;

        Ok(TransactionSendResult { hash })
    }

    // --- persistence ---

    fn storage_key(&self) -> String {
        format!("recent-transactions:{}:{}", self.wallet.chain().id, self.wallet.address())
    }

    async fn persist_recent(&self) {
        let Some(storage) = &self.storage else { return };
        let result = match serde_json::to_string(self.wallet.recent_transactions()) {
            Ok(json) => storage.store(&self.storage_key(), json).await,
            Err(err) => Err(StorageError::Serialization(err.to_string())),
        };
        if let Err(err) = result {
            warn!(error = %err, "could not persist recent transactions");
        }
    }

    /// Load recent transactions saved by a previous session. Returns how many
    /// records were added.
    pub async fn restore_recent_transactions(&mut self) -> Result<usize, ChainError> {
        let Some(storage) = self.storage.clone() else { return Ok(0) };
        let Some(json) = storage.get(&self.storage_key()).await? else { return Ok(0) };
        let records: Vec<TransactionData> =
            serde_json::from_str(&json).map_err(|e| StorageError::Serialization(e.to_string()))?;

        let before = self.wallet.recent_transactions().len();
        for record in records {
            self.wallet.add_outgoing_transaction(record);
        }
        Ok(self.wallet.recent_transactions().len() - before)
    }
}

/// A transaction bound to sequence `bound` is final once the account's next
/// expected sequence has moved past it.
fn sequence_advanced(current: Option<u64>, bound: Option<u64>) -> bool {
    matches!((current, bound), (Some(current), Some(bound)) if current > bound)
}
