//! Contracts between the engine and its collaborators.
//!
//! - [`NetworkProvider`]: one backend endpoint (chain plugins implement)
//! - [`AddressService`]: public key to address strings (chain plugins implement)
//! - [`TransactionBuilder`]: two-phase transaction assembly (chain plugins implement)
//! - [`TransactionSigner`]: external signer (hardware, remote, or `KeySigner`)
//! - [`DataStorage`]: cross-session key/value cache
//! - [`AccountCreator`]: registration for chains that need it before first use

use async_trait::async_trait;
use std::sync::Arc;

use crate::chain::{ChainSpec, Curve};
use crate::error::{AddressError, BuildError, ChainError, SignerError, StorageError};
use crate::transaction::TransactionData;
use crate::wallet::{Address, AddressKind, PublicKey};

/// One backend endpoint for a chain.
///
/// Providers only transport and decode; they keep no business state, so any
/// candidate can serve any call.
pub trait NetworkProvider: Send + Sync {
    /// Stable identity of the endpoint, used in logs and diagnostics.
    fn base_url(&self) -> &str;
}

impl<P: NetworkProvider + ?Sized> NetworkProvider for Arc<P> {
    fn base_url(&self) -> &str {
        (**self).base_url()
    }
}

/// Derives and validates chain-native addresses.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
pub trait AddressService: Send + Sync {
    /// Deterministic address for `public_key` on `curve`.
    fn make_address(&self, public_key: &[u8], curve: Curve) -> Result<String, AddressError>;

    /// Checksum and prefix verification. Never panics.
    fn validate(&self, address: &str) -> bool;

    /// Every address encoding of `public_key`. Defaults to the single
    /// [`make_address`](Self::make_address) result.
    fn make_addresses(&self, public_key: &[u8], curve: Curve) -> Result<Vec<Address>, AddressError> {
        Ok(vec![Address::new(
            self.make_address(public_key, curve)?,
            AddressKind::Default,
            0,
        )])
    }
}

/// Hashes the signer must sign, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningPayload {
    pub hashes: Vec<Vec<u8>>,
}

impl SigningPayload {
    pub fn single(hash: impl Into<Vec<u8>>) -> Self {
        Self { hashes: vec![hash.into()] }
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

/// Two-phase transaction assembly for one chain family.
///
/// `State` is whatever freshness-bound data the chain needs (nonce,
/// sequence, UTXO set, runtime version); it is fetched before
/// [`build_for_sign`](Self::build_for_sign) and passed unchanged to
/// [`build_for_send`](Self::build_for_send).
pub trait TransactionBuilder: Send + Sync {
    type State: Send + Sync;

    /// Hashes to sign. Pure; missing fee or sequence is a typed error.
    fn build_for_sign(
        &self,
        transaction: &TransactionData,
        state: &Self::State,
    ) -> Result<SigningPayload, BuildError>;

    /// Wire bytes, given one signature per hash of the signing payload.
    fn build_for_send(
        &self,
        transaction: &TransactionData,
        state: &Self::State,
        signatures: &[Vec<u8>],
    ) -> Result<Vec<u8>, BuildError>;
}

/// External signer. May suspend for a long time (user confirmation).
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Sign one hash.
    async fn sign(&self, hash: &[u8], public_key: &PublicKey) -> Result<Vec<u8>, SignerError>;

    /// Sign several hashes; the result keeps the input order.
    async fn sign_batch(
        &self,
        hashes: &[Vec<u8>],
        public_key: &PublicKey,
    ) -> Result<Vec<Vec<u8>>, SignerError>;
}

/// Persisted key/value cache shared across sessions.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait DataStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn store(&self, key: &str, value: String) -> Result<(), StorageError>;
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Registers an account on chains that require it before first use.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait AccountCreator: Send + Sync {
    async fn create_account(&self, chain: &ChainSpec, public_key: &PublicKey) -> Result<(), ChainError>;
}
