//! # chainkit-core
//! Foundation types, error taxonomy and collaborator traits for the chainkit
//! wallet engine.
//!
//! # Modules
//!
//! - [`error`]: `ChainError` and the per-concern enums it aggregates
//! - [`chain`]: `ChainSpec`, `Curve` and the immutable `ChainRegistry`
//! - [`amount`]: balances in minimal units
//! - [`fee`]: `Fee` and the `TransactionFee` tiers
//! - [`transaction`]: `TransactionData` intents and their status
//! - [`wallet`]: the `Wallet` aggregate
//! - [`traits`]: provider, address, builder, signer and storage contracts
//! - [`encoding`]: Bech32/Bech32m and Base58Check
//! - [`crypto`]: hash functions
//! - [`storage`]: in-memory `DataStorage`

pub mod amount;
pub mod chain;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod fee;
pub mod storage;
pub mod traits;
pub mod transaction;
pub mod wallet;

pub use amount::{Amount, AmountType, Token};
pub use chain::{ChainFamily, ChainId, ChainRegistry, ChainSpec, Curve, FeeResourceSpec};
pub use error::{
    AccountError, AddressError, AmountError, BuildError, ChainError, ConfigError, ErrorKind,
    NetworkError, SelectionError, SignerError, StorageError,
};
pub use fee::{Fee, FeeParams, FeeTier, TransactionFee};
pub use storage::MemoryStorage;
pub use traits::{
    AccountCreator, AddressService, DataStorage, NetworkProvider, SigningPayload,
    TransactionBuilder, TransactionSigner,
};
pub use transaction::{TransactionData, TransactionExtras, TransactionSendResult, TransactionStatus};
pub use wallet::{Address, AddressKind, HdKey, PublicKey, Wallet};

#[cfg(feature = "mocks")]
pub use traits::{MockAccountCreator, MockAddressService, MockDataStorage, MockTransactionSigner};
