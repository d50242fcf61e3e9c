//! # chainkit-wallet
//! The generic transaction engine.
//!
//! # Modules
//!
//! - [`coin_selection`]: UTXO selection by binary search over sorted outputs
//! - [`signature`]: secp256k1 and Ed25519 signature post-processing
//! - [`signer`]: `KeySigner`, a software `TransactionSigner`
//! - [`validation`]: transfer precondition checks
//! - [`manager`]: `ChainAdapter` and the `WalletManager` state machine

pub mod coin_selection;
pub mod manager;
pub mod signature;
pub mod signer;
pub mod validation;

pub use coin_selection::{
    select_utxos, select_utxos_without_dust, SpendableOutput, UnspentOutput, UtxoSelection,
};
pub use manager::{AccountSnapshot, ChainAdapter, Phase, PhaseWatch, WalletManager};
pub use signer::KeySigner;
pub use validation::{check_transfer, validate_transfer, TransactionValidationError};
