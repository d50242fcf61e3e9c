//! # chainkit-chains
//! Reference chain plugins for the wallet engine.
//!
//! # Modules
//!
//! - [`bitcoin`]: P2PKH/P2WPKH addresses, BIP-143 signing on `bitcoin` transactions and an Esplora adapter
//! - [`ethereum`]: EIP-55 addresses, EIP-155 and EIP-1559 transactions and ERC-20 transfers
//! - [`polkadot`]: SS58 addresses and SCALE-encoded balance transfers via Sidecar
//! - [`registry`]: builder and address service lookup per chain
//! - [`keys`]: secp256k1 key normalization

pub mod bitcoin;
pub mod ethereum;
pub mod keys;
pub mod polkadot;
pub mod registry;

pub use crate::bitcoin::{BitcoinAdapter, BitcoinAddressService, BitcoinBuilder};
pub use crate::ethereum::{EthereumAdapter, EthereumAddressService, EthereumBuilder};
pub use crate::polkadot::{PolkadotAdapter, PolkadotAddressService, PolkadotBuilder};
pub use crate::registry::{BuilderKind, ChainPlugins};
