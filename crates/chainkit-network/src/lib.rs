//! # chainkit-network
//! Everything between a chain plugin and the wire.
//!
//! - [`multi`]: `MultiNetworkProvider`, rotation over redundant backends
//! - [`http`]: reqwest-based `JsonRpcClient` and `RestClient`
//! - [`config`]: endpoint lists and transport settings, file + env loading

pub mod config;
pub mod http;
pub mod multi;

pub use config::{ChainEndpoints, EngineConfig, ProviderConfig};
pub use http::{JsonRpcClient, RestClient};
pub use multi::MultiNetworkProvider;
