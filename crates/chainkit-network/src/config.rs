//! Endpoint lists and transport settings.
//!
//! An [`EngineConfig`] can be built in code (presets below) or loaded with
//! [`EngineConfig::load`], which layers an optional TOML/JSON file under
//! `CHAINKIT_*` environment variables (`CHAINKIT_PROVIDERS__TIMEOUT_SECS=30`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chainkit_core::{ChainId, ChainRegistry, ChainSpec, ConfigError};

/// Settings shared by every HTTP provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Per-request timeout, connect included.
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: concat!("chainkit/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Ordered backend URLs for one chain. The first entry is preferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEndpoints {
    pub chain: ChainId,
    pub urls: Vec<String>,
}

impl ChainEndpoints {
    pub fn new(chain: &str, urls: &[&str]) -> Self {
        Self {
            chain: ChainId::new(chain),
            urls: urls.iter().map(|u| u.to_string()).collect(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub providers: ProviderConfig,
    pub chains: Vec<ChainEndpoints>,
    /// Chains added to (or replacing entries of) the built-in table.
    pub custom_chains: Vec<ChainSpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl EngineConfig {
    /// Public endpoints for the main networks.
    pub fn mainnet() -> Self {
        Self {
            providers: ProviderConfig::default(),
            chains: vec![
                ChainEndpoints::new(
                    "bitcoin",
                    &["https://blockstream.info/api", "https://mempool.space/api"],
                ),
                ChainEndpoints::new(
                    "ethereum",
                    &["https://ethereum-rpc.publicnode.com", "https://cloudflare-eth.com"],
                ),
                ChainEndpoints::new("polygon", &["https://polygon-rpc.com"]),
                ChainEndpoints::new(
                    "polkadot",
                    &["https://polkadot-public-sidecar.parity-chains.parity.io"],
                ),
            ],
            custom_chains: Vec::new(),
        }
    }

    /// Public endpoints for the test networks.
    pub fn testnet() -> Self {
        Self {
            providers: ProviderConfig::default(),
            chains: vec![
                ChainEndpoints::new(
                    "bitcoin-testnet",
                    &["https://blockstream.info/testnet/api", "https://mempool.space/testnet/api"],
                ),
                ChainEndpoints::new(
                    "ethereum-sepolia",
                    &["https://ethereum-sepolia-rpc.publicnode.com", "https://rpc.sepolia.org"],
                ),
                ChainEndpoints::new(
                    "westend",
                    &["https://westend-public-sidecar.parity-chains.parity.io"],
                ),
            ],
            custom_chains: Vec::new(),
        }
    }

    /// Load from `path` (if any) with `CHAINKIT_*` environment overrides.
    /// Missing keys fall back to [`EngineConfig::mainnet`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load), reading overrides from `env` instead of the
    /// process environment when given.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("CHAINKIT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );
        builder
            .build()
            .and_then(|c| c.try_deserialize::<Self>())
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Replace the endpoint list of `chain`, adding it if absent.
    pub fn with_endpoints(mut self, chain: &str, urls: &[&str]) -> Self {
        self.chains.retain(|c| c.chain.as_str() != chain);
        self.chains.push(ChainEndpoints::new(chain, urls));
        self
    }

    /// Configured URLs for `chain`; an empty or missing list is an error.
    pub fn endpoints(&self, chain: &str) -> Result<&[String], ConfigError> {
        self.chains
            .iter()
            .find(|c| c.chain.as_str() == chain)
            .map(|c| c.urls.as_slice())
            .filter(|urls| !urls.is_empty())
            .ok_or(ConfigError::EmptyProviderList)
    }

    /// Built-in chain table extended with [`custom_chains`](Self::custom_chains).
    pub fn registry(&self) -> ChainRegistry {
        ChainRegistry::builtin().extend(self.custom_chains.iter().cloned())
    }
}
