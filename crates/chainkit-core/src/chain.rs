//! Chain descriptions and the immutable chain table.
//!
//! A [`ChainRegistry`] is built once at startup (from [`ChainRegistry::builtin`]
//! or configuration) and handed to whoever needs it by reference. Wallets
//! keep an `Arc<ChainSpec>` to the entry they were created for.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::ConfigError;

/// Elliptic curve a chain's keys and signatures are defined on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Curve {
    Secp256k1,
    Ed25519,
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Curve::Secp256k1 => write!(f, "secp256k1"),
            Curve::Ed25519 => write!(f, "ed25519"),
        }
    }
}

impl FromStr for Curve {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "secp256k1" => Ok(Curve::Secp256k1),
            "ed25519" => Ok(Curve::Ed25519),
            other => Err(ConfigError::Invalid(format!("unknown curve {other}"))),
        }
    }
}

/// Stable chain identifier, e.g. `"bitcoin"` or `"ethereum-sepolia"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(String);

impl ChainId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChainId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Protocol family plus the parameters its plugin needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum ChainFamily {
    /// UTXO ledger with Bitcoin script and address formats.
    Bitcoin { hrp: String, p2pkh_version: u8 },
    /// Account ledger with EIP-155 replay protection. `eip1559` chains price
    /// gas from the fee market.
    Ethereum {
        chain_id: u64,
        #[serde(default)]
        eip1559: bool,
    },
    /// Substrate ledger with SS58 addresses.
    Polkadot { ss58_prefix: u16 },
    /// Account ledger whose fees are paid from a regenerating resource.
    Koinos,
}

/// Secondary balance consumed by fees on resource-gated chains.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeResourceSpec {
    pub name: String,
    pub decimals: u8,
}

/// Everything the engine needs to know about one chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSpec {
    pub id: ChainId,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub curves: Vec<Curve>,
    #[serde(flatten)]
    pub family: ChainFamily,
    #[serde(default)]
    pub testnet: bool,
    /// Smallest change or output worth creating, in minimal units.
    #[serde(default)]
    pub dust: Option<u128>,
    /// Minimum balance an account must keep alive, in minimal units.
    #[serde(default)]
    pub existential_deposit: Option<u128>,
    #[serde(default)]
    pub fee_resource: Option<FeeResourceSpec>,
}

impl ChainSpec {
    /// Whether keys on `curve` are usable for this chain.
    pub fn supports_curve(&self, curve: Curve) -> bool {
        self.curves.contains(&curve)
    }

    /// The first (preferred) curve of this chain.
    pub fn primary_curve(&self) -> Curve {
        self.curves.first().copied().unwrap_or(Curve::Secp256k1)
    }
}

/// Immutable table of supported chains keyed by [`ChainId`].
#[derive(Clone, Debug, Default)]
pub struct ChainRegistry {
    chains: BTreeMap<ChainId, Arc<ChainSpec>>,
}

impl ChainRegistry {
    /// Build a registry from a list of specs. Later entries replace earlier ones.
    pub fn from_specs(specs: impl IntoIterator<Item = ChainSpec>) -> Self {
        let chains = specs
            .into_iter()
            .map(|spec| (spec.id.clone(), Arc::new(spec)))
            .collect();
        Self { chains }
    }

    /// The chains shipped with the engine.
    pub fn builtin() -> Self {
        Self::from_specs(builtin_specs())
    }

    /// Consume the registry and add or replace entries.
    pub fn extend(mut self, specs: impl IntoIterator<Item = ChainSpec>) -> Self {
        for spec in specs {
            self.chains.insert(spec.id.clone(), Arc::new(spec));
        }
        self
    }

    /// Look up a chain by id.
    pub fn get(&self, id: &str) -> Result<Arc<ChainSpec>, ConfigError> {
        self.chains
            .get(&ChainId::new(id))
            .cloned()
            .ok_or_else(|| ConfigError::UnknownChain(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ChainSpec>> {
        self.chains.values()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

fn bitcoin_like(id: &str, name: &str, symbol: &str, hrp: &str, version: u8, testnet: bool) -> ChainSpec {
    ChainSpec {
        id: id.into(),
        name: name.into(),
        symbol: symbol.into(),
        decimals: 8,
        curves: vec![Curve::Secp256k1],
        family: ChainFamily::Bitcoin { hrp: hrp.into(), p2pkh_version: version },
        testnet,
        // one kB at the minimal relay rate
        dust: Some(1_000),
        existential_deposit: None,
        fee_resource: None,
    }
}

fn ethereum_like(id: &str, name: &str, symbol: &str, chain_id: u64, testnet: bool) -> ChainSpec {
    ChainSpec {
        id: id.into(),
        name: name.into(),
        symbol: symbol.into(),
        decimals: 18,
        curves: vec![Curve::Secp256k1],
        family: ChainFamily::Ethereum { chain_id, eip1559: true },
        testnet,
        dust: None,
        existential_deposit: None,
        fee_resource: None,
    }
}

fn polkadot_like(
    id: &str,
    name: &str,
    symbol: &str,
    decimals: u8,
    ss58_prefix: u16,
    existential_deposit: u128,
    testnet: bool,
) -> ChainSpec {
    ChainSpec {
        id: id.into(),
        name: name.into(),
        symbol: symbol.into(),
        decimals,
        curves: vec![Curve::Ed25519],
        family: ChainFamily::Polkadot { ss58_prefix },
        testnet,
        dust: None,
        existential_deposit: Some(existential_deposit),
        fee_resource: None,
    }
}

fn builtin_specs() -> Vec<ChainSpec> {
    vec![
        bitcoin_like("bitcoin", "Bitcoin", "BTC", "bc", 0x00, false),
        bitcoin_like("bitcoin-testnet", "Bitcoin Testnet", "BTC", "tb", 0x6f, true),
        bitcoin_like("litecoin", "Litecoin", "LTC", "ltc", 0x30, false),
        ethereum_like("ethereum", "Ethereum", "ETH", 1, false),
        ethereum_like("ethereum-sepolia", "Ethereum Sepolia", "ETH", 11_155_111, true),
        ethereum_like("polygon", "Polygon", "POL", 137, false),
        polkadot_like("polkadot", "Polkadot", "DOT", 10, 0, 10_000_000_000, false),
        polkadot_like("kusama", "Kusama", "KSM", 12, 2, 333_333_333, false),
        polkadot_like("westend", "Westend", "WND", 12, 42, 10_000_000_000, true),
        ChainSpec {
            id: "koinos".into(),
            name: "Koinos".into(),
            symbol: "KOIN".into(),
            decimals: 8,
            curves: vec![Curve::Secp256k1],
            family: ChainFamily::Koinos,
            testnet: false,
            dust: None,
            existential_deposit: None,
            fee_resource: Some(FeeResourceSpec { name: "mana".into(), decimals: 8 }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lookup() {
        let registry = ChainRegistry::builtin();
        let btc = registry.get("bitcoin").unwrap();
        assert_eq!(btc.decimals, 8);
        assert_eq!(btc.symbol, "BTC");
        assert!(btc.supports_curve(Curve::Secp256k1));
        assert!(!btc.supports_curve(Curve::Ed25519));
    }

    #[test]
    fn unknown_chain_is_config_error() {
        let registry = ChainRegistry::builtin();
        assert_eq!(
            registry.get("dogecoin").unwrap_err(),
            ConfigError::UnknownChain("dogecoin".into())
        );
    }

    #[test]
    fn extend_replaces_entries() {
        let mut custom = ChainRegistry::builtin().get("ethereum").unwrap().as_ref().clone();
        custom.name = "Ethereum (custom)".into();
        let registry = ChainRegistry::builtin().extend([custom]);
        assert_eq!(registry.get("ethereum").unwrap().name, "Ethereum (custom)");
        assert_eq!(registry.len(), ChainRegistry::builtin().len());
    }

    #[test]
    fn koinos_declares_fee_resource() {
        let koinos = ChainRegistry::builtin().get("koinos").unwrap();
        assert_eq!(koinos.fee_resource.as_ref().map(|r| r.name.as_str()), Some("mana"));
    }

    #[test]
    fn curve_parsing() {
        assert_eq!("ED25519".parse::<Curve>().unwrap(), Curve::Ed25519);
        assert!("p256".parse::<Curve>().is_err());
    }

    #[test]
    fn eip1559_flag_defaults_off_for_custom_chains() {
        assert_eq!(
            ChainRegistry::builtin().get("polygon").unwrap().family,
            ChainFamily::Ethereum { chain_id: 137, eip1559: true }
        );
        let custom: ChainSpec = serde_json::from_str(
            r#"{"id":"legacy-evm","name":"Legacy","symbol":"LGC","decimals":18,
                "curves":["secp256k1"],"family":"ethereum","chain_id":61}"#,
        )
        .unwrap();
        assert_eq!(custom.family, ChainFamily::Ethereum { chain_id: 61, eip1559: false });
    }

    #[test]
    fn spec_serde_flattens_family() {
        let spec = ChainRegistry::builtin().get("polkadot").unwrap();
        let json = serde_json::to_value(spec.as_ref()).unwrap();
        assert_eq!(json["family"], "polkadot");
        assert_eq!(json["ss58_prefix"], 0);
        let back: ChainSpec = serde_json::from_value(json).unwrap();
        assert_eq!(&back, spec.as_ref());
    }
}
