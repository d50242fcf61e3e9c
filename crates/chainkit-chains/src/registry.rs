//! Plugin lookup for registry chains.

use chainkit_core::{AddressService, ChainFamily, ChainSpec, ConfigError};

use crate::bitcoin::BitcoinAddressService;
use crate::ethereum::EthereumAddressService;
use crate::polkadot::Ss58AddressService;

/// The closed set of transaction builders shipped with the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuilderKind {
    Bitcoin,
    Ethereum,
    Polkadot,
}

impl BuilderKind {
    pub fn for_chain(chain: &ChainSpec) -> Result<Self, ConfigError> {
        match chain.family {
            ChainFamily::Bitcoin { .. } => Ok(Self::Bitcoin),
            ChainFamily::Ethereum { .. } => Ok(Self::Ethereum),
            ChainFamily::Polkadot { .. } => Ok(Self::Polkadot),
            ChainFamily::Koinos => Err(ConfigError::NoPlugin(chain.id.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bitcoin => "bitcoin",
            Self::Ethereum => "ethereum",
            Self::Polkadot => "polkadot",
        }
    }
}

/// Builder kind and address service for one chain.
pub struct ChainPlugins {
    pub kind: BuilderKind,
    pub address_service: Box<dyn AddressService>,
}

impl ChainPlugins {
    pub fn for_chain(chain: &ChainSpec) -> Result<Self, ConfigError> {
        let kind = BuilderKind::for_chain(chain)?;
        let address_service: Box<dyn AddressService> = match kind {
            BuilderKind::Bitcoin => Box::new(BitcoinAddressService::for_chain(chain)?),
            BuilderKind::Ethereum => Box::new(EthereumAddressService),
            BuilderKind::Polkadot => Box::new(Ss58AddressService::for_chain(chain)?),
        };
        Ok(Self { kind, address_service })
    }
}
