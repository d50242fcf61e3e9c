//! SS58 addresses for Ed25519 account ids.

use chainkit_core::crypto::blake2b_512;
use chainkit_core::{AddressError, AddressService, ChainFamily, ChainSpec, ConfigError, Curve};

const CHECKSUM_PREFIX: &[u8] = b"SS58PRE";
const CHECKSUM_LEN: usize = 2;
const ACCOUNT_ID_LEN: usize = 32;

/// Prefixes above this need the two-byte form.
const SIMPLE_PREFIX_MAX: u16 = 63;
const PREFIX_MAX: u16 = 16_383;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ss58AddressService {
    prefix: u16,
}

fn prefix_bytes(prefix: u16) -> Vec<u8> {
    if prefix <= SIMPLE_PREFIX_MAX {
        vec![prefix as u8]
    } else {
        vec![
            (((prefix & 0x00fc) >> 2) as u8) | 0x40,
            ((prefix >> 8) as u8) | (((prefix & 0x0003) << 6) as u8),
        ]
    }
}

fn checksum(body: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut preimage = CHECKSUM_PREFIX.to_vec();
    preimage.extend_from_slice(body);
    let hash = blake2b_512(&preimage);
    [hash[0], hash[1]]
}

impl Ss58AddressService {
    pub fn new(prefix: u16) -> Result<Self, ConfigError> {
        if prefix > PREFIX_MAX {
            return Err(ConfigError::Invalid(format!("ss58 prefix {prefix} out of range")));
        }
        Ok(Self { prefix })
    }

    pub fn for_chain(chain: &ChainSpec) -> Result<Self, ConfigError> {
        match chain.family {
            ChainFamily::Polkadot { ss58_prefix } => Self::new(ss58_prefix),
            _ => Err(ConfigError::NoPlugin(chain.id.to_string())),
        }
    }

    pub fn prefix(&self) -> u16 {
        self.prefix
    }

    pub fn encode(&self, account_id: &[u8; ACCOUNT_ID_LEN]) -> String {
        let mut body = prefix_bytes(self.prefix);
        body.extend_from_slice(account_id);
        let sum = checksum(&body);
        body.extend_from_slice(&sum);
        bs58::encode(body).into_string()
    }

    /// Account id of an address encoded for this service's prefix.
    pub fn decode(&self, address: &str) -> Result<[u8; ACCOUNT_ID_LEN], AddressError> {
        let raw = bs58::decode(address).into_vec().map_err(|_| AddressError::InvalidLength)?;
        let expected_prefix = prefix_bytes(self.prefix);
        if raw.len() != expected_prefix.len() + ACCOUNT_ID_LEN + CHECKSUM_LEN {
            return Err(AddressError::InvalidLength);
        }
        let (body, sum) = raw.split_at(raw.len() - CHECKSUM_LEN);
        if checksum(body) != sum {
            return Err(AddressError::InvalidChecksum);
        }
        if body[..expected_prefix.len()] != expected_prefix[..] {
            return Err(AddressError::InvalidVersion(body[0]));
        }
        let mut id = [0u8; ACCOUNT_ID_LEN];
        id.copy_from_slice(&body[expected_prefix.len()..]);
        Ok(id)
    }
}

impl AddressService for Ss58AddressService {
    fn make_address(&self, public_key: &[u8], curve: Curve) -> Result<String, AddressError> {
        if curve != Curve::Ed25519 {
            return Err(AddressError::UnsupportedCurve(curve));
        }
        let id: [u8; ACCOUNT_ID_LEN] =
            public_key.try_into().map_err(|_| AddressError::InvalidPublicKey(Curve::Ed25519))?;
        Ok(self.encode(&id))
    }

    fn validate(&self, address: &str) -> bool {
        self.decode(address).is_ok()
    }
}
