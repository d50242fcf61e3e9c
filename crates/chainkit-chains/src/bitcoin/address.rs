//! Bitcoin-family addresses: P2WPKH (Bech32) and legacy P2PKH (Base58Check).
//!
//! Both encodings hash the compressed key, so one key yields one address of
//! each kind. Validation also accepts P2WSH and Taproot outputs as payment
//! destinations.

use chainkit_core::crypto::hash160;
use chainkit_core::encoding::{base58check_decode, base58check_encode, decode_segwit, encode_segwit};
use chainkit_core::{
    Address, AddressError, AddressKind, AddressService, ChainFamily, ChainSpec, ConfigError, Curve,
};

use crate::keys;

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_0: u8 = 0x00;
const OP_1: u8 = 0x51;

/// Network parameters for one Bitcoin-family chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitcoinAddressService {
    hrp: String,
    p2pkh_version: u8,
}

impl BitcoinAddressService {
    pub fn new(hrp: impl Into<String>, p2pkh_version: u8) -> Self {
        Self { hrp: hrp.into(), p2pkh_version }
    }

    pub fn for_chain(chain: &ChainSpec) -> Result<Self, ConfigError> {
        match &chain.family {
            ChainFamily::Bitcoin { hrp, p2pkh_version } => Ok(Self::new(hrp.clone(), *p2pkh_version)),
            _ => Err(ConfigError::NoPlugin(chain.id.to_string())),
        }
    }

    pub fn hrp(&self) -> &str {
        &self.hrp
    }

    fn check_curve(curve: Curve) -> Result<(), AddressError> {
        match curve {
            Curve::Secp256k1 => Ok(()),
            other => Err(AddressError::UnsupportedCurve(other)),
        }
    }

    /// Native segwit v0 key-hash address.
    pub fn p2wpkh(&self, public_key: &[u8]) -> Result<String, AddressError> {
        let key = keys::compressed(public_key)?;
        encode_segwit(&self.hrp, 0, &hash160(&key))
    }

    /// Legacy Base58Check key-hash address.
    pub fn p2pkh(&self, public_key: &[u8]) -> Result<String, AddressError> {
        let key = keys::compressed(public_key)?;
        let mut payload = vec![self.p2pkh_version];
        payload.extend_from_slice(&hash160(&key));
        Ok(base58check_encode(&payload))
    }

    /// Locking script paying to `address`.
    pub fn script_pubkey(&self, address: &str) -> Result<Vec<u8>, AddressError> {
        if let Ok((version, program)) = decode_segwit(&self.hrp, address) {
            let op_version = if version == 0 { OP_0 } else { OP_1 + version - 1 };
            let mut script = vec![op_version, program.len() as u8];
            script.extend_from_slice(&program);
            return Ok(script);
        }
        let payload = base58check_decode(address)?;
        match payload.split_first() {
            Some((&version, hash)) if version == self.p2pkh_version && hash.len() == 20 => {
                Ok(p2pkh_script(hash))
            }
            Some((&version, _)) if version != self.p2pkh_version => Err(AddressError::InvalidVersion(version)),
            _ => Err(AddressError::InvalidLength),
        }
    }
}

/// `OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG`
pub fn p2pkh_script(pubkey_hash: &[u8]) -> Vec<u8> {
    let mut script = vec![OP_DUP, OP_HASH160, pubkey_hash.len() as u8];
    script.extend_from_slice(pubkey_hash);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

pub fn is_p2wpkh(script: &[u8]) -> bool {
    script.len() == 22 && script[..2] == [OP_0, 20]
}

impl AddressService for BitcoinAddressService {
    fn make_address(&self, public_key: &[u8], curve: Curve) -> Result<String, AddressError> {
        Self::check_curve(curve)?;
        self.p2wpkh(public_key)
    }

    fn validate(&self, address: &str) -> bool {
        self.script_pubkey(address).is_ok()
    }

    fn make_addresses(&self, public_key: &[u8], curve: Curve) -> Result<Vec<Address>, AddressError> {
        Self::check_curve(curve)?;
        Ok(vec![
            Address::new(self.p2wpkh(public_key)?, AddressKind::Default, 0),
            Address::new(self.p2pkh(public_key)?, AddressKind::Legacy, 1),
        ])
    }
}
