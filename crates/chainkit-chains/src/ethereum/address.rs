//! EVM addresses with EIP-55 mixed-case checksums.

use chainkit_core::crypto::keccak256;
use chainkit_core::{AddressError, AddressService, Curve};

use crate::keys;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EthereumAddressService;

impl EthereumAddressService {
    /// Lowercase, unprefixed hex of the 20-byte account id for `public_key`.
    pub fn account_id(public_key: &[u8]) -> Result<[u8; 20], AddressError> {
        let xy = keys::uncompressed_xy(public_key)?;
        let hash = keccak256(&xy);
        let mut id = [0u8; 20];
        id.copy_from_slice(&hash[12..]);
        Ok(id)
    }

    /// Parse a `0x`-prefixed 40-digit address into its bytes, ignoring case.
    pub fn parse(address: &str) -> Result<[u8; 20], AddressError> {
        let digits = address.strip_prefix("0x").ok_or(AddressError::InvalidHrp)?;
        if digits.len() != 40 {
            return Err(AddressError::InvalidLength);
        }
        if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(AddressError::InvalidCharacter(bad));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| AddressError::InvalidLength)?;
        Ok(bytes)
    }
}

/// EIP-55 checksummed form of a 20-byte address.
pub fn to_checksum(id: &[u8; 20]) -> String {
    let lower = hex::encode(id);
    let hash = keccak256(lower.as_bytes());
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        out.push(if c.is_ascii_alphabetic() && nibble >= 8 { c.to_ascii_uppercase() } else { c });
    }
    out
}

impl AddressService for EthereumAddressService {
    fn make_address(&self, public_key: &[u8], curve: Curve) -> Result<String, AddressError> {
        if curve != Curve::Secp256k1 {
            return Err(AddressError::UnsupportedCurve(curve));
        }
        Ok(to_checksum(&Self::account_id(public_key)?))
    }

    /// Single-case addresses carry no checksum and are accepted as is.
    fn validate(&self, address: &str) -> bool {
        let Ok(id) = Self::parse(address) else {
            return false;
        };
        let digits = &address[2..];
        let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
        if has_lower && has_upper {
            to_checksum(&id) == address
        } else {
            true
        }
    }
}
