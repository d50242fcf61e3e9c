//! secp256k1 public key normalization shared by the secp256k1 plugins.

use secp256k1::PublicKey;

use chainkit_core::{AddressError, Curve};

fn parse(public_key: &[u8]) -> Result<PublicKey, AddressError> {
    // 64-byte keys are uncompressed points without the 0x04 tag
    let parsed = if public_key.len() == 64 {
        let mut tagged = [0u8; 65];
        tagged[0] = 0x04;
        tagged[1..].copy_from_slice(public_key);
        PublicKey::from_slice(&tagged)
    } else {
        PublicKey::from_slice(public_key)
    };
    parsed.map_err(|_| AddressError::InvalidPublicKey(Curve::Secp256k1))
}

/// 33-byte SEC1 compressed form of a compressed, uncompressed or untagged key.
pub fn compressed(public_key: &[u8]) -> Result<[u8; 33], AddressError> {
    Ok(parse(public_key)?.serialize())
}

/// 64-byte `x || y` without the SEC1 tag.
pub fn uncompressed_xy(public_key: &[u8]) -> Result<[u8; 64], AddressError> {
    let full = parse(public_key)?.serialize_uncompressed();
    let mut xy = [0u8; 64];
    xy.copy_from_slice(&full[1..]);
    Ok(xy)
}
