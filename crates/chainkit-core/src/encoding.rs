//! Checksummed string encodings shared by address services.
//!
//! - Bech32 ([BIP-173]) and Bech32m ([BIP-350]), including segwit programs.
//! - Base58Check: payload followed by the first four bytes of its double SHA-256.
//!
//! [BIP-173]: https://github.com/bitcoin/bips/blob/master/bip-0173.mediawiki
//! [BIP-350]: https://github.com/bitcoin/bips/blob/master/bip-0350.mediawiki

use crate::crypto::double_sha256;
use crate::error::AddressError;

/// Bech32 character set for encoding 5-bit values.
const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Checksum constant selecting the variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variant {
    Bech32,
    Bech32m,
}

impl Variant {
    fn constant(self) -> u32 {
        match self {
            Variant::Bech32 => 1,
            Variant::Bech32m => 0x2bc830a3,
        }
    }
}

/// Encode 5-bit `data` under `hrp`.
pub fn bech32_encode(hrp: &str, data: &[u8], variant: Variant) -> String {
    let checksum = create_checksum(hrp, data, variant);
    let mut result = String::with_capacity(hrp.len() + 1 + data.len() + 6);
    result.push_str(hrp);
    result.push('1');
    for &d in data.iter().chain(checksum.iter()) {
        result.push(CHARSET[d as usize] as char);
    }
    result
}

/// Decode a Bech32 or Bech32m string into `(hrp, 5-bit data, variant)`.
pub fn bech32_decode(s: &str) -> Result<(String, Vec<u8>, Variant), AddressError> {
    let has_lower = s.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = s.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(AddressError::MixedCase);
    }
    if s.len() > 90 {
        return Err(AddressError::InvalidLength);
    }

    let s_lower = s.to_ascii_lowercase();
    let sep_pos = s_lower.rfind('1').ok_or(AddressError::MissingSeparator)?;
    if sep_pos == 0 {
        return Err(AddressError::InvalidHrp);
    }
    if sep_pos + 7 > s_lower.len() {
        return Err(AddressError::InvalidLength);
    }

    let hrp = &s_lower[..sep_pos];
    if hrp.bytes().any(|b| !(33..=126).contains(&b)) {
        return Err(AddressError::InvalidHrp);
    }

    let mut data = Vec::with_capacity(s_lower.len() - sep_pos - 1);
    for c in s_lower[sep_pos + 1..].chars() {
        let pos = CHARSET
            .iter()
            .position(|&ch| ch as char == c)
            .ok_or(AddressError::InvalidCharacter(c))?;
        data.push(pos as u8);
    }

    let variant = match polymod_with_hrp(hrp, &data) {
        c if c == Variant::Bech32.constant() => Variant::Bech32,
        c if c == Variant::Bech32m.constant() => Variant::Bech32m,
        _ => return Err(AddressError::InvalidChecksum),
    };
    data.truncate(data.len() - 6);
    Ok((hrp.to_string(), data, variant))
}

/// Encode a segwit output program. Version 0 uses Bech32, later versions Bech32m.
pub fn encode_segwit(hrp: &str, version: u8, program: &[u8]) -> Result<String, AddressError> {
    if version > 16 {
        return Err(AddressError::InvalidVersion(version));
    }
    if !(2..=40).contains(&program.len()) || (version == 0 && ![20, 32].contains(&program.len())) {
        return Err(AddressError::InvalidLength);
    }
    let mut data = vec![version];
    data.extend(convert_bits(program, 8, 5, true).ok_or(AddressError::InvalidPadding)?);
    let variant = if version == 0 { Variant::Bech32 } else { Variant::Bech32m };
    Ok(bech32_encode(hrp, &data, variant))
}

/// Decode a segwit address for `expected_hrp` into `(version, program)`.
pub fn decode_segwit(expected_hrp: &str, s: &str) -> Result<(u8, Vec<u8>), AddressError> {
    let (hrp, data, variant) = bech32_decode(s)?;
    if hrp != expected_hrp {
        return Err(AddressError::InvalidHrp);
    }
    let (&version, rest) = data.split_first().ok_or(AddressError::InvalidLength)?;
    if version > 16 {
        return Err(AddressError::InvalidVersion(version));
    }
    let expected_variant = if version == 0 { Variant::Bech32 } else { Variant::Bech32m };
    if variant != expected_variant {
        return Err(AddressError::InvalidChecksum);
    }
    let program = convert_bits(rest, 5, 8, false).ok_or(AddressError::InvalidPadding)?;
    if !(2..=40).contains(&program.len()) || (version == 0 && ![20, 32].contains(&program.len())) {
        return Err(AddressError::InvalidLength);
    }
    Ok((version, program))
}

/// Base58 of `payload` followed by its 4-byte double SHA-256 checksum.
pub fn base58check_encode(payload: &[u8]) -> String {
    let checksum = double_sha256(payload);
    let mut data = Vec::with_capacity(payload.len() + 4);
    data.extend_from_slice(payload);
    data.extend_from_slice(&checksum[..4]);
    bs58::encode(data).into_string()
}

/// Decode Base58Check and verify the checksum, returning the payload.
pub fn base58check_decode(s: &str) -> Result<Vec<u8>, AddressError> {
    let data = bs58::decode(s).into_vec().map_err(|e| match e {
        bs58::decode::Error::InvalidCharacter { character, .. } => {
            AddressError::InvalidCharacter(character)
        }
        _ => AddressError::InvalidLength,
    })?;
    if data.len() < 5 {
        return Err(AddressError::InvalidLength);
    }
    let (payload, checksum) = data.split_at(data.len() - 4);
    if double_sha256(payload)[..4] != *checksum {
        return Err(AddressError::InvalidChecksum);
    }
    Ok(payload.to_vec())
}

/// Convert between bit widths (e.g. 8-bit bytes to 5-bit Bech32 groups).
pub fn convert_bits(data: &[u8], from_bits: u32, to_bits: u32, pad: bool) -> Option<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut ret = Vec::new();
    let maxv = (1u32 << to_bits) - 1;
    for &value in data {
        let v = value as u32;
        if v >> from_bits != 0 {
            return None;
        }
        acc = (acc << from_bits) | v;
        bits += from_bits;
        while bits >= to_bits {
            bits -= to_bits;
            ret.push(((acc >> bits) & maxv) as u8);
        }
    }
    if pad {
        if bits > 0 {
            ret.push(((acc << (to_bits - bits)) & maxv) as u8);
        }
    } else if bits >= from_bits || ((acc << (to_bits - bits)) & maxv) != 0 {
        return None;
    }
    Some(ret)
}

// --- Bech32 internals ---

fn polymod(values: &[u8]) -> u32 {
    const GEN: [u32; 5] = [0x3b6a57b2, 0x26508e6d, 0x1ea119fa, 0x3d4233dd, 0x2a1462b3];
    let mut chk: u32 = 1;
    for &v in values {
        let b = chk >> 25;
        chk = ((chk & 0x1ffffff) << 5) ^ (v as u32);
        for (i, &g) in GEN.iter().enumerate() {
            if (b >> i) & 1 != 0 {
                chk ^= g;
            }
        }
    }
    chk
}

fn hrp_expand(hrp: &str) -> Vec<u8> {
    let mut ret = Vec::with_capacity(hrp.len() * 2 + 1);
    ret.extend(hrp.bytes().map(|c| c >> 5));
    ret.push(0);
    ret.extend(hrp.bytes().map(|c| c & 31));
    ret
}

fn polymod_with_hrp(hrp: &str, data: &[u8]) -> u32 {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    polymod(&values)
}

fn create_checksum(hrp: &str, data: &[u8], variant: Variant) -> [u8; 6] {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    values.extend_from_slice(&[0; 6]);
    let pm = polymod(&values) ^ variant.constant();
    let mut out = [0u8; 6];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = ((pm >> (5 * (5 - i))) & 31) as u8;
    }
    out
}
