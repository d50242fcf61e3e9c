//! The SCALE pieces extrinsic encoding needs.

/// Append `value` in SCALE compact form.
pub fn write_compact(buf: &mut Vec<u8>, value: u128) {
    match value {
        0..=0x3f => buf.push((value as u8) << 2),
        0x40..=0x3fff => buf.extend_from_slice(&(((value as u16) << 2) | 0b01).to_le_bytes()),
        0x4000..=0x3fff_ffff => buf.extend_from_slice(&(((value as u32) << 2) | 0b10).to_le_bytes()),
        _ => {
            let bytes = value.to_le_bytes();
            let len = bytes.iter().rposition(|&b| b != 0).map_or(1, |i| i + 1).max(4);
            buf.push((((len - 4) as u8) << 2) | 0b11);
            buf.extend_from_slice(&bytes[..len]);
        }
    }
}

pub fn compact(value: u128) -> Vec<u8> {
    let mut buf = Vec::new();
    write_compact(&mut buf, value);
    buf
}

/// Mortal era for a transaction valid `period` blocks from `block_number`.
///
/// `period` is rounded up to a power of two in `4..=65536`.
pub fn mortal_era(block_number: u64, period: u64) -> [u8; 2] {
    let period = period.clamp(4, 1 << 16).next_power_of_two();
    let phase = block_number % period;
    let quantize = (period >> 12).max(1);
    let quantized_phase = phase / quantize * quantize;

    let low = (period.trailing_zeros() - 1).clamp(1, 15) as u64;
    let high = (quantized_phase / quantize) << 4;
    ((low | high) as u16).to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn compact_modes() {
        assert_eq!(compact(0), [0x00]);
        assert_eq!(compact(1), [0x04]);
        assert_eq!(compact(63), [0xfc]);
        assert_eq!(compact(64), [0x01, 0x01]);
        assert_eq!(compact(16_383), [0xfd, 0xff]);
        assert_eq!(compact(16_384), [0x02, 0x00, 0x01, 0x00]);
        assert_eq!(compact(1_073_741_823), [0xfe, 0xff, 0xff, 0xff]);
        assert_eq!(compact(1_073_741_824), [0x03, 0x00, 0x00, 0x00, 0x40]);
        assert_eq!(compact(1 << 32), [0x07, 0x00, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(compact(u128::MAX)[0], 0x33);
    }

    #[test]
    fn era_encoding() {
        // period 64: low nibble log2(64) - 1 = 5, phase in the high bits
        assert_eq!(mortal_era(0, 64), [0x05, 0x00]);
        assert_eq!(mortal_era(42, 64), [0xa5, 0x02]);
        assert_eq!(mortal_era(64 + 42, 64), mortal_era(42, 64));
        // period rounded up to the next power of two
        assert_eq!(mortal_era(0, 50), mortal_era(0, 64));
    }

    proptest! {
        #[test]
        fn compact_prefix_matches_mode(value in any::<u128>()) {
            let encoded = compact(value);
            let expected_len = match encoded[0] & 0b11 {
                0b00 => 1,
                0b01 => 2,
                0b10 => 4,
                _ => 1 + (encoded[0] >> 2) as usize + 4,
            };
            prop_assert_eq!(encoded.len(), expected_len);
        }
    }
}
