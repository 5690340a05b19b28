//! Bucket prefixes and the packed query vector.
//!
//! A querier sends the prefixes of every key it holds as one dense
//! bitstream: field `i` occupies bits `[i*W, (i+1)*W)`. The final byte is
//! zero-padded, so a valid vector leaves fewer than 8 unused bits.

use crate::bitstream::{read_bits, BitWriter};
use crate::error::{CoreError, Result};
use crate::types::{BucketKey, HashedPk, PrefixWidth};

/// The leading `W` bits of `hash` as a byte-aligned, zero-padded key.
pub fn prefix(hash: &HashedPk, width: PrefixWidth) -> BucketKey {
    // The hash is 256 bits long so this read always succeeds.
    let value = read_bits(hash.as_bytes(), 0, width.bits()).unwrap_or_default();
    BucketKey::from_value(value, width)
}

/// Pack bucket keys of a single width into one bitstream.
///
/// Every key must have width `width`.
pub fn pack_vector(keys: &[BucketKey], width: PrefixWidth) -> Result<Vec<u8>> {
    let mut writer = BitWriter::with_capacity(keys.len(), width.bits());
    for key in keys {
        if key.width() != width {
            return Err(CoreError::WidthMismatch {
                expected: width.bits(),
                got: key.width().bits(),
            });
        }
        writer.write_bits(key.value(), width.bits());
    }
    Ok(writer.into_bytes())
}

/// Decode a packed vector into bucket keys.
///
/// Fields are extracted at bit offsets `0, W, 2W, ...` until fewer than `W`
/// bits remain. Fails when the vector holds no field at all, or when whole
/// unused bytes trail the last field.
pub fn unpack_vector(bytes: &[u8], width: PrefixWidth) -> Result<Vec<BucketKey>> {
    let w = width.bits() as usize;
    let total_bits = bytes.len() * 8;
    let count = total_bits / w;

    if count == 0 {
        return Err(CoreError::InvalidQueryVector(format!(
            "{} bytes hold no {}-bit prefix",
            bytes.len(),
            w
        )));
    }
    let leftover = total_bits - count * w;
    if leftover >= 8 {
        return Err(CoreError::InvalidQueryVector(format!(
            "{} bytes is not a whole number of {}-bit prefixes ({} trailing bits)",
            bytes.len(),
            w,
            leftover
        )));
    }

    let mut keys = Vec::with_capacity(count);
    let mut offset = 0;
    while let Some(value) = read_bits(bytes, offset, width.bits()) {
        keys.push(BucketKey::from_value(value, width));
        offset += w;
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn width(bits: u32) -> PrefixWidth {
        PrefixWidth::new(bits).unwrap()
    }

    #[test]
    fn test_prefix_24_is_byte_slice() {
        let hash = HashedPk::from_bytes([0x5A; 32]);
        assert_eq!(prefix(&hash, width(24)).as_bytes(), &[0x5A, 0x5A, 0x5A]);
    }

    #[test]
    fn test_prefix_18_masks_low_bits() {
        let mut raw = [0u8; 32];
        raw[..3].copy_from_slice(&[0xAB, 0xCD, 0xFF]);
        let key = prefix(&HashedPk::from_bytes(raw), width(18));
        assert_eq!(key.as_bytes(), &[0xAB, 0xCD, 0xC0]);
    }

    #[test]
    fn test_pack_two_18_bit_prefixes() {
        // Same layout a client builds by hand: the second prefix starts at bit 18.
        let a = BucketKey::from_slice(&[0xAB, 0xCD, 0xC0], width(18)).unwrap();
        let b = BucketKey::from_slice(&[0x12, 0x34, 0x40], width(18)).unwrap();
        let packed = pack_vector(&[a, b], width(18)).unwrap();
        assert_eq!(packed.len(), 5);
        assert_eq!(packed[0], 0xAB);
        assert_eq!(packed[1], 0xCD);
        assert_eq!(packed[2], 0xC0 | (0x12 >> 2));

        let keys = unpack_vector(&packed, width(18)).unwrap();
        assert_eq!(keys, vec![a, b]);
    }

    #[test]
    fn test_pack_rejects_mixed_widths() {
        let a = BucketKey::from_value(1, width(18));
        assert!(matches!(
            pack_vector(&[a], width(24)),
            Err(CoreError::WidthMismatch { expected: 24, got: 18 })
        ));
    }

    #[test]
    fn test_unpack_empty_is_invalid() {
        assert!(matches!(
            unpack_vector(&[], width(24)),
            Err(CoreError::InvalidQueryVector(_))
        ));
        assert!(unpack_vector(&[0x01, 0x02], width(24)).is_err());
    }

    #[test]
    fn test_unpack_trailing_byte_is_invalid() {
        assert!(unpack_vector(&[0u8; 4], width(24)).is_err());
        assert_eq!(unpack_vector(&[0u8; 6], width(24)).unwrap().len(), 2);
    }

    #[test]
    fn test_unpack_stops_before_partial_field() {
        // 3 x 18 bits = 54 bits -> 7 bytes, 2 pad bits
        let keys: Vec<_> = (0..3).map(|v| BucketKey::from_value(v * 1000, width(18))).collect();
        let packed = pack_vector(&keys, width(18)).unwrap();
        assert_eq!(packed.len(), 7);
        assert_eq!(unpack_vector(&packed, width(18)).unwrap(), keys);
    }

    proptest! {
        #[test]
        fn test_vector_roundtrip(
            bits in prop_oneof![Just(8u32), Just(16u32), Just(18u32), Just(24u32)],
            values in prop::collection::vec(any::<u32>(), 1..200),
        ) {
            let w = width(bits);
            let keys: Vec<_> = values.iter().map(|v| BucketKey::from_value(*v, w)).collect();
            let packed = pack_vector(&keys, w).unwrap();
            prop_assert_eq!(unpack_vector(&packed, w).unwrap(), keys);
        }

        #[test]
        fn test_prefix_matches_leading_bits(raw in any::<[u8; 32]>(), bits in 8u32..=32) {
            let w = width(bits);
            let key = prefix(&HashedPk::from_bytes(raw), w);
            let expected = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) >> (32 - bits);
            prop_assert_eq!(key.value(), expected);
        }
    }
}
