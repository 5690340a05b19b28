//! Golden vectors.
//!
//! Hand-packed query vectors and known prefixes. Any client that builds
//! query vectors must reproduce these bytes exactly, so the vectors are
//! written out by hand rather than generated by the code under test.

use tracebox_core::{pack_vector, prefix, unpack_vector, BucketKey, HashedPk, PrefixWidth};

/// A list of prefixes and the bytes they pack into.
#[derive(Debug, Clone, Copy)]
pub struct BitstreamVector {
    /// Short description.
    pub name: &'static str,
    /// Prefix width in bits.
    pub width_bits: u32,
    /// Right-justified prefix values.
    pub prefixes: &'static [u32],
    /// Expected packed bytes.
    pub packed: &'static [u8],
}

/// A packed vector that must be refused.
#[derive(Debug, Clone, Copy)]
pub struct InvalidVector {
    /// Short description.
    pub name: &'static str,
    /// Prefix width in bits.
    pub width_bits: u32,
    /// Bytes to unpack.
    pub packed: &'static [u8],
}

/// A hash input and its expected bucket prefix.
#[derive(Debug, Clone, Copy)]
pub struct PrefixVector {
    /// Short description.
    pub name: &'static str,
    /// Bytes fed to SHA-256.
    pub key: &'static [u8],
    /// Prefix width in bits.
    pub width_bits: u32,
    /// Expected byte-aligned prefix, hex encoded.
    pub bucket_hex: &'static str,
}

/// Valid bitstream vectors.
pub fn all_bitstream_vectors() -> Vec<BitstreamVector> {
    vec![
        BitstreamVector {
            name: "two 24-bit prefixes are plain bytes",
            width_bits: 24,
            prefixes: &[0xABCDEF, 0x123456],
            packed: &[0xAB, 0xCD, 0xEF, 0x12, 0x34, 0x56],
        },
        BitstreamVector {
            name: "18-bit prefixes straddle bytes",
            width_bits: 18,
            prefixes: &[0x2AF37, 0x48D1],
            packed: &[0xAB, 0xCD, 0xC4, 0x8D, 0x10],
        },
        BitstreamVector {
            name: "8-bit prefixes",
            width_bits: 8,
            prefixes: &[0x00, 0xFF, 0x7F],
            packed: &[0x00, 0xFF, 0x7F],
        },
        BitstreamVector {
            name: "single 16-bit prefix",
            width_bits: 16,
            prefixes: &[0x0102],
            packed: &[0x01, 0x02],
        },
        BitstreamVector {
            name: "12-bit prefixes share a byte",
            width_bits: 12,
            prefixes: &[0xABC, 0x123],
            packed: &[0xAB, 0xC1, 0x23],
        },
        BitstreamVector {
            name: "full 32-bit prefix",
            width_bits: 32,
            prefixes: &[0xDEADBEEF],
            packed: &[0xDE, 0xAD, 0xBE, 0xEF],
        },
    ]
}

/// Vectors every server must reject.
pub fn invalid_vectors() -> Vec<InvalidVector> {
    vec![
        InvalidVector {
            name: "empty vector",
            width_bits: 24,
            packed: &[],
        },
        InvalidVector {
            name: "a whole spare byte after one 24-bit prefix",
            width_bits: 24,
            packed: &[0xAB, 0xCD, 0xEF, 0x12],
        },
        InvalidVector {
            name: "too short for one 18-bit prefix",
            width_bits: 18,
            packed: &[0xAB, 0xCD],
        },
    ]
}

/// Prefixes of SHA-256 of the empty string,
/// `e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855`.
pub fn all_prefix_vectors() -> Vec<PrefixVector> {
    vec![
        PrefixVector {
            name: "empty key at 24 bits",
            key: b"",
            width_bits: 24,
            bucket_hex: "e3b0c4",
        },
        PrefixVector {
            name: "empty key at 18 bits",
            key: b"",
            width_bits: 18,
            bucket_hex: "e3b0c0",
        },
        PrefixVector {
            name: "empty key at 12 bits",
            key: b"",
            width_bits: 12,
            bucket_hex: "e3b0",
        },
    ]
}

fn width(bits: u32) -> Result<PrefixWidth, String> {
    PrefixWidth::new(bits).map_err(|e| e.to_string())
}

/// Pack and unpack a vector, comparing against the expected bytes.
pub fn check_bitstream_vector(vector: &BitstreamVector) -> Result<(), String> {
    let width = width(vector.width_bits)?;
    let keys: Vec<BucketKey> = vector
        .prefixes
        .iter()
        .map(|&v| BucketKey::from_value(v, width))
        .collect();

    let packed = pack_vector(&keys, width).map_err(|e| e.to_string())?;
    if packed != vector.packed {
        return Err(format!(
            "{}: packed {} want {}",
            vector.name,
            hex::encode(&packed),
            hex::encode(vector.packed)
        ));
    }

    let unpacked = unpack_vector(vector.packed, width).map_err(|e| e.to_string())?;
    let values: Vec<u32> = unpacked.iter().map(BucketKey::value).collect();
    if values != vector.prefixes {
        return Err(format!(
            "{}: unpacked {:x?} want {:x?}",
            vector.name, values, vector.prefixes
        ));
    }
    Ok(())
}

/// Check that an invalid vector is refused.
pub fn check_invalid_vector(vector: &InvalidVector) -> Result<(), String> {
    let width = width(vector.width_bits)?;
    match unpack_vector(vector.packed, width) {
        Ok(keys) => Err(format!("{}: accepted as {} keys", vector.name, keys.len())),
        Err(_) => Ok(()),
    }
}

/// Hash the key and compare its prefix.
pub fn check_prefix_vector(vector: &PrefixVector) -> Result<(), String> {
    let width = width(vector.width_bits)?;
    let bucket = prefix(&HashedPk::of(vector.key), width);
    if bucket.to_hex() != vector.bucket_hex {
        return Err(format!(
            "{}: got {} want {}",
            vector.name,
            bucket.to_hex(),
            vector.bucket_hex
        ));
    }
    Ok(())
}
