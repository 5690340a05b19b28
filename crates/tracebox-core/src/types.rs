//! Strong type definitions for tracebox.
//!
//! Hashes, widths and bucket keys are newtypes so a full hash can never be
//! passed where a bucket prefix is expected.

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{CoreError, Result};

/// A 32-byte SHA-256 digest of a contact's raw public key.
///
/// For P-256 contacts this is the hash of the 65-byte uncompressed SEC1
/// point; for Curve25519 contacts, of the raw 32-byte key. It is the natural
/// key of a stored report.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashedPk(pub [u8; 32]);

impl HashedPk {
    /// Hash raw public key bytes.
    pub fn of(public_key: &[u8]) -> Self {
        Self(Sha256::digest(public_key).into())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidHashedPk(e.to_string()))?;
        Self::try_from(bytes.as_slice())
    }
}

impl fmt::Debug for HashedPk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashedPk({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for HashedPk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for HashedPk {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for HashedPk {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for HashedPk {
    type Error = CoreError;

    fn try_from(slice: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = slice.try_into().map_err(|_| {
            CoreError::InvalidHashedPk(format!("expected 32 bytes, got {}", slice.len()))
        })?;
        Ok(Self(arr))
    }
}

impl Serialize for HashedPk {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for HashedPk {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Width `W` of a bucket prefix, in bits.
///
/// Restricted to 8..=32: below one byte the zero padding at the end of a
/// packed vector could be mistaken for an extra field, and beyond 32 bits
/// buckets stop providing meaningful k-anonymity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PrefixWidth(u8);

impl PrefixWidth {
    /// Smallest supported width.
    pub const MIN_BITS: u32 = 8;
    /// Largest supported width.
    pub const MAX_BITS: u32 = 32;

    /// Three whole bytes, the width used by the columnar deployment.
    pub const BITS_24: Self = Self(24);
    /// The 18-bit width used by the relational deployment.
    pub const BITS_18: Self = Self(18);

    /// Validate and construct a width.
    pub fn new(bits: u32) -> Result<Self> {
        if (Self::MIN_BITS..=Self::MAX_BITS).contains(&bits) {
            Ok(Self(bits as u8))
        } else {
            Err(CoreError::InvalidPrefixWidth(bits))
        }
    }

    /// Width in bits.
    pub const fn bits(&self) -> u32 {
        self.0 as u32
    }

    /// Number of bytes a bucket key of this width occupies: `ceil(W / 8)`.
    pub const fn byte_len(&self) -> usize {
        (self.0 as usize + 7) / 8
    }

    /// Zero bits appended after the prefix to reach a byte boundary.
    pub const fn pad_bits(&self) -> u32 {
        (self.byte_len() * 8) as u32 - self.bits()
    }
}

impl Default for PrefixWidth {
    fn default() -> Self {
        Self::BITS_24
    }
}

impl TryFrom<u32> for PrefixWidth {
    type Error = CoreError;

    fn try_from(bits: u32) -> Result<Self> {
        Self::new(bits)
    }
}

impl From<PrefixWidth> for u32 {
    fn from(width: PrefixWidth) -> u32 {
        width.bits()
    }
}

/// A bucket key: the leading `W` bits of a [`HashedPk`], left-justified in
/// `ceil(W / 8)` bytes with the trailing pad bits zeroed.
///
/// Bytes beyond `byte_len` are always zero, so derived equality and ordering
/// only depend on the prefix itself.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    width: PrefixWidth,
    bytes: [u8; 4],
}

impl BucketKey {
    /// Build a key from a right-justified `W`-bit value.
    ///
    /// Bits above `W` are discarded.
    pub fn from_value(value: u32, width: PrefixWidth) -> Self {
        let bits = width.bits();
        let masked = if bits == 32 {
            value
        } else {
            value & ((1u32 << bits) - 1)
        };
        let aligned = (masked as u64) << width.pad_bits();
        let be = aligned.to_be_bytes();
        let len = width.byte_len();
        let mut bytes = [0u8; 4];
        bytes[..len].copy_from_slice(&be[8 - len..]);
        Self { width, bytes }
    }

    /// Build a key from its byte-aligned form.
    ///
    /// The slice must be exactly `ceil(W / 8)` bytes; pad bits are cleared.
    pub fn from_slice(slice: &[u8], width: PrefixWidth) -> Result<Self> {
        let len = width.byte_len();
        if slice.len() != len {
            return Err(CoreError::InvalidQueryVector(format!(
                "bucket key of {} bits needs {} bytes, got {}",
                width.bits(),
                len,
                slice.len()
            )));
        }
        let mut bytes = [0u8; 4];
        bytes[..len].copy_from_slice(slice);
        bytes[len - 1] &= 0xFFu8 << width.pad_bits();
        Ok(Self { width, bytes })
    }

    /// The right-justified `W`-bit value of this key.
    pub fn value(&self) -> u32 {
        u32::from_be_bytes(self.bytes) >> (32 - self.width.bits())
    }

    /// The prefix width.
    pub const fn width(&self) -> PrefixWidth {
        self.width
    }

    /// The byte-aligned, zero-padded key.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.width.byte_len()]
    }

    /// Hex form, used as the row key by the columnar layout.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl fmt::Debug for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BucketKey({}/{})", self.to_hex(), self.width.bits())
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A report as uploaded by a symptomatic sender and returned to queriers.
///
/// Serialized as `{"hashedPK": "<hex>", "encodedMsg": "<hex>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Hash of the recipient's ephemeral public key.
    #[serde(rename = "hashedPK")]
    pub hashed_pk: HashedPk,

    /// Nonce-prefixed ciphertext of the memo.
    #[serde(rename = "encodedMsg", with = "hex_bytes")]
    pub encoded_msg: Bytes,
}

impl Report {
    /// Create a report.
    pub fn new(hashed_pk: HashedPk, encoded_msg: impl Into<Bytes>) -> Self {
        Self {
            hashed_pk,
            encoded_msg: encoded_msg.into(),
        }
    }

    /// The bucket this report is filed under at width `W`.
    pub fn bucket(&self, width: PrefixWidth) -> BucketKey {
        crate::prefix::prefix(&self.hashed_pk, width)
    }
}

mod hex_bytes {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
