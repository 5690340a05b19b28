//! Curve25519 sealed-box scheme.
//!
//! An alternate to the P-256 ECDH + AES-GCM pair. The shared secret never
//! leaves this module: `seal` and `open` agree on the key internally with
//! X25519 and encrypt with XChaCha20-Poly1305.
//!
//! Wire format: `[24 bytes: nonce][N bytes: ciphertext + 16-byte tag]`.
//! The report key is SHA-256 of the recipient's raw 32-byte public key.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use tracebox_core::{HashedPk, Report};

use crate::error::{CryptoError, Result};

/// XChaCha20-Poly1305 nonce length.
pub const SEALED_NONCE_LEN: usize = 24;

const SEALED_TAG_LEN: usize = 16;

/// A raw 32-byte X25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SealedPublicKey(pub [u8; 32]);

impl SealedPublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// SHA-256 of the raw key.
    pub fn hashed(&self) -> HashedPk {
        HashedPk::of(&self.0)
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        let arr: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            CryptoError::InvalidPublicKey(format!("expected 32 bytes, got {}", v.len()))
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for SealedPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SealedPublicKey({})", &self.to_hex()[..16])
    }
}

impl Serialize for SealedPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SealedPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// An X25519 key pair.
pub struct SealedKeyPair {
    secret: StaticSecret,
    public: SealedPublicKey,
}

impl SealedKeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; 32]);
        rand::thread_rng().fill_bytes(bytes.as_mut_slice());
        Self::from_bytes(*bytes)
    }

    /// Restore from a 32-byte secret. Clamping is applied by X25519.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = SealedPublicKey(PublicKey::from(&secret).to_bytes());
        Self { secret, public }
    }

    /// The public half.
    pub fn public_key(&self) -> &SealedPublicKey {
        &self.public
    }

    fn box_key(&self, peer: &SealedPublicKey) -> Result<Zeroizing<[u8; 32]>> {
        let shared = self.secret.diffie_hellman(&PublicKey::from(peer.0));
        if !shared.was_contributory() {
            return Err(CryptoError::KeyAgreement(
                "peer key is a low-order point".into(),
            ));
        }
        let key: [u8; 32] = Sha256::digest(shared.as_bytes()).into();
        Ok(Zeroizing::new(key))
    }
}

impl fmt::Debug for SealedKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SealedKeyPair({:?})", self.public)
    }
}

/// Encrypt `plaintext` from `sender` to `recipient`.
pub fn seal(sender: &SealedKeyPair, recipient: &SealedPublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let key = sender.box_key(recipient)?;
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_slice())
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut nonce = [0u8; SEALED_NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let sealed = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut out = Vec::with_capacity(SEALED_NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Open a box that `sender` sealed for `recipient`.
pub fn open(recipient: &SealedKeyPair, sender: &SealedPublicKey, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < SEALED_NONCE_LEN + SEALED_TAG_LEN {
        return Err(CryptoError::DecryptionFailed);
    }
    let key = recipient.box_key(sender)?;
    let cipher =
        XChaCha20Poly1305::new_from_slice(key.as_slice()).map_err(|_| CryptoError::DecryptionFailed)?;

    let (nonce, body) = sealed.split_at(SEALED_NONCE_LEN);
    cipher
        .decrypt(XNonce::from_slice(nonce), body)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Build a report filed under the recipient's raw X25519 key.
pub fn make_sealed_report(
    sender: &SealedKeyPair,
    recipient: &SealedPublicKey,
    memo: &[u8],
) -> Result<Report> {
    let encoded = seal(sender, recipient, memo)?;
    Ok(Report::new(recipient.hashed(), encoded))
}
