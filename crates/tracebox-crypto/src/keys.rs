//! P-256 ephemeral keys and ECDH session secrets.
//!
//! A [`KeyPair`] is generated per rendezvous and never leaves its owner. The
//! same scalar signs the handshake envelope and later derives the session
//! secret with the peer's public point.

use p256::ecdh::diffie_hellman;
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use tracebox_core::HashedPk;

use crate::error::{CryptoError, Result};

/// Length of an uncompressed SEC1 point: `0x04 || X || Y`.
pub const UNCOMPRESSED_POINT_LEN: usize = 65;

/// A contact's P-256 public key.
#[derive(Clone, PartialEq, Eq)]
pub struct ContactPublicKey(PublicKey);

impl ContactPublicKey {
    /// Parse a SEC1-encoded point (compressed or uncompressed).
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self> {
        PublicKey::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    /// The 65-byte uncompressed encoding that is hashed and transmitted.
    pub fn to_uncompressed(&self) -> Vec<u8> {
        self.0.to_encoded_point(false).as_bytes().to_vec()
    }

    /// SHA-256 of the uncompressed encoding.
    pub fn hashed(&self) -> HashedPk {
        HashedPk::of(&self.to_uncompressed())
    }

    pub(crate) fn as_p256(&self) -> &PublicKey {
        &self.0
    }
}

impl fmt::Debug for ContactPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(self.to_uncompressed());
        write!(f, "ContactPublicKey({})", &hex[2..18])
    }
}

/// An ephemeral P-256 key pair.
pub struct KeyPair {
    signing: SigningKey,
    public: ContactPublicKey,
}

impl KeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        Self::from_secret(SecretKey::random(&mut OsRng))
    }

    /// Restore from a 32-byte big-endian scalar.
    pub fn from_bytes(scalar: &[u8; 32]) -> Result<Self> {
        SecretKey::from_slice(scalar)
            .map(Self::from_secret)
            .map_err(|_| CryptoError::InvalidSecretKey)
    }

    fn from_secret(secret: SecretKey) -> Self {
        let public = ContactPublicKey(secret.public_key());
        Self {
            signing: SigningKey::from(secret),
            public,
        }
    }

    /// The public half.
    pub fn public_key(&self) -> &ContactPublicKey {
        &self.public
    }

    /// Derive the session secret shared with `peer`.
    pub fn derive_secret(&self, peer: &ContactPublicKey) -> SessionSecret {
        derive_secret(self, peer)
    }

    /// The raw private scalar, wiped when dropped.
    pub fn to_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing.to_bytes().into())
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({:?})", self.public)
    }
}

/// A 32-byte symmetric key shared by two contacts.
///
/// Derived on demand and never persisted by this crate. Wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionSecret([u8; 32]);

impl SessionSecret {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hash raw key-agreement output into a session secret.
    pub(crate) fn from_shared(shared: &[u8]) -> Self {
        Self(Sha256::digest(shared).into())
    }
}

impl fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionSecret(..)")
    }
}

/// ECDH: `SHA-256(x(own * peer))`.
///
/// The x-coordinate is taken as its fixed-width 32-byte big-endian encoding.
/// `derive_secret(a, b.pub) == derive_secret(b, a.pub)` for any two pairs.
pub fn derive_secret(own: &KeyPair, peer: &ContactPublicKey) -> SessionSecret {
    let shared = diffie_hellman(own.signing.as_nonzero_scalar(), peer.as_p256().as_affine());
    SessionSecret::from_shared(shared.raw_secret_bytes().as_slice())
}
