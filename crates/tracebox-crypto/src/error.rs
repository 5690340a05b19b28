//! Error types for the crypto module.

use thiserror::Error;

/// Errors that can occur while signing, agreeing on keys, or sealing reports.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Envelope header and body disagree, or a field cannot be sliced out.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// ECDSA verification failed or the signature is not valid DER.
    #[error("signature invalid")]
    SignatureInvalid,

    /// AEAD tag did not verify: tampered, truncated, or wrong key.
    #[error("decryption failed")]
    DecryptionFailed,

    /// An envelope field does not fit in its one-byte length prefix.
    #[error("{field} is {len} bytes, envelope fields are limited to 255")]
    PayloadTooLarge { field: &'static str, len: usize },

    /// Bytes do not encode a point on the curve.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Bytes do not encode a usable private scalar.
    #[error("invalid secret key")]
    InvalidSecretKey,

    /// Key agreement produced a degenerate shared secret.
    #[error("key agreement error: {0}")]
    KeyAgreement(String),

    /// Signing failed.
    #[error("signing error: {0}")]
    Signing(String),

    /// Encryption error.
    #[error("encryption error: {0}")]
    EncryptionFailed(String),

    /// Bucket prefix or query vector error.
    #[error(transparent)]
    Prefix(#[from] tracebox_core::CoreError),

    /// Memo encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
