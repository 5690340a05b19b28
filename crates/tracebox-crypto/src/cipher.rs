//! AES-256-GCM report cipher.
//!
//! Wire format: `[12 bytes: nonce][N bytes: ciphertext + 16-byte tag]`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;

use crate::error::{CryptoError, Result};
use crate::keys::SessionSecret;

/// AES-GCM nonce length.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length.
pub const TAG_LEN: usize = 16;

/// Seal `plaintext` under `secret` with a fresh random nonce.
pub fn encrypt(secret: &SessionSecret, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(secret.as_bytes())
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Open a nonce-prefixed ciphertext produced by [`encrypt`].
///
/// Any tag failure, including input too short to hold a nonce and tag,
/// yields [`CryptoError::DecryptionFailed`] and no plaintext.
pub fn decrypt(secret: &SessionSecret, ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::DecryptionFailed);
    }
    let cipher =
        Aes256Gcm::new_from_slice(secret.as_bytes()).map_err(|_| CryptoError::DecryptionFailed)?;

    let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::DecryptionFailed)
}
