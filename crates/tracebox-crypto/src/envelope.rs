//! Signed, length-prefixed envelope exchanged at rendezvous.
//!
//! Wire format:
//!
//! ```text
//! [1 byte: len(pubkey)][1 byte: len(sig)][1 byte: len(payload)]
//! [pubkey: uncompressed SEC1][sig: DER ECDSA (r, s)][payload]
//! ```
//!
//! The signature is ECDSA P-256 over SHA-256 of the payload.

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, VerifyingKey};

use crate::error::{CryptoError, Result};
use crate::keys::{ContactPublicKey, KeyPair};

/// Size of the three one-byte length fields.
pub const HEADER_LEN: usize = 3;

/// Largest value a single length field can carry.
pub const MAX_FIELD_LEN: usize = u8::MAX as usize;

/// A parsed but not yet verified envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Uncompressed SEC1 public key of the signer.
    pub public_key: Vec<u8>,
    /// DER-encoded ECDSA signature.
    pub signature: Vec<u8>,
    /// The signed payload.
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Sign `payload` with `keypair`.
    pub fn seal(keypair: &KeyPair, payload: &[u8]) -> Result<Self> {
        if payload.len() > MAX_FIELD_LEN {
            return Err(CryptoError::PayloadTooLarge {
                field: "payload",
                len: payload.len(),
            });
        }
        let signature: Signature = keypair
            .signing_key()
            .try_sign(payload)
            .map_err(|e| CryptoError::Signing(e.to_string()))?;

        Ok(Self {
            public_key: keypair.public_key().to_uncompressed(),
            signature: signature.to_der().as_bytes().to_vec(),
            payload: payload.to_vec(),
        })
    }

    /// Encode as header || pubkey || signature || payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let header = [
            field_len("public key", &self.public_key)?,
            field_len("signature", &self.signature)?,
            field_len("payload", &self.payload)?,
        ];

        let mut out = Vec::with_capacity(
            HEADER_LEN + self.public_key.len() + self.signature.len() + self.payload.len(),
        );
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.public_key);
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Slice an encoded envelope into its fields without verifying it.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(CryptoError::MalformedEnvelope(format!(
                "{} bytes is shorter than the header",
                bytes.len()
            )));
        }
        let pk_len = bytes[0] as usize;
        let sig_len = bytes[1] as usize;
        let payload_len = bytes[2] as usize;

        let expected = HEADER_LEN + pk_len + sig_len + payload_len;
        if bytes.len() != expected {
            return Err(CryptoError::MalformedEnvelope(format!(
                "header declares {} bytes, got {}",
                expected,
                bytes.len()
            )));
        }

        let body = &bytes[HEADER_LEN..];
        let (public_key, rest) = body.split_at(pk_len);
        let (signature, payload) = rest.split_at(sig_len);

        Ok(Self {
            public_key: public_key.to_vec(),
            signature: signature.to_vec(),
            payload: payload.to_vec(),
        })
    }

    /// Check the signature and return the signer's key.
    pub fn verify(&self) -> Result<ContactPublicKey> {
        let signer = ContactPublicKey::from_sec1_bytes(&self.public_key)
            .map_err(|e| CryptoError::MalformedEnvelope(e.to_string()))?;
        let verifying_key = VerifyingKey::from_sec1_bytes(&self.public_key)
            .map_err(|e| CryptoError::MalformedEnvelope(e.to_string()))?;

        let signature =
            Signature::from_der(&self.signature).map_err(|_| CryptoError::SignatureInvalid)?;

        verifying_key
            .verify(&self.payload, &signature)
            .map_err(|_| CryptoError::SignatureInvalid)?;

        Ok(signer)
    }
}

fn field_len(field: &'static str, bytes: &[u8]) -> Result<u8> {
    u8::try_from(bytes.len()).map_err(|_| CryptoError::PayloadTooLarge {
        field,
        len: bytes.len(),
    })
}

/// Sign `payload` and encode the envelope.
pub fn sign(keypair: &KeyPair, payload: &[u8]) -> Result<Vec<u8>> {
    Envelope::seal(keypair, payload)?.to_bytes()
}

/// Parse and verify an encoded envelope.
///
/// Returns the payload and the signer's public key.
pub fn verify(bytes: &[u8]) -> Result<(Vec<u8>, ContactPublicKey)> {
    let envelope = Envelope::parse(bytes)?;
    let signer = envelope.verify()?;
    Ok((envelope.payload, signer))
}

/// The handshake two contacts exchange when they meet: each signs the
/// encounter time with its ephemeral key.
pub struct Rendezvous;

impl Rendezvous {
    /// Length of the signed timestamp payload.
    pub const PAYLOAD_LEN: usize = 8;

    /// Sign the encounter time (Unix seconds, little-endian).
    pub fn sign(keypair: &KeyPair, seen_at: u64) -> Result<Vec<u8>> {
        sign(keypair, &seen_at.to_le_bytes())
    }

    /// Verify a peer's handshake, returning the encounter time and the
    /// peer's ephemeral public key.
    pub fn verify(bytes: &[u8]) -> Result<(u64, ContactPublicKey)> {
        let (payload, peer) = verify(bytes)?;
        let ts: [u8; Self::PAYLOAD_LEN] = payload.as_slice().try_into().map_err(|_| {
            CryptoError::MalformedEnvelope(format!(
                "handshake payload is {} bytes, expected {}",
                payload.len(),
                Self::PAYLOAD_LEN
            ))
        })?;
        Ok((u64::from_le_bytes(ts), peer))
    }
}
