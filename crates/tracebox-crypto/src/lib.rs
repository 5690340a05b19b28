//! # Tracebox Crypto
//!
//! The cryptographic half of tracebox: what two contacts exchange when they
//! meet, and how a report gets from a symptomatic sender to exactly one
//! recipient.
//!
//! ## Protocol
//!
//! 1. At a rendezvous each side generates a [`KeyPair`] and sends a signed
//!    [`Rendezvous`] envelope carrying its public key and the encounter time.
//! 2. A sender who becomes symptomatic derives the [`SessionSecret`] with each
//!    contact ([`derive_secret`]), encrypts a [`Memo`] and files it under the
//!    hash of the contact's public key ([`make_report`]).
//! 3. A recipient's [`ContactBook`] builds the bucket query and decrypts only
//!    rows whose full hash it holds.
//!
//! The [`sealed`] module offers the same flow over X25519 and
//! XChaCha20-Poly1305.
//!
//! ## Security Notes
//!
//! - Private scalars and session secrets are redacted in `Debug` output.
//! - Decryption never returns partial plaintext: any tag failure is
//!   [`CryptoError::DecryptionFailed`].

pub mod cipher;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod report;
pub mod sealed;

pub use cipher::{decrypt, encrypt};
pub use envelope::{sign, verify, Envelope, Rendezvous};
pub use error::{CryptoError, Result};
pub use keys::{derive_secret, ContactPublicKey, KeyPair, SessionSecret};
pub use report::{decrypt_report, make_report, ContactBook, Match, MatchOutcome, Memo};
pub use sealed::{make_sealed_report, SealedKeyPair, SealedPublicKey};
