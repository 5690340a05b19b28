//! Report construction on the sender side and matching on the recipient side.
//!
//! A symptomatic sender encrypts a [`Memo`] to each contact's ephemeral key
//! and files it under the hash of that key. A recipient keeps a
//! [`ContactBook`] of its own ephemeral keys, asks the server for the buckets
//! those keys fall in, and decrypts only the rows whose full hash it holds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use tracebox_core::{pack_vector, BucketKey, HashedPk, PrefixWidth, Report};

use crate::cipher;
use crate::envelope::Rendezvous;
use crate::error::{CryptoError, Result};
use crate::keys::{ContactPublicKey, KeyPair, SessionSecret};

/// The structured diagnosis carried inside a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memo {
    /// Kind of report (self-reported, test confirmed, ...).
    pub report_type: u32,
    /// Disease identifier.
    pub disease_id: u32,
    /// Reported symptoms.
    pub symptom_ids: Vec<u32>,
}

impl Memo {
    /// Encode as CBOR.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CryptoError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Decode from CBOR.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| CryptoError::Serialization(e.to_string()))
    }
}

/// Encrypt `memo` from `sender` to `recipient` and file it under the
/// recipient's hashed key.
pub fn make_report(sender: &KeyPair, recipient: &ContactPublicKey, memo: &[u8]) -> Result<Report> {
    let secret = sender.derive_secret(recipient);
    let encoded = cipher::encrypt(&secret, memo)?;
    Ok(Report::new(recipient.hashed(), encoded))
}

/// Decrypt a report's memo with a session secret.
pub fn decrypt_report(report: &Report, secret: &SessionSecret) -> Result<Vec<u8>> {
    cipher::decrypt(secret, &report.encoded_msg)
}

struct Contact {
    peer: ContactPublicKey,
    seen_at: u64,
    secret: SessionSecret,
}

/// A report that decrypted under a held session secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Which of our keys the report was filed under.
    pub hashed_pk: HashedPk,
    /// The contact who sent it.
    pub peer: ContactPublicKey,
    /// When we met.
    pub seen_at: u64,
    /// Decrypted memo bytes.
    pub memo: Vec<u8>,
}

/// Result of matching a batch of candidate reports.
#[derive(Debug, Default)]
pub struct MatchOutcome {
    /// Reports that decrypted.
    pub matches: Vec<Match>,
    /// Reports filed under a held key that failed to decrypt.
    pub failures: Vec<(HashedPk, CryptoError)>,
    /// Bucket mates filed under keys we do not hold.
    pub skipped: usize,
}

/// The recipient's record of encounters.
///
/// Holds, per encounter, the session secret derived from our ephemeral key
/// and the peer's. Entries are keyed by the hash of our own public key,
/// which is what a sender files reports under.
#[derive(Default)]
pub struct ContactBook {
    contacts: BTreeMap<HashedPk, Contact>,
}

impl ContactBook {
    /// Create an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an encounter. Returns the key reports will be filed under.
    pub fn record(&mut self, own: &KeyPair, peer: ContactPublicKey, seen_at: u64) -> HashedPk {
        let hashed = own.public_key().hashed();
        let secret = own.derive_secret(&peer);
        self.contacts.insert(
            hashed,
            Contact {
                peer,
                seen_at,
                secret,
            },
        );
        hashed
    }

    /// Verify a peer's rendezvous envelope and record the encounter.
    pub fn record_handshake(&mut self, own: &KeyPair, envelope: &[u8]) -> Result<HashedPk> {
        let (seen_at, peer) = Rendezvous::verify(envelope)?;
        Ok(self.record(own, peer, seen_at))
    }

    /// Number of recorded encounters.
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    /// Whether no encounter has been recorded.
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Whether reports filed under `hashed` would be ours.
    pub fn contains(&self, hashed: &HashedPk) -> bool {
        self.contacts.contains_key(hashed)
    }

    /// Distinct buckets our keys fall in, sorted.
    pub fn bucket_keys(&self, width: PrefixWidth) -> Vec<BucketKey> {
        let mut keys: Vec<_> = self
            .contacts
            .keys()
            .map(|h| tracebox_core::prefix(h, width))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// The packed query vector covering every held key.
    pub fn query_vector(&self, width: PrefixWidth) -> Result<Vec<u8>> {
        Ok(pack_vector(&self.bucket_keys(width), width)?)
    }

    /// Try to decrypt the reports addressed to us.
    ///
    /// Rows whose full hash is not held are counted as skipped and never
    /// decrypted.
    pub fn match_reports<'a>(&self, reports: impl IntoIterator<Item = &'a Report>) -> MatchOutcome {
        let mut outcome = MatchOutcome::default();
        for report in reports {
            let Some(contact) = self.contacts.get(&report.hashed_pk) else {
                outcome.skipped += 1;
                continue;
            };
            match decrypt_report(report, &contact.secret) {
                Ok(memo) => outcome.matches.push(Match {
                    hashed_pk: report.hashed_pk,
                    peer: contact.peer.clone(),
                    seen_at: contact.seen_at,
                    memo,
                }),
                Err(e) => outcome.failures.push((report.hashed_pk, e)),
            }
        }
        outcome
    }
}

impl std::fmt::Debug for ContactBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContactBook")
            .field("contacts", &self.contacts.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracebox_core::unpack_vector;

    fn memo() -> Memo {
        Memo {
            report_type: 1,
            disease_id: 19,
            symptom_ids: vec![3, 7, 11],
        }
    }

    #[test]
    fn test_memo_cbor_roundtrip() {
        let bytes = memo().to_bytes().unwrap();
        assert_eq!(Memo::from_bytes(&bytes).unwrap(), memo());
    }

    #[test]
    fn test_memo_decode_error_is_typed() {
        assert!(matches!(
            Memo::from_bytes(&[0xFF, 0x00, 0x13]),
            Err(CryptoError::Serialization(_))
        ));
    }

    #[test]
    fn test_make_and_decrypt_report() {
        let sender = KeyPair::generate();
        let recipient = KeyPair::generate();
        let memo_bytes = memo().to_bytes().unwrap();

        let report = make_report(&sender, recipient.public_key(), &memo_bytes).unwrap();
        assert_eq!(report.hashed_pk, recipient.public_key().hashed());

        let secret = recipient.derive_secret(sender.public_key());
        let plain = decrypt_report(&report, &secret).unwrap();
        assert_eq!(Memo::from_bytes(&plain).unwrap(), memo());
    }

    #[test]
    fn test_corrupted_report_fails() {
        let sender = KeyPair::generate();
        let recipient = KeyPair::generate();
        let report = make_report(&sender, recipient.public_key(), b"memo").unwrap();

        let mut bytes = report.encoded_msg.to_vec();
        bytes[cipher::NONCE_LEN] ^= 0xFF;
        let corrupted = Report::new(report.hashed_pk, bytes);

        let secret = recipient.derive_secret(sender.public_key());
        assert_eq!(
            decrypt_report(&corrupted, &secret),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_contact_book_matches_only_held_keys() {
        let me = KeyPair::generate();
        let them = KeyPair::generate();
        let stranger = KeyPair::generate();

        let mut book = ContactBook::new();
        let handshake = Rendezvous::sign(&them, 1_600_000_000).unwrap();
        let filed_under = book.record_handshake(&me, &handshake).unwrap();
        assert_eq!(filed_under, me.public_key().hashed());
        assert!(book.contains(&filed_under));

        let ours = make_report(&them, me.public_key(), b"positive").unwrap();
        let other = make_report(&them, stranger.public_key(), b"not ours").unwrap();

        let outcome = book.match_reports([&ours, &other]);
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.skipped, 1);
        assert!(outcome.failures.is_empty());

        let hit = &outcome.matches[0];
        assert_eq!(hit.memo, b"positive");
        assert_eq!(hit.seen_at, 1_600_000_000);
        assert_eq!(&hit.peer, them.public_key());
    }

    #[test]
    fn test_contact_book_reports_tampered_rows() {
        let me = KeyPair::generate();
        let them = KeyPair::generate();
        let mut book = ContactBook::new();
        book.record(&me, them.public_key().clone(), 42);

        let report = make_report(&them, me.public_key(), b"memo").unwrap();
        let mut bytes = report.encoded_msg.to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        let outcome = book.match_reports([&Report::new(report.hashed_pk, bytes)]);
        assert!(outcome.matches.is_empty());
        assert_eq!(
            outcome.failures,
            vec![(me.public_key().hashed(), CryptoError::DecryptionFailed)]
        );
    }

    #[test]
    fn test_query_vector_covers_every_contact() {
        let width = PrefixWidth::BITS_18;
        let mut book = ContactBook::new();
        let mine: Vec<_> = (0..5).map(|_| KeyPair::generate()).collect();
        for kp in &mine {
            book.record(kp, KeyPair::generate().public_key().clone(), 0);
        }
        assert_eq!(book.len(), 5);

        let keys = unpack_vector(&book.query_vector(width).unwrap(), width).unwrap();
        for kp in &mine {
            let bucket = tracebox_core::prefix(&kp.public_key().hashed(), width);
            assert!(keys.contains(&bucket));
        }
    }

    #[test]
    fn test_empty_book() {
        let book = ContactBook::new();
        assert!(book.is_empty());
        assert!(book.bucket_keys(PrefixWidth::default()).is_empty());
        assert!(book.match_reports(&[]).matches.is_empty());
    }
}
