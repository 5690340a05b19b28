//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use rand::RngCore;

use tracebox_core::{HashedPk, PrefixWidth, Report};
use tracebox_crypto::{make_report, ContactBook, KeyPair, Rendezvous};
use tracebox_store::{MemoryBackend, ReportStore, SqliteBackend, StoreConfig, StoreError};

/// Two contacts who met once and exchanged rendezvous handshakes.
pub struct ContactPair {
    pub alice: KeyPair,
    pub bob: KeyPair,
    pub alice_book: ContactBook,
    pub bob_book: ContactBook,
    pub seen_at: u64,
}

impl ContactPair {
    /// Generate both key pairs and run the handshake in both directions.
    ///
    /// # Panics
    ///
    /// Panics if a freshly signed handshake fails to verify.
    pub fn meet(seen_at: u64) -> Self {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        // Each side only ever sees the other's signed envelope.
        let from_bob = Rendezvous::sign(&bob, seen_at).expect("sign handshake");
        let from_alice = Rendezvous::sign(&alice, seen_at).expect("sign handshake");

        let mut alice_book = ContactBook::new();
        alice_book
            .record_handshake(&alice, &from_bob)
            .expect("verify handshake");
        let mut bob_book = ContactBook::new();
        bob_book
            .record_handshake(&bob, &from_alice)
            .expect("verify handshake");

        Self {
            alice,
            bob,
            alice_book,
            bob_book,
            seen_at,
        }
    }

    /// Alice reports `memo` to Bob.
    ///
    /// # Panics
    ///
    /// Panics if encryption fails, which only happens on a broken RNG.
    pub fn report_from_alice(&self, memo: &[u8]) -> Report {
        make_report(&self.alice, self.bob.public_key(), memo).expect("encrypt report")
    }

    /// Bob reports `memo` to Alice.
    ///
    /// # Panics
    ///
    /// Panics if encryption fails, which only happens on a broken RNG.
    pub fn report_from_bob(&self, memo: &[u8]) -> Report {
        make_report(&self.bob, self.alice.public_key(), memo).expect("encrypt report")
    }
}

/// `count` reports keyed by hashes of random 16-byte source keys, each with
/// a distinct random body.
pub fn random_reports(count: usize) -> Vec<Report> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let mut source = [0u8; 16];
            rng.fill_bytes(&mut source);
            let mut body = vec![0u8; 48];
            rng.fill_bytes(&mut body);
            Report::new(HashedPk::of(&source), body)
        })
        .collect()
}

/// An in-memory store at `width`.
pub fn memory_store(width: PrefixWidth) -> ReportStore<MemoryBackend> {
    ReportStore::with_config(MemoryBackend::new(), store_config(width))
}

/// A SQLite store at `width` backed by an in-memory database.
pub fn sqlite_store(width: PrefixWidth) -> Result<ReportStore<SqliteBackend>, StoreError> {
    Ok(ReportStore::with_config(
        SqliteBackend::open_memory(width)?,
        store_config(width),
    ))
}

fn store_config(width: PrefixWidth) -> StoreConfig {
    StoreConfig {
        width,
        ..StoreConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_books_hold_each_other() {
        let pair = ContactPair::meet(1_588_000_000);
        assert!(pair.alice_book.contains(&pair.alice.public_key().hashed()));
        assert!(pair.bob_book.contains(&pair.bob.public_key().hashed()));
        assert_eq!(pair.seen_at, 1_588_000_000);
    }

    #[test]
    fn test_reports_match_in_both_directions() {
        let pair = ContactPair::meet(7);

        let to_bob = pair.report_from_alice(b"a->b");
        let to_alice = pair.report_from_bob(b"b->a");

        let bob_sees = pair.bob_book.match_reports([&to_bob, &to_alice]);
        assert_eq!(bob_sees.matches.len(), 1);
        assert_eq!(bob_sees.matches[0].memo, b"a->b");
        assert_eq!(bob_sees.skipped, 1);

        let alice_sees = pair.alice_book.match_reports([&to_bob, &to_alice]);
        assert_eq!(alice_sees.matches[0].memo, b"b->a");
    }

    #[test]
    fn test_random_reports_are_distinct() {
        let reports = random_reports(10);
        let mut keys: Vec<_> = reports.iter().map(|r| r.hashed_pk).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 10);
    }

    #[tokio::test]
    async fn test_store_fixtures() {
        let reports = random_reports(3);
        for width in [PrefixWidth::BITS_18, PrefixWidth::BITS_24] {
            let mem = memory_store(width);
            assert_eq!(mem.write_batch(reports.clone()).await.unwrap().accepted, 3);

            let sql = sqlite_store(width).unwrap();
            assert_eq!(sql.write_batch(reports.clone()).await.unwrap().accepted, 3);
            assert_eq!(sql.config().width, width);
        }
    }
}
