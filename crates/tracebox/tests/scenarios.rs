//! End-to-end scenarios through the service surface.

use std::collections::BTreeSet;

use tracebox::crypto::report::decrypt_report;
use tracebox::crypto::sealed::{make_sealed_report, open, SealedKeyPair};
use tracebox::store::{now_secs, MemoryBackend};
use tracebox::{
    pack_vector, BackendConfig, ContactBook, CryptoError, KeyPair, Memo, PrefixWidth, Rendezvous,
    Report, ReportService, Request, ServiceConfig, OK_BODY,
};
use tracebox_testkit::{random_reports, ContactPair};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn memory_service() -> ReportService<MemoryBackend> {
    ReportService::new(MemoryBackend::new(), &ServiceConfig::default()).unwrap()
}

fn rows(body: &[u8]) -> Vec<Report> {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_two_prefix_query_returns_exactly_those_buckets() {
    init_tracing();
    let svc = memory_service();
    let width = PrefixWidth::BITS_24;
    let since = now_secs();

    let reports = random_reports(10);
    let resp = svc
        .handle(&Request::post("/reports", serde_json::to_vec(&reports).unwrap()))
        .await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, OK_BODY.as_bytes());

    let wanted = [reports[2].bucket(width), reports[7].bucket(width)];
    let vector = pack_vector(&wanted, width).unwrap();
    assert_eq!(vector.len(), 6);

    let resp = svc
        .handle(&Request::post(format!("/query/{}", since), vector))
        .await;
    assert_eq!(resp.status, 200);
    assert!(resp.partial_failure.is_none());

    let got: BTreeSet<_> = rows(&resp.body).into_iter().map(|r| r.hashed_pk).collect();
    let expected: BTreeSet<_> = reports
        .iter()
        .filter(|r| wanted.contains(&r.bucket(width)))
        .map(|r| r.hashed_pk)
        .collect();
    assert_eq!(got, expected);
    assert!(got.contains(&reports[2].hashed_pk));
    assert!(got.contains(&reports[7].hashed_pk));
}

#[tokio::test]
async fn test_rendezvous_report_and_match_end_to_end() {
    init_tracing();
    let svc = memory_service();
    let width = svc.store().config().width;

    // Handshake at the encounter.
    let alice = KeyPair::generate();
    let bob = KeyPair::generate();
    let mut bob_book = ContactBook::new();
    let filed_under = bob_book
        .record_handshake(&bob, &Rendezvous::sign(&alice, 1_588_000_000).unwrap())
        .unwrap();
    assert_eq!(filed_under, bob.public_key().hashed());

    // Alice falls ill and reports to every contact.
    let memo = Memo {
        report_type: 1,
        disease_id: 19,
        symptom_ids: vec![2, 5],
    };
    let report =
        tracebox::crypto::make_report(&alice, bob.public_key(), &memo.to_bytes().unwrap()).unwrap();
    let mut batch = random_reports(20);
    batch.push(report);
    svc.submit_reports(&serde_json::to_vec(&batch).unwrap())
        .await
        .unwrap();

    // Bob asks for his buckets and decrypts what he can.
    let vector = bob_book.query_vector(width).unwrap();
    let resp = svc.handle(&Request::post("/query/0", vector)).await;
    assert_eq!(resp.status, 200);

    let candidates = rows(&resp.body);
    let outcome = bob_book.match_reports(&candidates);
    assert_eq!(outcome.matches.len(), 1);
    assert!(outcome.failures.is_empty());

    let found = &outcome.matches[0];
    assert_eq!(found.seen_at, 1_588_000_000);
    assert_eq!(found.peer, *alice.public_key());
    assert_eq!(Memo::from_bytes(&found.memo).unwrap(), memo);
}

#[tokio::test]
async fn test_corrupted_ciphertext_is_reported_not_matched() {
    let pair = ContactPair::meet(42);
    let report = pair.report_from_alice(b"positive");

    let mut body = report.encoded_msg.to_vec();
    let last = body.len() - 1;
    body[last] ^= 0x01;
    let corrupted = Report::new(report.hashed_pk, body);

    let secret = pair.bob.derive_secret(pair.alice.public_key());
    assert_eq!(
        decrypt_report(&corrupted, &secret),
        Err(CryptoError::DecryptionFailed)
    );

    let outcome = pair.bob_book.match_reports([&corrupted]);
    assert!(outcome.matches.is_empty());
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].1, CryptoError::DecryptionFailed);
}

#[tokio::test]
async fn test_18_bit_sqlite_service() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = ServiceConfig {
        prefix_bits: 18,
        backend: BackendConfig::Sqlite {
            path: dir.path().join("reports.db"),
        },
        ..Default::default()
    };
    let width = config.prefix_width().unwrap();

    let reports = random_reports(10);
    {
        let svc = ReportService::open(&config).unwrap();
        let outcome = svc
            .submit_reports(&serde_json::to_vec(&reports).unwrap())
            .await
            .unwrap();
        assert_eq!(outcome.accepted, 10);
    }

    // Reopen and read back through the file.
    let svc = ReportService::open(&config).unwrap();
    let vector = pack_vector(&[reports[0].bucket(width), reports[1].bucket(width)], width).unwrap();
    assert_eq!(vector.len(), 5);

    let resp = svc.query_reports(&vector, Some(0)).await.unwrap();
    let got: BTreeSet<_> = resp.reports.iter().map(|r| r.hashed_pk).collect();
    assert!(got.contains(&reports[0].hashed_pk));
    assert!(got.contains(&reports[1].hashed_pk));

    let synced = svc.sync_reports(Some(0)).await.unwrap();
    assert_eq!(synced.reports.len(), 10);

    // The database is pinned to 18 bits.
    let wider = ServiceConfig {
        prefix_bits: 24,
        ..config
    };
    assert!(ReportService::open(&wider).is_err());
}

#[tokio::test]
async fn test_sealed_reports_through_the_service() {
    let svc = memory_service();
    let width = svc.store().config().width;

    let sender = SealedKeyPair::generate();
    let recipient = SealedKeyPair::generate();
    let report = make_sealed_report(&sender, recipient.public_key(), b"exposed").unwrap();

    svc.submit_reports(&serde_json::to_vec(&vec![report]).unwrap())
        .await
        .unwrap();

    let bucket = tracebox::prefix(&recipient.public_key().hashed(), width);
    let resp = svc
        .query_reports(&pack_vector(&[bucket], width).unwrap(), Some(0))
        .await
        .unwrap();

    let mine: Vec<_> = resp
        .reports
        .iter()
        .filter(|r| r.hashed_pk == recipient.public_key().hashed())
        .collect();
    assert_eq!(mine.len(), 1);
    assert_eq!(
        open(&recipient, sender.public_key(), &mine[0].encoded_msg).unwrap(),
        b"exposed"
    );
}

#[tokio::test]
async fn test_resubmission_replaces_previous_report() {
    let svc = memory_service();
    let width = svc.store().config().width;
    let pair = ContactPair::meet(9);

    let first = pair.report_from_alice(b"suspected");
    let second = pair.report_from_alice(b"confirmed");
    assert_eq!(first.hashed_pk, second.hashed_pk);

    for report in [&first, &second] {
        svc.submit_reports(&serde_json::to_vec(&vec![report]).unwrap())
            .await
            .unwrap();
    }

    let vector = pair.bob_book.query_vector(width).unwrap();
    let resp = svc.query_reports(&vector, Some(0)).await.unwrap();
    let outcome = pair.bob_book.match_reports(&resp.reports);
    assert_eq!(outcome.matches.len(), 1);
    assert_eq!(outcome.matches[0].memo, b"confirmed");
}
