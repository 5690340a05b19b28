//! Proptest generators for property-based testing.

use proptest::prelude::*;

use tracebox_core::{BucketKey, HashedPk, PrefixWidth, Report};
use tracebox_crypto::{KeyPair, Memo, SealedKeyPair};

/// Generate a random HashedPk.
pub fn hashed_pk() -> impl Strategy<Value = HashedPk> {
    any::<[u8; 32]>().prop_map(HashedPk::from_bytes)
}

/// Generate any supported prefix width.
pub fn prefix_width() -> impl Strategy<Value = PrefixWidth> {
    (PrefixWidth::MIN_BITS..=PrefixWidth::MAX_BITS)
        .prop_filter_map("width in range", |bits| PrefixWidth::new(bits).ok())
}

/// The widths deployments have actually used.
pub fn deployed_width() -> impl Strategy<Value = PrefixWidth> {
    prop::sample::select(vec![8u32, 16, 18, 24])
        .prop_filter_map("width in range", |bits| PrefixWidth::new(bits).ok())
}

/// Generate a bucket key of the given width.
pub fn bucket_key(width: PrefixWidth) -> impl Strategy<Value = BucketKey> {
    any::<u32>().prop_map(move |v| BucketKey::from_value(v, width))
}

/// Generate a width together with up to `max` keys of that width.
pub fn width_and_keys(max: usize) -> impl Strategy<Value = (PrefixWidth, Vec<BucketKey>)> {
    prefix_width().prop_flat_map(move |width| {
        (
            Just(width),
            prop::collection::vec(bucket_key(width), 1..=max.max(1)),
        )
    })
}

/// Generate ciphertext-like message bytes (never empty).
pub fn encoded_msg(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..=max_len.max(1))
}

/// Generate a report with an arbitrary key and body.
pub fn report() -> impl Strategy<Value = Report> {
    (hashed_pk(), encoded_msg(256)).prop_map(|(h, m)| Report::new(h, m))
}

/// Generate a valid P-256 key pair.
///
/// Seeds that are not valid scalars are skipped.
pub fn keypair() -> impl Strategy<Value = KeyPair> {
    any::<[u8; 32]>().prop_filter_map("valid P-256 scalar", |seed| KeyPair::from_bytes(&seed).ok())
}

/// Generate an X25519 key pair.
pub fn sealed_keypair() -> impl Strategy<Value = SealedKeyPair> {
    any::<[u8; 32]>().prop_map(SealedKeyPair::from_bytes)
}

/// Generate a diagnosis memo.
pub fn memo() -> impl Strategy<Value = Memo> {
    (
        0u32..8,
        any::<u32>(),
        prop::collection::vec(0u32..64, 0..10),
    )
        .prop_map(|(report_type, disease_id, symptom_ids)| Memo {
            report_type,
            disease_id,
            symptom_ids,
        })
}
