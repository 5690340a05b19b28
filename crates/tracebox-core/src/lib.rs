//! # Tracebox Core
//!
//! Pure primitives for tracebox: hashed contact keys, k-anonymity bucket
//! prefixes, and the dense bitstream used to ship many prefixes in one query.
//!
//! This crate contains no I/O, no storage, no cryptography beyond SHA-256.
//!
//! ## Key Types
//!
//! - [`HashedPk`] - SHA-256 digest of a contact's ephemeral public key
//! - [`PrefixWidth`] - Configured bucket width `W` in bits (8..=32)
//! - [`BucketKey`] - Leading `W` bits of a `HashedPk`, left-justified, zero-padded
//! - [`Report`] - An uploaded `(hashedPK, encodedMsg)` pair
//!
//! ## Bitstream
//!
//! Query vectors pack `W`-bit prefixes back to back with no padding between
//! fields. See [`bitstream`] for the primitive reader/writer and [`prefix`]
//! for the vector codec built on top of it.

pub mod bitstream;
pub mod error;
pub mod prefix;
pub mod types;

pub use bitstream::{read_bits, BitWriter};
pub use error::{CoreError, Result};
pub use prefix::{pack_vector, prefix, unpack_vector};
pub use types::{BucketKey, HashedPk, PrefixWidth, Report};
