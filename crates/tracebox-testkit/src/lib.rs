//! # Tracebox Testkit
//!
//! Testing utilities for tracebox.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Hand-packed query vectors and known prefixes that any
//!   client implementation must reproduce bit for bit
//! - **Generators**: Proptest strategies for keys, widths and reports
//! - **Fixtures**: Two contacts who have already met, and ready-made stores
//!
//! ## Golden Vectors
//!
//! ```rust
//! use tracebox_testkit::vectors::{all_bitstream_vectors, check_bitstream_vector};
//!
//! for vector in all_bitstream_vectors() {
//!     check_bitstream_vector(&vector).unwrap();
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use tracebox_core::{pack_vector, unpack_vector};
//! use tracebox_testkit::generators::width_and_keys;
//!
//! proptest! {
//!     #[test]
//!     fn vector_roundtrip((width, keys) in width_and_keys(64)) {
//!         let packed = pack_vector(&keys, width).unwrap();
//!         prop_assert_eq!(unpack_vector(&packed, width).unwrap(), keys);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use tracebox_testkit::fixtures::ContactPair;
//!
//! let pair = ContactPair::meet(1_588_000_000);
//! let report = pair.report_from_alice(b"positive");
//! assert_eq!(pair.bob_book.match_reports([&report]).matches.len(), 1);
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{random_reports, ContactPair};
