//! # Tracebox
//!
//! Privacy-preserving exchange of contact reports.
//!
//! ## Overview
//!
//! Two people who meet swap ephemeral public keys in a signed handshake.
//! If one of them later falls ill, they encrypt a diagnosis memo to each
//! contact's key and upload it filed under a short prefix of the key's hash.
//! Everyone else periodically asks the server for the buckets their own keys
//! fall in and tries to decrypt what comes back. The server learns bucket
//! membership only, never which key inside a bucket a querier holds.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tracebox::{ReportService, Request, ServiceConfig};
//!
//! async fn example(vector: Vec<u8>) {
//!     let config = ServiceConfig::default().apply_env();
//!     let service = ReportService::open(&config).unwrap();
//!
//!     let response = service.handle(&Request::post("/query/1588000000", vector)).await;
//!     assert_eq!(response.status, 200);
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `tracebox::core` - Hashed keys, bucket prefixes, the query bitstream
//! - `tracebox::crypto` - Handshake envelopes, key agreement, report cipher
//! - `tracebox::store` - Storage backends and the fan-out query engine

pub mod config;
pub mod error;
pub mod service;

pub use tracebox_core as core;
pub use tracebox_crypto as crypto;
pub use tracebox_store as store;

pub use config::{BackendConfig, ServiceConfig, DB_PATH_ENV};
pub use error::{Result, ServiceError};
pub use service::{parse_since, Method, QueryResponse, ReportService, Request, Response, OK_BODY};

pub use tracebox_core::{pack_vector, prefix, unpack_vector, BucketKey, HashedPk, PrefixWidth, Report};
pub use tracebox_crypto::{ContactBook, ContactPublicKey, CryptoError, KeyPair, Memo, Rendezvous};
pub use tracebox_store::{Backend, PartialQueryFailure, StoreError, WriteOutcome};
