//! # Tracebox Store
//!
//! Durable storage for uploaded reports and the bucket query engine.
//!
//! ## Overview
//!
//! Backends implement the [`Backend`] trait: upsert rows keyed by full hash
//! and scan by bucket and ingestion time. [`ReportStore`] sits on top and
//! owns the protocol: prefix derivation on write, vector decoding, sharding,
//! bounded-concurrency fan-out and merging on read.
//!
//! ## Key Types
//!
//! - [`Backend`] - The async storage capability
//! - [`SqliteBackend`] - Relational layout, one row per full hash
//! - [`MemoryBackend`] - Wide-column layout, one row per bucket
//! - [`ReportStore`] - Write/query/sync over any backend
//! - [`WriteOutcome`] / [`QueryOutcome`] - Per-row and per-shard results
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tracebox_store::{MemoryBackend, ReportStore};
//!
//! async fn example(vector: &[u8], since: i64) {
//!     let store = ReportStore::new(MemoryBackend::new());
//!     let outcome = store.query(vector, since).await.unwrap();
//!     if let Some(failure) = &outcome.failure {
//!         eprintln!("partial result: {failure}");
//!     }
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Last write wins**: a second report with the same full hash replaces
//!   the first, including its timestamp.
//! - **No batch atomicity**: rows of a batch succeed or fail independently.
//! - **Partial results**: a failed shard is reported next to the rows the
//!   other shards returned, never instead of them. The query itself fails
//!   only when no shard succeeds.

pub mod error;
pub mod memory;
pub mod migration;
pub mod query;
pub mod sqlite;
pub mod traits;

pub use error::{PartialQueryFailure, Result, ShardFailure, StoreError};
pub use memory::MemoryBackend;
pub use query::{
    now_secs, QueryOutcome, ReportStore, RowError, RowFailure, StoreConfig, WriteOutcome,
    MAX_SHARD_SIZE,
};
pub use sqlite::SqliteBackend;
pub use traits::{Backend, StoredReport, TimeWindow, SYNC_PARTITIONS};
