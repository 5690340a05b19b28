//! Backend trait: the storage capability every report store implements.
//!
//! A backend persists `(bucket, hashed key, ciphertext, ingestion time)`
//! rows and answers bucket + time-window scans. Sharding, concurrency limits
//! and merging live above it in [`ReportStore`](crate::ReportStore).

use async_trait::async_trait;

use tracebox_core::{BucketKey, PrefixWidth, Report};

use crate::error::Result;

/// Number of partitions a full sync scan is split into: one per leading
/// hex digit of the bucket row key.
pub const SYNC_PARTITIONS: u8 = 16;

/// Half-open ingestion-time window `[since, until)` in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Inclusive lower bound.
    pub since: i64,
    /// Exclusive upper bound.
    pub until: i64,
}

impl TimeWindow {
    /// Create a window.
    pub const fn new(since: i64, until: i64) -> Self {
        Self { since, until }
    }

    /// Whether `ts` falls inside the window.
    pub const fn contains(&self, ts: i64) -> bool {
        self.since <= ts && ts < self.until
    }
}

/// A report tagged with everything a backend needs to file it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredReport {
    /// The report itself.
    pub report: Report,
    /// Its bucket at the store's configured width.
    pub bucket: BucketKey,
    /// Ingestion time (Unix seconds).
    pub ingested_at: i64,
}

/// The storage capability.
///
/// All methods are async to support both blocking (SQLite) and in-process
/// backends. For SQLite, `spawn_blocking` is used internally.
///
/// # Write semantics
///
/// Rows are upserted by full hash: a second write with the same
/// `hashed_pk` replaces the first (last write wins). Rows are independent;
/// there is no batch atomicity.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// The bucket width this backend is pinned to, if it records one.
    fn prefix_width(&self) -> Option<PrefixWidth> {
        None
    }

    /// Upsert each row.
    ///
    /// The outer error means nothing was attempted. Otherwise the returned
    /// vector holds one result per input row, in order.
    async fn write_rows(&self, rows: Vec<StoredReport>) -> Result<Vec<Result<()>>>;

    /// Reports filed under any of `buckets` and ingested within `window`.
    async fn scan_buckets(&self, buckets: &[BucketKey], window: TimeWindow) -> Result<Vec<Report>>;

    /// Reports whose bucket row key starts with hex digit `nibble`
    /// (`0..16`) and ingested within `window`.
    async fn scan_partition(&self, nibble: u8, window: TimeWindow) -> Result<Vec<Report>>;
}

#[async_trait]
impl Backend for Box<dyn Backend> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn prefix_width(&self) -> Option<PrefixWidth> {
        (**self).prefix_width()
    }

    async fn write_rows(&self, rows: Vec<StoredReport>) -> Result<Vec<Result<()>>> {
        (**self).write_rows(rows).await
    }

    async fn scan_buckets(&self, buckets: &[BucketKey], window: TimeWindow) -> Result<Vec<Report>> {
        (**self).scan_buckets(buckets, window).await
    }

    async fn scan_partition(&self, nibble: u8, window: TimeWindow) -> Result<Vec<Report>> {
        (**self).scan_partition(nibble, window).await
    }
}
