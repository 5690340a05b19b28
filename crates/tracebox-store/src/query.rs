//! The report store: batch writes and sharded, bounded-concurrency scans.
//!
//! A query decodes the packed vector into bucket keys, splits them into
//! shards of `shard_size`, and scans each shard on its own task. At most
//! `max_concurrency` scans run at once. Shard results are merged only after
//! every task has finished; a failed shard does not discard the others.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use tracebox_core::{unpack_vector, BucketKey, HashedPk, PrefixWidth, Report};

use crate::error::{PartialQueryFailure, Result, ShardFailure, StoreError};
use crate::traits::{Backend, StoredReport, TimeWindow, SYNC_PARTITIONS};

/// Largest shard a single scan may bind. SQLite allows 32766 bound
/// parameters and a bucket scan adds two for the time window.
pub const MAX_SHARD_SIZE: usize = 32_000;

/// Store-level knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Bucket prefix width `W`.
    pub width: PrefixWidth,
    /// Bucket keys per scan shard.
    pub shard_size: usize,
    /// Maximum shards scanned at once.
    pub max_concurrency: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            width: PrefixWidth::default(),
            shard_size: 1000,
            max_concurrency: 10,
        }
    }
}

/// How a rejected row failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFailure {
    /// The row will fail again if resent unchanged.
    Rejected,
    /// The backend was busy; resending may succeed.
    Retryable,
}

/// A row of a batch that was not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// Position in the submitted batch.
    pub index: usize,
    /// The row's key, if it decoded.
    pub hashed_pk: Option<HashedPk>,
    /// Failure class.
    pub failure: RowFailure,
    /// Description.
    pub message: String,
}

impl RowError {
    /// Classify `error` for the row at `index`.
    pub fn new(index: usize, hashed_pk: Option<HashedPk>, error: &StoreError) -> Self {
        Self {
            index,
            hashed_pk,
            failure: if error.is_retryable() {
                RowFailure::Retryable
            } else {
                RowFailure::Rejected
            },
            message: error.to_string(),
        }
    }
}

/// Per-row result of a batch write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Rows stored.
    pub accepted: usize,
    /// Rows not stored.
    pub rejected: Vec<RowError>,
}

impl WriteOutcome {
    /// Whether every row was stored.
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Rows retrieved by a query, plus the shards that failed, if any.
///
/// Result order is unspecified.
#[derive(Debug, Default)]
pub struct QueryOutcome {
    /// Rows from every shard that succeeded.
    pub reports: Vec<Report>,
    /// Set when at least one shard failed.
    pub failure: Option<PartialQueryFailure>,
}

impl QueryOutcome {
    /// Whether every shard succeeded.
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    /// Drop the partial rows and turn a shard failure into an error.
    pub fn into_result(self) -> Result<Vec<Report>> {
        match self.failure {
            None => Ok(self.reports),
            Some(failure) => Err(StoreError::PartialQuery(failure)),
        }
    }
}

/// Current Unix time in seconds.
pub fn now_secs() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// The report store over a backend.
pub struct ReportStore<B> {
    backend: Arc<B>,
    config: StoreConfig,
}

impl<B> Clone for ReportStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            config: self.config,
        }
    }
}

impl<B: Backend> ReportStore<B> {
    /// Create a store with default configuration.
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, StoreConfig::default())
    }

    /// Create a store with custom configuration.
    ///
    /// Zero shard size or concurrency is raised to one, and shard size is
    /// capped at [`MAX_SHARD_SIZE`].
    pub fn with_config(backend: B, config: StoreConfig) -> Self {
        let config = StoreConfig {
            shard_size: config.shard_size.clamp(1, MAX_SHARD_SIZE),
            max_concurrency: config.max_concurrency.max(1),
            ..config
        };
        Self {
            backend: Arc::new(backend),
            config,
        }
    }

    /// Create a store, refusing a backend pinned to another bucket width.
    pub fn open(backend: B, config: StoreConfig) -> Result<Self> {
        match backend.prefix_width() {
            Some(pinned) if pinned != config.width => Err(StoreError::InvalidData(format!(
                "{} backend holds {}-bit buckets, store is configured for {}",
                backend.name(),
                pinned.bits(),
                config.width.bits()
            ))),
            _ => Ok(Self::with_config(backend, config)),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Get the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Write a batch stamped with the current time.
    pub async fn write_batch(&self, reports: Vec<Report>) -> Result<WriteOutcome> {
        self.write_batch_at(reports, now_secs()).await
    }

    /// Write a batch stamped with `ingested_at`.
    ///
    /// Each row is upserted independently. Returns `Err` only when the
    /// backend could not attempt the batch at all.
    pub async fn write_batch_at(&self, reports: Vec<Report>, ingested_at: i64) -> Result<WriteOutcome> {
        let mut outcome = WriteOutcome::default();
        let mut indices = Vec::with_capacity(reports.len());
        let mut rows = Vec::with_capacity(reports.len());

        for (index, report) in reports.into_iter().enumerate() {
            if report.encoded_msg.is_empty() {
                outcome.rejected.push(RowError::new(
                    index,
                    Some(report.hashed_pk),
                    &StoreError::Rejected("empty encoded message".into()),
                ));
                continue;
            }
            indices.push(index);
            rows.push(StoredReport {
                bucket: report.bucket(self.config.width),
                report,
                ingested_at,
            });
        }

        let keys: Vec<HashedPk> = rows.iter().map(|r| r.report.hashed_pk).collect();
        let results = self.backend.write_rows(rows).await.map_err(|e| {
            warn!(backend = self.backend.name(), error = %e, "batch write not attempted");
            e
        })?;
        if results.len() != keys.len() {
            return Err(StoreError::InvalidData(format!(
                "backend {} returned {} results for {} rows",
                self.backend.name(),
                results.len(),
                keys.len()
            )));
        }

        for ((index, hashed_pk), result) in indices.into_iter().zip(keys).zip(results) {
            match result {
                Ok(()) => outcome.accepted += 1,
                Err(e) => outcome.rejected.push(RowError::new(index, Some(hashed_pk), &e)),
            }
        }
        outcome.rejected.sort_by_key(|r| r.index);

        info!(
            backend = self.backend.name(),
            accepted = outcome.accepted,
            rejected = outcome.rejected.len(),
            "report batch written"
        );
        Ok(outcome)
    }

    /// Reports in the vector's buckets ingested in `[since, now]`.
    pub async fn query(&self, vector: &[u8], since: i64) -> Result<QueryOutcome> {
        let window = TimeWindow::new(since, now_secs() + 1);
        self.query_window(vector, window).await
    }

    /// Reports in the vector's buckets ingested within `window`.
    ///
    /// Fails if the vector does not decode or if every shard fails. Other
    /// shard failures are reported in [`QueryOutcome::failure`] next to the
    /// rows that were read.
    pub async fn query_window(&self, vector: &[u8], window: TimeWindow) -> Result<QueryOutcome> {
        let mut keys = unpack_vector(vector, self.config.width)?;
        let decoded = keys.len();
        keys.sort();
        keys.dedup();

        let shards: Vec<Vec<BucketKey>> = keys
            .chunks(self.config.shard_size)
            .map(<[BucketKey]>::to_vec)
            .collect();
        debug!(
            prefixes = decoded,
            distinct = keys.len(),
            shards = shards.len(),
            "bucket query decoded"
        );

        self.fan_out(shards, move |backend, shard| async move {
            backend.scan_buckets(&shard, window).await
        })
        .await
    }

    /// Every report ingested in `[since, now]`, regardless of bucket.
    ///
    /// Scans one partition per leading hex digit of the bucket row key.
    pub async fn sync(&self, since: i64) -> Result<QueryOutcome> {
        let window = TimeWindow::new(since, now_secs() + 1);
        self.sync_window(window).await
    }

    /// Every report ingested within `window`.
    pub async fn sync_window(&self, window: TimeWindow) -> Result<QueryOutcome> {
        let partitions: Vec<u8> = (0..SYNC_PARTITIONS).collect();
        self.fan_out(partitions, move |backend, nibble| async move {
            backend.scan_partition(nibble, window).await
        })
        .await
    }

    async fn fan_out<J, F, Fut>(&self, jobs: Vec<J>, scan: F) -> Result<QueryOutcome>
    where
        J: Send + 'static,
        F: Fn(Arc<B>, J) -> Fut,
        Fut: Future<Output = Result<Vec<Report>>> + Send + 'static,
    {
        let total_shards = jobs.len();
        let permits = Arc::new(Semaphore::new(self.config.max_concurrency));

        // Dropping the set aborts every scan still queued or running.
        let mut tasks = JoinSet::new();
        for (shard, job) in jobs.into_iter().enumerate() {
            let permits = permits.clone();
            let task = scan(self.backend.clone(), job);
            tasks.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => task.await,
                    Err(e) => Err(StoreError::Unavailable(e.to_string())),
                };
                (shard, result)
            });
        }

        let mut outcome = QueryOutcome::default();
        let mut failures = Vec::new();
        let mut finished = vec![false; total_shards];
        let mut lost = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((shard, Ok(mut reports))) => {
                    finished[shard] = true;
                    outcome.reports.append(&mut reports);
                }
                Ok((shard, Err(e))) => {
                    finished[shard] = true;
                    failures.push(ShardFailure {
                        shard,
                        message: e.to_string(),
                    });
                }
                Err(e) => lost.push(format!("scan task failed: {}", e)),
            }
        }
        // A panicked task cannot report its shard; it is one of the unfinished.
        let unfinished = finished.iter().enumerate().filter(|(_, done)| !**done);
        for ((shard, _), message) in unfinished.zip(lost) {
            failures.push(ShardFailure { shard, message });
        }
        failures.sort_by_key(|f| f.shard);
        for failure in &failures {
            warn!(
                backend = self.backend.name(),
                shard = failure.shard,
                error = %failure.message,
                "shard scan failed"
            );
        }

        if total_shards > 0 && failures.len() == total_shards {
            return Err(StoreError::Unavailable(format!(
                "all {} shards failed, first: {}",
                total_shards, failures[0].message
            )));
        }
        if !failures.is_empty() {
            outcome.failure = Some(PartialQueryFailure {
                total_shards,
                failures,
            });
        }
        debug!(
            shards = total_shards,
            rows = outcome.reports.len(),
            complete = outcome.is_complete(),
            "scan merged"
        );
        Ok(outcome)
    }
}
