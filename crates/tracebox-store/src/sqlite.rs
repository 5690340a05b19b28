//! SQLite implementation of the Backend trait.
//!
//! The relational layout: one row per full hash with the bucket prefix and
//! ingestion time as indexed columns. Uses rusqlite with bundled SQLite,
//! wrapped in async via `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};

use tracebox_core::{BucketKey, HashedPk, PrefixWidth, Report};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{Backend, StoredReport, TimeWindow, SYNC_PARTITIONS};

const UPSERT_REPORT: &str = "INSERT INTO reports (hashed_pk, encoded_msg, report_ts, bucket_prefix)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT(hashed_pk) DO UPDATE SET
         encoded_msg = excluded.encoded_msg,
         report_ts = excluded.report_ts,
         bucket_prefix = excluded.bucket_prefix";

/// SQLite-based backend.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
    width: PrefixWidth,
}

impl SqliteBackend {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed. A database created
    /// at another prefix width is refused.
    pub fn open(path: impl AsRef<Path>, width: PrefixWidth) -> Result<Self> {
        Self::init(Connection::open(path)?, width)
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory(width: PrefixWidth) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, width)
    }

    fn init(mut conn: Connection, width: PrefixWidth) -> Result<Self> {
        migration::migrate(&mut conn)?;
        migration::check_prefix_width(&conn, width)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            width,
        })
    }

    /// Run `f` on the connection from the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| StoreError::Unavailable(format!("mutex poisoned: {}", e)))
}

/// Run a `SELECT hashed_pk, encoded_msg` statement and decode its rows.
fn select_reports(conn: &Connection, sql: &str, values: Vec<Value>) -> Result<Vec<Report>> {
    let mut stmt = conn
        .prepare_cached(sql)
        .map_err(|e| StoreError::Unavailable(format!("prepare failed: {}", e)))?;

    let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
        Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (hashed_pk, encoded_msg) = row?;
        let hashed_pk = HashedPk::try_from(hashed_pk.as_slice())
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;
        out.push(Report::new(hashed_pk, encoded_msg));
    }
    Ok(out)
}

#[async_trait]
impl Backend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn prefix_width(&self) -> Option<PrefixWidth> {
        Some(self.width)
    }

    async fn write_rows(&self, rows: Vec<StoredReport>) -> Result<Vec<Result<()>>> {
        self.blocking(move |conn| {
            // A statement that cannot be prepared fails the whole batch.
            let mut stmt = conn
                .prepare_cached(UPSERT_REPORT)
                .map_err(|e| StoreError::Unavailable(format!("prepare failed: {}", e)))?;

            let results: Vec<Result<()>> = rows
                .iter()
                .map(|row| {
                    stmt.execute(params![
                        row.report.hashed_pk.as_bytes().as_slice(),
                        row.report.encoded_msg.as_ref(),
                        row.ingested_at,
                        row.bucket.as_bytes(),
                    ])
                    .map(|_| ())
                    .map_err(StoreError::from)
                })
                .collect();
            Ok(results)
        })
        .await
    }

    async fn scan_buckets(&self, buckets: &[BucketKey], window: TimeWindow) -> Result<Vec<Report>> {
        if buckets.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; buckets.len()].join(", ");
        let sql = format!(
            "SELECT hashed_pk, encoded_msg FROM reports
             WHERE report_ts >= ? AND report_ts < ? AND bucket_prefix IN ({})",
            placeholders
        );

        let mut values = Vec::with_capacity(buckets.len() + 2);
        values.push(Value::Integer(window.since));
        values.push(Value::Integer(window.until));
        values.extend(buckets.iter().map(|b| Value::Blob(b.as_bytes().to_vec())));

        self.blocking(move |conn| select_reports(conn, &sql, values))
            .await
    }

    async fn scan_partition(&self, nibble: u8, window: TimeWindow) -> Result<Vec<Report>> {
        if nibble >= SYNC_PARTITIONS {
            return Err(StoreError::InvalidData(format!(
                "partition {} is not a hex digit",
                nibble
            )));
        }

        // Blobs compare bytewise, so a leading hex digit is a byte range.
        let low = Value::Blob(vec![nibble << 4]);
        let high = if nibble + 1 < SYNC_PARTITIONS {
            Value::Blob(vec![(nibble + 1) << 4])
        } else {
            Value::Null
        };

        let values = vec![
            Value::Integer(window.since),
            Value::Integer(window.until),
            low,
            high,
        ];

        self.blocking(move |conn| {
            select_reports(
                conn,
                "SELECT hashed_pk, encoded_msg FROM reports
                 WHERE report_ts >= ?1 AND report_ts < ?2
                   AND bucket_prefix >= ?3 AND (?4 IS NULL OR bucket_prefix < ?4)",
                values,
            )
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(seed: u8, ts: i64, width: PrefixWidth) -> StoredReport {
        let report = Report::new(HashedPk::of(&[seed]), vec![seed; 8]);
        StoredReport {
            bucket: report.bucket(width),
            report,
            ingested_at: ts,
        }
    }

    #[tokio::test]
    async fn test_write_and_scan() {
        let backend = SqliteBackend::open_memory(PrefixWidth::default()).unwrap();
        let rows: Vec<_> = (0..5).map(|i| stored(i, 100 + i as i64, PrefixWidth::default())).collect();
        let buckets: Vec<_> = rows.iter().map(|r| r.bucket).collect();

        let results = backend.write_rows(rows.clone()).await.unwrap();
        assert!(results.iter().all(|r| r.is_ok()));

        let all = backend
            .scan_buckets(&buckets, TimeWindow::new(0, 1000))
            .await
            .unwrap();
        assert_eq!(all.len(), 5);

        // Only rows ingested at 103 and 104.
        let recent = backend
            .scan_buckets(&buckets, TimeWindow::new(103, 1000))
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_replaces_row() {
        let backend = SqliteBackend::open_memory(PrefixWidth::default()).unwrap();
        let first = stored(9, 10, PrefixWidth::default());
        let mut second = first.clone();
        second.report = Report::new(first.report.hashed_pk, b"replacement".to_vec());
        second.ingested_at = 20;

        backend.write_rows(vec![first.clone()]).await.unwrap();
        backend.write_rows(vec![second.clone()]).await.unwrap();

        let found = backend
            .scan_buckets(&[first.bucket], TimeWindow::new(0, 100))
            .await
            .unwrap();
        assert_eq!(found, vec![second.report]);

        // The old timestamp no longer matches.
        let stale = backend
            .scan_buckets(&[first.bucket], TimeWindow::new(0, 15))
            .await
            .unwrap();
        assert!(stale.is_empty());
    }

    #[tokio::test]
    async fn test_18_bit_buckets() {
        let width = PrefixWidth::BITS_18;
        let backend = SqliteBackend::open_memory(width).unwrap();
        let row = stored(3, 50, width);
        let bucket = row.bucket;
        backend.write_rows(vec![row]).await.unwrap();

        assert_eq!(bucket.as_bytes().len(), 3);
        let found = backend
            .scan_buckets(&[bucket], TimeWindow::new(50, 51))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_partitions_cover_everything_once() {
        let backend = SqliteBackend::open_memory(PrefixWidth::default()).unwrap();
        let rows: Vec<_> = (0..48).map(|i| stored(i, 1, PrefixWidth::default())).collect();
        backend.write_rows(rows).await.unwrap();

        let mut total = 0;
        for nibble in 0..SYNC_PARTITIONS {
            let part = backend
                .scan_partition(nibble, TimeWindow::new(0, 2))
                .await
                .unwrap();
            assert!(part
                .iter()
                .all(|r| r.hashed_pk.as_bytes()[0] >> 4 == nibble));
            total += part.len();
        }
        assert_eq!(total, 48);
    }

    #[tokio::test]
    async fn test_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.db");
        let row = stored(1, 7, PrefixWidth::default());
        let bucket = row.bucket;

        {
            let backend = SqliteBackend::open(&path, PrefixWidth::default()).unwrap();
            backend.write_rows(vec![row.clone()]).await.unwrap();
        }

        let backend = SqliteBackend::open(&path, PrefixWidth::default()).unwrap();
        let found = backend
            .scan_buckets(&[bucket], TimeWindow::new(0, 10))
            .await
            .unwrap();
        assert_eq!(found, vec![row.report]);

        assert_eq!(backend.prefix_width(), Some(PrefixWidth::default()));
        assert!(matches!(
            SqliteBackend::open(&path, PrefixWidth::BITS_18),
            Err(StoreError::InvalidData(_))
        ));
    }
}
