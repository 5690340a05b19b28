//! In-memory implementation of the Backend trait.
//!
//! Laid out like a wide-column table: one row per bucket, keyed by the hex
//! form of the bucket prefix, with one cell per full hash stamped with its
//! ingestion time. Scans read whole rows and filter cells by timestamp.
//! Nothing is persisted.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;

use tracebox_core::{BucketKey, HashedPk, Report};

use crate::error::{Result, StoreError};
use crate::traits::{Backend, StoredReport, TimeWindow};

#[derive(Debug, Clone)]
struct Cell {
    encoded_msg: Bytes,
    ingested_at: i64,
}

type Row = BTreeMap<HashedPk, Cell>;

/// In-memory backend.
///
/// All data is lost when the backend is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryBackend {
    rows: RwLock<BTreeMap<String, Row>>,
}

impl MemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored reports.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.values().map(BTreeMap::len).sum())
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Row>>> {
        self.rows
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Row>>> {
        self.rows
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }
}

fn collect_row(row: &Row, window: TimeWindow, out: &mut Vec<Report>) {
    out.extend(
        row.iter()
            .filter(|(_, cell)| window.contains(cell.ingested_at))
            .map(|(hashed_pk, cell)| Report::new(*hashed_pk, cell.encoded_msg.clone())),
    );
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn write_rows(&self, rows: Vec<StoredReport>) -> Result<Vec<Result<()>>> {
        let mut table = self.write()?;

        let results = rows
            .into_iter()
            .map(|row| {
                table.entry(row.bucket.to_hex()).or_default().insert(
                    row.report.hashed_pk,
                    Cell {
                        encoded_msg: row.report.encoded_msg,
                        ingested_at: row.ingested_at,
                    },
                );
                Ok(())
            })
            .collect();

        Ok(results)
    }

    async fn scan_buckets(&self, buckets: &[BucketKey], window: TimeWindow) -> Result<Vec<Report>> {
        let table = self.read()?;

        let mut out = Vec::new();
        for bucket in buckets {
            if let Some(row) = table.get(&bucket.to_hex()) {
                collect_row(row, window, &mut out);
            }
        }
        Ok(out)
    }

    async fn scan_partition(&self, nibble: u8, window: TimeWindow) -> Result<Vec<Report>> {
        let digit = char::from_digit(u32::from(nibble), 16).ok_or_else(|| {
            StoreError::InvalidData(format!("partition {} is not a hex digit", nibble))
        })?;
        let table = self.read()?;

        let mut out = Vec::new();
        for (_, row) in table.iter().filter(|(key, _)| key.starts_with(digit)) {
            collect_row(row, window, &mut out);
        }
        Ok(out)
    }
}
