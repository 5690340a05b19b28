//! Database schema migrations for SQLite.
//!
//! Each migration is a SQL batch that moves the schema from version N to
//! N+1. Applied versions are recorded in `schema_migrations`.

use rusqlite::{Connection, OptionalExtension};

use tracebox_core::PrefixWidth;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// Idempotent: safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database is at schema version {}, this build knows {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, crate::now_secs()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(version = CURRENT_VERSION, "schema migrated");
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: the relational report table.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per full hash; a rewrite replaces the row.
        CREATE TABLE reports (
            hashed_pk BLOB PRIMARY KEY,      -- 32 bytes, SHA-256 of the recipient key
            encoded_msg BLOB NOT NULL,       -- nonce || ciphertext || tag
            report_ts INTEGER NOT NULL,      -- ingestion time (Unix seconds)
            bucket_prefix BLOB NOT NULL      -- ceil(W/8) bytes, zero-padded
        );

        CREATE INDEX idx_reports_bucket_ts ON reports(bucket_prefix, report_ts);
        CREATE INDEX idx_reports_ts ON reports(report_ts);

        -- Store-wide settings fixed at creation time.
        CREATE TABLE store_meta (
            key TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        );
        "#,
    )?;

    Ok(())
}

/// Record the prefix width on first use and refuse to reopen the store at a
/// different one: stored bucket prefixes are only meaningful at the width
/// they were written with.
pub fn check_prefix_width(conn: &Connection, width: PrefixWidth) -> Result<()> {
    let stored: Option<u32> = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = 'prefix_bits'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match stored {
        Some(bits) if bits == width.bits() => Ok(()),
        Some(bits) => Err(StoreError::InvalidData(format!(
            "store was created with {}-bit prefixes, opened with {}",
            bits,
            width.bits()
        ))),
        None => {
            conn.execute(
                "INSERT INTO store_meta (key, value) VALUES ('prefix_bits', ?1)",
                [width.bits()],
            )?;
            Ok(())
        }
    }
}
