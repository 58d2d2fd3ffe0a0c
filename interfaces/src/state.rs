//! Processed-entry ledger.
//!
//! A single SQLite file that remembers every entry the publisher has dealt
//! with. Each `record` commits its own transaction, so the file on disk always
//! reflects every call that returned `Ok`. The pool holds one connection,
//! which keeps this process a single writer; SQLite's file lock keeps a
//! second process out while a write is in progress.

use crate::defs::EntryIdentifier;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS processed_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        guid TEXT UNIQUE NOT NULL,
        status TEXT NOT NULL,
        post_id INTEGER,
        feed_url TEXT,
        title TEXT,
        error TEXT,
        processed_at TEXT NOT NULL
    )
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Published,
    Failed,
    Skipped,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Published => "published",
            EntryStatus::Failed => "failed",
            EntryStatus::Skipped => "skipped",
        }
    }

    /// A published entry can never be re-recorded with another status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryStatus::Published)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "published" => Ok(EntryStatus::Published),
            "failed" => Ok(EntryStatus::Failed),
            "skipped" => Ok(EntryStatus::Skipped),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedEntryRecord {
    pub identifier: String,
    pub status: EntryStatus,
    pub processed_at: DateTime<Utc>,
    pub post_id: Option<u64>,
    pub feed_url: Option<String>,
    pub title: Option<String>,
    pub error: Option<String>,
}

impl ProcessedEntryRecord {
    fn new(identifier: &EntryIdentifier, status: EntryStatus, processed_at: DateTime<Utc>) -> Self {
        Self {
            identifier: identifier.as_str().to_string(),
            status,
            processed_at,
            post_id: None,
            feed_url: None,
            title: None,
            error: None,
        }
    }

    pub fn published(identifier: &EntryIdentifier, post_id: u64, processed_at: DateTime<Utc>) -> Self {
        let mut record = Self::new(identifier, EntryStatus::Published, processed_at);
        record.post_id = Some(post_id);
        record
    }

    pub fn failed(identifier: &EntryIdentifier, error: impl Into<String>, processed_at: DateTime<Utc>) -> Self {
        let mut record = Self::new(identifier, EntryStatus::Failed, processed_at);
        record.error = Some(error.into());
        record
    }

    pub fn skipped(identifier: &EntryIdentifier, processed_at: DateTime<Utc>) -> Self {
        Self::new(identifier, EntryStatus::Skipped, processed_at)
    }

    pub fn with_source(mut self, feed_url: impl Into<String>, title: impl Into<String>) -> Self {
        self.feed_url = Some(feed_url.into());
        self.title = Some(title.into());
        self
    }

    fn from_row(row: &SqliteRow) -> Result<Self, String> {
        let read = |e: sqlx::Error| e.to_string();
        let status: String = row.try_get("status").map_err(read)?;
        let post_id: Option<i64> = row.try_get("post_id").map_err(read)?;

        Ok(Self {
            identifier: row.try_get("guid").map_err(read)?,
            status: status.parse()?,
            processed_at: row.try_get("processed_at").map_err(read)?,
            post_id: post_id.map(|id| id as u64),
            feed_url: row.try_get("feed_url").map_err(read)?,
            title: row.try_get("title").map_err(read)?,
            error: row.try_get("error").map_err(read)?,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger unavailable at {path}: {source}")]
    Unavailable {
        path: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("ledger record for {identifier} is unreadable: {reason}")]
    Corrupt { identifier: String, reason: String },

    #[error("entry {identifier} is already published; refusing to record it as {attempted}")]
    TerminalState {
        identifier: String,
        attempted: EntryStatus,
    },
}

impl LedgerError {
    /// Errors after which dedup can no longer be trusted for this run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LedgerError::TerminalState { .. })
    }
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

fn unavailable(path: &Path, source: sqlx::Error) -> LedgerError {
    LedgerError::Unavailable {
        path: path.display().to_string(),
        source,
    }
}

/// Durable set of processed entry identifiers.
pub struct Ledger {
    pool: SqlitePool,
    path: PathBuf,
}

impl Ledger {
    /// Open (or create) the ledger file and make sure it is readable.
    pub async fn load(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();

        // Rollback journal keeps the ledger a single file that can be cached between runs
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| unavailable(&path, e))?;

        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| unavailable(&path, e))?;

        let ledger = Self { pool, path };
        let count = ledger.count().await?;
        info!("Ledger loaded from {} ({} processed entries)", ledger.path.display(), count);

        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if any record exists for `id`, whatever its status.
    pub async fn has(&self, id: &EntryIdentifier) -> LedgerResult<bool> {
        let row: Option<i64> = sqlx::query_scalar("SELECT 1 FROM processed_entries WHERE guid = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| unavailable(&self.path, e))?;

        Ok(row.is_some())
    }

    pub async fn is_published(&self, id: &EntryIdentifier) -> LedgerResult<bool> {
        Ok(matches!(
            self.get(id).await?,
            Some(ProcessedEntryRecord { status: EntryStatus::Published, .. })
        ))
    }

    pub async fn get(&self, id: &EntryIdentifier) -> LedgerResult<Option<ProcessedEntryRecord>> {
        let row = sqlx::query(
            "SELECT guid, status, post_id, feed_url, title, error, processed_at FROM processed_entries WHERE guid = ?1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unavailable(&self.path, e))?;

        match row {
            Some(row) => ProcessedEntryRecord::from_row(&row)
                .map(Some)
                .map_err(|reason| LedgerError::Corrupt {
                    identifier: id.as_str().to_string(),
                    reason,
                }),
            None => Ok(None),
        }
    }

    pub async fn post_id_for(&self, id: &EntryIdentifier) -> LedgerResult<Option<u64>> {
        Ok(self.get(id).await?.and_then(|record| record.post_id))
    }

    pub async fn count(&self) -> LedgerResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processed_entries")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| unavailable(&self.path, e))?;

        Ok(count as u64)
    }

    /// Insert a record, checking the existing one first within the same transaction.
    ///
    /// Same status again is a no-op. A published record is never overwritten;
    /// a failed or skipped one is superseded by the new outcome.
    pub async fn record(&self, record: ProcessedEntryRecord) -> LedgerResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| unavailable(&self.path, e))?;

        let existing: Option<String> = sqlx::query_scalar("SELECT status FROM processed_entries WHERE guid = ?1")
            .bind(&record.identifier)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| unavailable(&self.path, e))?;

        let existing = match existing {
            Some(status) => Some(status.parse::<EntryStatus>().map_err(|reason| LedgerError::Corrupt {
                identifier: record.identifier.clone(),
                reason,
            })?),
            None => None,
        };

        match existing {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO processed_entries (guid, status, post_id, feed_url, title, error, processed_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                )
                .bind(&record.identifier)
                .bind(record.status.as_str())
                .bind(record.post_id.map(|id| id as i64))
                .bind(&record.feed_url)
                .bind(&record.title)
                .bind(&record.error)
                .bind(record.processed_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| unavailable(&self.path, e))?;

                debug!("Recorded {} as {}", record.identifier, record.status);
            }
            Some(status) if status == record.status => {
                debug!("{} already recorded as {}", record.identifier, status);
            }
            Some(status) if status.is_terminal() => {
                warn!(
                    "Refusing to record {} as {}: already {}",
                    record.identifier, record.status, status
                );
                return Err(LedgerError::TerminalState {
                    identifier: record.identifier,
                    attempted: record.status,
                });
            }
            Some(status) => {
                sqlx::query(
                    r#"
                    UPDATE processed_entries
                    SET status = ?2, post_id = ?3, feed_url = ?4, title = ?5, error = ?6, processed_at = ?7
                    WHERE guid = ?1
                    "#,
                )
                .bind(&record.identifier)
                .bind(record.status.as_str())
                .bind(record.post_id.map(|id| id as i64))
                .bind(&record.feed_url)
                .bind(&record.title)
                .bind(&record.error)
                .bind(record.processed_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| unavailable(&self.path, e))?;

                info!("Superseded {} record for {} with {}", status, record.identifier, record.status);
            }
        }

        tx.commit().await.map_err(|e| unavailable(&self.path, e))?;
        Ok(())
    }

    /// Release the backing store. Every successful `record` is already on disk.
    pub async fn persist(self) -> LedgerResult<()> {
        let count = self.count().await?;
        self.close().await;
        info!("Ledger closed at {} ({} processed entries)", self.path.display(), count);
        Ok(())
    }

    /// Close the connection without giving up the handle, e.g. from a shutdown
    /// path that only holds a shared reference. Later calls fail with `Unavailable`.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}
