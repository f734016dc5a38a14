//! Durable capture log.
//!
//! Every session outcome (accepted photo, retried frame, failed capture or
//! classification, cancellation) lands here as one record, so a stalled
//! "searching for face" device can be diagnosed after the fact. Records are
//! stored as a JSON payload column; the schema only indexes what pruning
//! needs.

use anyhow::{anyhow, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

use crate::now_ms;

/// Session outcomes recorded in the capture log.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaptureOutcome {
    Accepted,
    Retried,
    CaptureFailed,
    ClassifierFailed,
    Cancelled,
}

/// One capture log record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub created_at_ms: u64,
    pub outcome: CaptureOutcome,
    /// Attempt counter at the time of the record (0-based).
    pub attempt: u32,
    pub detail: Option<String>,
    /// Stored photo path, set for accepted records.
    pub photo_path: Option<String>,
    /// Hex SHA-256 of the accepted photo's raw pixels.
    pub content_sha256: Option<String>,
}

impl CaptureRecord {
    pub fn new(outcome: CaptureOutcome, attempt: u32) -> Result<Self> {
        Ok(Self {
            created_at_ms: now_ms()?,
            outcome,
            attempt,
            detail: None,
            photo_path: None,
            content_sha256: None,
        })
    }

    pub fn with_detail(mut self, detail: &str) -> Self {
        self.detail = Some(detail.to_string());
        self
    }

    pub fn with_photo(mut self, path: &str, content_sha256: &str) -> Self {
        self.photo_path = Some(path.to_string());
        self.content_sha256 = Some(content_sha256.to_string());
        self
    }
}

/// Capture log store trait.
pub trait CaptureLogStore: Send {
    fn append(&mut self, record: &CaptureRecord) -> Result<()>;

    /// Most recent records, newest first.
    fn recent(&mut self, limit: usize) -> Result<Vec<CaptureRecord>>;

    /// Drop records older than `retention`. Returns the number pruned.
    fn prune_older_than(&mut self, retention: Duration) -> Result<usize>;
}

// ----------------------------------------------------------------------------
// SQLite store
// ----------------------------------------------------------------------------

pub struct SqliteCaptureLog {
    conn: Connection,
}

impl SqliteCaptureLog {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS capture_log (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              created_at INTEGER NOT NULL,
              payload_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_capture_log_created ON capture_log(created_at);
            "#,
        )?;
        Ok(())
    }
}

impl CaptureLogStore for SqliteCaptureLog {
    fn append(&mut self, record: &CaptureRecord) -> Result<()> {
        let created_at = i64::try_from(record.created_at_ms)
            .map_err(|_| anyhow!("record timestamp exceeds i64 range"))?;
        let payload_json = serde_json::to_string(record)?;
        self.conn.execute(
            "INSERT INTO capture_log(created_at, payload_json) VALUES (?1, ?2)",
            params![created_at, payload_json],
        )?;
        Ok(())
    }

    fn recent(&mut self, limit: usize) -> Result<Vec<CaptureRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload_json FROM capture_log ORDER BY id DESC LIMIT ?1")?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let payload: String = row.get(0)?;
            records.push(serde_json::from_str(&payload)?);
        }
        Ok(records)
    }

    fn prune_older_than(&mut self, retention: Duration) -> Result<usize> {
        let now = now_ms()? as i64;
        let cutoff = now - retention.as_millis() as i64;
        let pruned = self.conn.execute(
            "DELETE FROM capture_log WHERE created_at < ?1",
            params![cutoff],
        )?;
        Ok(pruned)
    }
}

// ----------------------------------------------------------------------------
// In-memory store
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryCaptureLog {
    records: Mutex<Vec<CaptureRecord>>,
}

impl InMemoryCaptureLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records in append order (test helper).
    pub fn all(&self) -> Vec<CaptureRecord> {
        self.records.lock().expect("journal lock poisoned").clone()
    }

    fn append_record(&self, record: &CaptureRecord) {
        self.records
            .lock()
            .expect("journal lock poisoned")
            .push(record.clone());
    }

    fn recent_records(&self, limit: usize) -> Vec<CaptureRecord> {
        let records = self.records.lock().expect("journal lock poisoned");
        records.iter().rev().take(limit).cloned().collect()
    }

    fn prune_records(&self, retention: Duration) -> Result<usize> {
        let cutoff = now_ms()?.saturating_sub(retention.as_millis() as u64);
        let mut records = self.records.lock().expect("journal lock poisoned");
        let before = records.len();
        records.retain(|r| r.created_at_ms >= cutoff);
        Ok(before - records.len())
    }
}

impl CaptureLogStore for InMemoryCaptureLog {
    fn append(&mut self, record: &CaptureRecord) -> Result<()> {
        self.append_record(record);
        Ok(())
    }

    fn recent(&mut self, limit: usize) -> Result<Vec<CaptureRecord>> {
        Ok(self.recent_records(limit))
    }

    fn prune_older_than(&mut self, retention: Duration) -> Result<usize> {
        self.prune_records(retention)
    }
}

/// Shared-handle form, so a test can keep reading the log it handed to a
/// session. State lives behind the inner mutex either way.
impl CaptureLogStore for std::sync::Arc<InMemoryCaptureLog> {
    fn append(&mut self, record: &CaptureRecord) -> Result<()> {
        self.append_record(record);
        Ok(())
    }

    fn recent(&mut self, limit: usize) -> Result<Vec<CaptureRecord>> {
        Ok(self.recent_records(limit))
    }

    fn prune_older_than(&mut self, retention: Duration) -> Result<usize> {
        self.prune_records(retention)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_round_trips_records() {
        let mut store = SqliteCaptureLog::open(":memory:").unwrap();

        let accepted = CaptureRecord::new(CaptureOutcome::Accepted, 3)
            .unwrap()
            .with_photo("/photos/face_1.png", "ab12");
        let retried = CaptureRecord::new(CaptureOutcome::Retried, 1)
            .unwrap()
            .with_detail("soft frame");

        store.append(&accepted).unwrap();
        store.append(&retried).unwrap();

        let recent = store.recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        // Newest first.
        assert_eq!(recent[0].outcome, CaptureOutcome::Retried);
        assert_eq!(recent[0].detail.as_deref(), Some("soft frame"));
        assert_eq!(recent[1].outcome, CaptureOutcome::Accepted);
        assert_eq!(recent[1].photo_path.as_deref(), Some("/photos/face_1.png"));
        assert_eq!(recent[1].content_sha256.as_deref(), Some("ab12"));
    }

    #[test]
    fn sqlite_prunes_old_records() {
        let mut store = SqliteCaptureLog::open(":memory:").unwrap();

        let mut old = CaptureRecord::new(CaptureOutcome::Retried, 0).unwrap();
        old.created_at_ms = 1_000;
        store.append(&old).unwrap();
        store
            .append(&CaptureRecord::new(CaptureOutcome::Accepted, 1).unwrap())
            .unwrap();

        let pruned = store.prune_older_than(Duration::from_secs(3600)).unwrap();
        assert_eq!(pruned, 1);
        let recent = store.recent(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].outcome, CaptureOutcome::Accepted);
    }

    #[test]
    fn in_memory_recent_is_newest_first() {
        let mut store = InMemoryCaptureLog::new();
        store
            .append(&CaptureRecord::new(CaptureOutcome::Retried, 0).unwrap())
            .unwrap();
        store
            .append(&CaptureRecord::new(CaptureOutcome::Accepted, 1).unwrap())
            .unwrap();

        let recent = store.recent(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].outcome, CaptureOutcome::Accepted);
    }
}
