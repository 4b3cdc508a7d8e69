//! SQLite-backed quarantine store
//!
//! One row per record: indexed status/timestamps for filtering plus the full
//! record as JSON. Timestamps are stored as epoch microseconds.

use std::path::Path;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::logic::error::{ShieldError, ShieldResult};
use super::types::{QuarantineRecord, QuarantineStats, QuarantineStore, ReviewStatus, ReviewVerdict};

pub struct SqliteQuarantineStore {
    conn: Mutex<Connection>,
    max_records: usize,
}

impl SqliteQuarantineStore {
    /// Open or create the database at `path` and run migrations
    pub fn open(path: &Path, max_records: usize) -> ShieldResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::with_connection(conn, max_records)
    }

    pub fn in_memory(max_records: usize) -> ShieldResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, max_records)
    }

    fn with_connection(conn: Connection, max_records: usize) -> ShieldResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS quarantine (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_quarantine_status_created ON quarantine(status, created_at);
            CREATE INDEX IF NOT EXISTS idx_quarantine_expires ON quarantine(expires_at);
            "#,
        )?;
        Ok(Self { conn: Mutex::new(conn), max_records: max_records.max(1) })
    }

    fn decode(payload: &str) -> ShieldResult<QuarantineRecord> {
        Ok(serde_json::from_str(payload)?)
    }

    fn write_record(conn: &Connection, record: &QuarantineRecord) -> ShieldResult<()> {
        conn.execute(
            "INSERT OR REPLACE INTO quarantine (id, status, created_at, expires_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id.to_string(),
                record.review_status.as_str(),
                record.created_at.timestamp_micros(),
                record.expires_at.timestamp_micros(),
                serde_json::to_string(record)?,
            ],
        )?;
        Ok(())
    }
}

impl QuarantineStore for SqliteQuarantineStore {
    fn insert(&self, record: QuarantineRecord) -> ShieldResult<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let count: i64 = tx.query_row("SELECT COUNT(*) FROM quarantine", [], |row| row.get(0))?;
        let excess = (count + 1 - self.max_records as i64).max(0);
        if excess > 0 {
            let mut pruned = tx.execute(
                "DELETE FROM quarantine WHERE id IN (
                    SELECT id FROM quarantine WHERE status != ?1 ORDER BY created_at ASC LIMIT ?2
                )",
                params![ReviewStatus::Pending.as_str(), excess],
            )? as i64;
            if pruned < excess {
                if !record.is_pending() {
                    log::debug!("Quarantine full of pending records, dropped {} record {}", record.review_status, record.id);
                    return Ok(false);
                }
                pruned += tx.execute(
                    "DELETE FROM quarantine WHERE id IN (
                        SELECT id FROM quarantine ORDER BY created_at ASC LIMIT ?1
                    )",
                    params![excess - pruned],
                )? as i64;
            }
            log::debug!("Quarantine full, pruned {} oldest records", pruned);
        }

        Self::write_record(&tx, &record)?;
        tx.commit()?;
        Ok(true)
    }

    fn get(&self, id: Uuid) -> ShieldResult<Option<QuarantineRecord>> {
        let conn = self.conn.lock();
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM quarantine WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        payload.as_deref().map(Self::decode).transpose()
    }

    fn list(&self, status: Option<ReviewStatus>, limit: usize) -> ShieldResult<Vec<QuarantineRecord>> {
        let conn = self.conn.lock();
        let limit = limit.min(i64::MAX as usize) as i64;

        let payloads: Vec<String> = match status {
            Some(s) => {
                let mut stmt = conn.prepare(
                    "SELECT payload FROM quarantine WHERE status = ?1 ORDER BY created_at DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![s.as_str(), limit], |row| row.get(0))?;
                rows.collect::<Result<_, _>>()?
            }
            None => {
                let mut stmt = conn.prepare("SELECT payload FROM quarantine ORDER BY created_at DESC LIMIT ?1")?;
                let rows = stmt.query_map(params![limit], |row| row.get(0))?;
                rows.collect::<Result<_, _>>()?
            }
        };

        payloads.iter().map(|p| Self::decode(p)).collect()
    }

    fn review(
        &self,
        id: Uuid,
        verdict: ReviewVerdict,
        reviewer: &str,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> ShieldResult<QuarantineRecord> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let payload: Option<String> = tx
            .query_row(
                "SELECT payload FROM quarantine WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let payload = payload.ok_or_else(|| ShieldError::Input(format!("unknown quarantine record {}", id)))?;

        let mut record = Self::decode(&payload)?;
        record.apply_review(verdict, reviewer, notes, now)?;
        Self::write_record(&tx, &record)?;
        tx.commit()?;
        Ok(record)
    }

    fn expire(&self, now: DateTime<Utc>) -> ShieldResult<Vec<QuarantineRecord>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let payloads: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT payload FROM quarantine WHERE status = ?1 AND expires_at <= ?2",
            )?;
            let rows = stmt.query_map(
                params![ReviewStatus::Pending.as_str(), now.timestamp_micros()],
                |row| row.get(0),
            )?;
            rows.collect::<Result<_, _>>()?
        };

        let mut expired = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let mut record = Self::decode(&payload)?;
            record.mark_expired(now);
            Self::write_record(&tx, &record)?;
            expired.push(record);
        }
        tx.commit()?;
        Ok(expired)
    }

    fn stats(&self) -> ShieldResult<QuarantineStats> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM quarantine GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut stats = QuarantineStats::default();
        for row in rows {
            let (status, count) = row?;
            let Some(status) = ReviewStatus::parse(&status) else {
                log::warn!("Unknown quarantine status '{}' in store", status);
                continue;
            };
            stats.add(status, count.max(0) as usize);
        }
        Ok(stats)
    }
}
