//! In-memory quarantine queue
//!
//! Bounded; when full the oldest closed record is evicted before any
//! pending one.

use std::collections::VecDeque;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::logic::error::{ShieldError, ShieldResult};
use super::types::{QuarantineRecord, QuarantineStats, QuarantineStore, ReviewStatus, ReviewVerdict};

pub struct MemoryQuarantineStore {
    records: RwLock<VecDeque<QuarantineRecord>>,
    max_records: usize,
}

impl MemoryQuarantineStore {
    pub fn new(max_records: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            max_records: max_records.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl QuarantineStore for MemoryQuarantineStore {
    fn insert(&self, record: QuarantineRecord) -> ShieldResult<bool> {
        let mut records = self.records.write();
        if records.len() >= self.max_records {
            let victim = match records.iter().position(|r| !r.is_pending()) {
                Some(pos) => Some(pos),
                None if record.is_pending() => Some(0),
                None => None,
            };
            match victim.and_then(|pos| records.remove(pos)) {
                Some(evicted) => {
                    log::debug!("Quarantine full, evicted {} record {}", evicted.review_status, evicted.id)
                }
                None => {
                    log::debug!("Quarantine full of pending records, dropped {} record {}", record.review_status, record.id);
                    return Ok(false);
                }
            }
        }
        records.push_back(record);
        Ok(true)
    }

    fn get(&self, id: Uuid) -> ShieldResult<Option<QuarantineRecord>> {
        Ok(self.records.read().iter().find(|r| r.id == id).cloned())
    }

    fn list(&self, status: Option<ReviewStatus>, limit: usize) -> ShieldResult<Vec<QuarantineRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .rev()
            .filter(|r| status.map_or(true, |s| r.review_status == s))
            .take(limit)
            .cloned()
            .collect())
    }

    fn review(
        &self,
        id: Uuid,
        verdict: ReviewVerdict,
        reviewer: &str,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> ShieldResult<QuarantineRecord> {
        let mut records = self.records.write();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| ShieldError::Input(format!("unknown quarantine record {}", id)))?;
        record.apply_review(verdict, reviewer, notes, now)?;
        Ok(record.clone())
    }

    fn expire(&self, now: DateTime<Utc>) -> ShieldResult<Vec<QuarantineRecord>> {
        let mut records = self.records.write();
        let mut expired = Vec::new();
        for record in records.iter_mut().filter(|r| r.is_expired(now)) {
            record.mark_expired(now);
            expired.push(record.clone());
        }
        Ok(expired)
    }

    fn stats(&self) -> ShieldResult<QuarantineStats> {
        let mut stats = QuarantineStats::default();
        for record in self.records.read().iter() {
            stats.add(record.review_status, 1);
        }
        Ok(stats)
    }
}
