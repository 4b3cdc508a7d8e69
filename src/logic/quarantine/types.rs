use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::error::{ShieldError, ShieldResult};
use crate::logic::features::{FeatureSet, SubmissionContext};
use crate::logic::feedback::types::{Label, LabelSource, TrainingExample};
use crate::logic::policy::DecisionResult;

// ============================================================================
// REVIEW STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
    /// Closed without review after `expires_at`
    Expired,
    /// Blocked submission kept for audit; never reviewed, never expired
    Logged,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
            ReviewStatus::Expired => "expired",
            ReviewStatus::Logged => "logged",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReviewStatus::Pending),
            "approved" => Some(ReviewStatus::Approved),
            "rejected" => Some(ReviewStatus::Rejected),
            "expired" => Some(ReviewStatus::Expired),
            "logged" => Some(ReviewStatus::Logged),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reviewer decision on a held submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    /// Legitimate: release it
    Approve,
    /// Not wanted, but not necessarily spam
    Reject,
    Spam,
}

impl ReviewVerdict {
    pub fn status(&self) -> ReviewStatus {
        match self {
            ReviewVerdict::Approve => ReviewStatus::Approved,
            ReviewVerdict::Reject | ReviewVerdict::Spam => ReviewStatus::Rejected,
        }
    }

    pub fn label(&self) -> Label {
        match self {
            ReviewVerdict::Approve => Label::Ham,
            ReviewVerdict::Reject | ReviewVerdict::Spam => Label::Spam,
        }
    }
}

// ============================================================================
// QUARANTINE RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    pub id: Uuid,
    pub decision: DecisionResult,
    pub context: SubmissionContext,
    pub features: FeatureSet,
    pub review_status: ReviewStatus,
    pub reviewed_by: Option<String>,
    pub review_notes: Option<String>,
    pub verdict: Option<ReviewVerdict>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl QuarantineRecord {
    pub fn new(decision: DecisionResult, context: SubmissionContext, features: FeatureSet, expiry: Duration) -> Self {
        let created_at = decision.decided_at;
        Self {
            id: Uuid::new_v4(),
            decision,
            context,
            features,
            review_status: ReviewStatus::Pending,
            reviewed_by: None,
            review_notes: None,
            verdict: None,
            created_at,
            reviewed_at: None,
            expires_at: created_at + expiry,
        }
    }

    /// Audit entry for a blocked submission, closed from the start
    pub fn logged(decision: DecisionResult, context: SubmissionContext, features: FeatureSet) -> Self {
        let mut record = Self::new(decision, context, features, Duration::zero());
        record.review_status = ReviewStatus::Logged;
        record
    }

    pub fn is_pending(&self) -> bool {
        self.review_status == ReviewStatus::Pending
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.expires_at <= now
    }

    /// Close a pending record with a reviewer verdict
    pub fn apply_review(
        &mut self,
        verdict: ReviewVerdict,
        reviewer: &str,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> ShieldResult<()> {
        if !self.is_pending() {
            return Err(ShieldError::Input(format!(
                "quarantine record {} is already {}",
                self.id, self.review_status
            )));
        }
        self.review_status = verdict.status();
        self.verdict = Some(verdict);
        self.reviewed_by = Some(reviewer.to_string());
        self.review_notes = notes.map(str::to_string);
        self.reviewed_at = Some(now);
        Ok(())
    }

    pub fn mark_expired(&mut self, now: DateTime<Utc>) {
        self.review_status = ReviewStatus::Expired;
        self.reviewed_at = Some(now);
    }

    /// Label this record carries once closed; pending records have none
    pub fn to_training_example(&self, now: DateTime<Utc>) -> Option<TrainingExample> {
        let (label, source, confidence) = match self.review_status {
            ReviewStatus::Pending | ReviewStatus::Logged => return None,
            ReviewStatus::Approved | ReviewStatus::Rejected => {
                (self.verdict?.label(), LabelSource::Manual, 1.0)
            }
            ReviewStatus::Expired => (Label::Spam, LabelSource::Automated, self.decision.confidence),
        };
        Some(TrainingExample::new(self.features.clone(), label, source, confidence, now))
    }
}

// ============================================================================
// STATS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuarantineStats {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub expired: usize,
    pub logged: usize,
}

impl QuarantineStats {
    pub fn add(&mut self, status: ReviewStatus, n: usize) {
        self.total += n;
        match status {
            ReviewStatus::Pending => self.pending += n,
            ReviewStatus::Approved => self.approved += n,
            ReviewStatus::Rejected => self.rejected += n,
            ReviewStatus::Expired => self.expired += n,
            ReviewStatus::Logged => self.logged += n,
        }
    }
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Persistence for held submissions. `list` returns newest first.
///
/// Stores are bounded. When full, the oldest closed or logged record goes
/// first; a pending record is only evicted to make room for another pending
/// one, and a logged record is dropped rather than displace a pending one.
pub trait QuarantineStore: Send + Sync {
    /// Returns false when the record was dropped to keep pending ones
    fn insert(&self, record: QuarantineRecord) -> ShieldResult<bool>;

    fn get(&self, id: Uuid) -> ShieldResult<Option<QuarantineRecord>>;

    fn list(&self, status: Option<ReviewStatus>, limit: usize) -> ShieldResult<Vec<QuarantineRecord>>;

    /// Close a pending record; returns the updated record
    fn review(
        &self,
        id: Uuid,
        verdict: ReviewVerdict,
        reviewer: &str,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> ShieldResult<QuarantineRecord>;

    /// Close every pending record past its expiry; returns those records
    fn expire(&self, now: DateTime<Utc>) -> ShieldResult<Vec<QuarantineRecord>>;

    fn stats(&self) -> ShieldResult<QuarantineStats>;
}
