//! Reputation Types

use std::collections::VecDeque;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// TIER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationTier {
    Good,
    Neutral,
    Suspicious,
    Malicious,
}

impl ReputationTier {
    /// Fixed, monotonic threshold ladder
    pub fn from_risk(risk: f64) -> Self {
        if risk >= 0.8 {
            ReputationTier::Malicious
        } else if risk >= 0.6 {
            ReputationTier::Suspicious
        } else if risk >= 0.3 {
            ReputationTier::Neutral
        } else {
            ReputationTier::Good
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReputationTier::Good => "good",
            ReputationTier::Neutral => "neutral",
            ReputationTier::Suspicious => "suspicious",
            ReputationTier::Malicious => "malicious",
        }
    }
}

impl std::fmt::Display for ReputationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// OBSERVATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Allowed,
    Challenged,
    Quarantined,
    Blocked,
}

/// What happened to one submission from an IP
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub endpoint: String,
    pub outcome: Outcome,
    pub score: f64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionMark {
    pub at: DateTime<Utc>,
    pub endpoint: String,
}

// ============================================================================
// RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpReputationRecord {
    pub ip: String,
    pub risk_score: f64,
    pub tier: ReputationTier,
    pub submission_count: u64,
    pub block_count: u64,
    pub honeypot_violations: u32,
    /// Permanently malicious; the moving average no longer applies
    pub flagged: bool,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Bounded recent-submission history (rate limiting)
    pub recent: VecDeque<SubmissionMark>,
}

impl IpReputationRecord {
    pub fn new(ip: &str, initial_risk: f64, now: DateTime<Utc>) -> Self {
        let risk = initial_risk.clamp(0.0, 1.0);
        Self {
            ip: ip.to_string(),
            risk_score: risk,
            tier: ReputationTier::from_risk(risk),
            submission_count: 0,
            block_count: 0,
            honeypot_violations: 0,
            flagged: false,
            first_seen: now,
            last_seen: now,
            recent: VecDeque::new(),
        }
    }

    /// Only way risk changes, so `tier` always follows `risk_score`
    pub fn set_risk(&mut self, risk: f64) {
        self.risk_score = if risk.is_finite() { risk.clamp(0.0, 1.0) } else { 1.0 };
        self.tier = ReputationTier::from_risk(self.risk_score);
    }

    pub fn flag(&mut self) {
        self.flagged = true;
        self.set_risk(1.0);
    }

    /// Submissions to endpoints under `prefix` since `since`
    pub fn recent_count(&self, prefix: &str, since: DateTime<Utc>) -> usize {
        self.recent
            .iter()
            .filter(|m| m.at > since && m.endpoint.starts_with(prefix))
            .count()
    }

    pub(crate) fn push_mark(&mut self, mark: SubmissionMark, max_len: usize, window: Duration) {
        let cutoff = mark.at - window;
        self.recent.retain(|m| m.at > cutoff);
        self.recent.push_back(mark);
        while self.recent.len() > max_len {
            self.recent.pop_front();
        }
    }
}

// ============================================================================
// STATS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReputationStats {
    pub total: usize,
    pub good: usize,
    pub neutral: usize,
    pub suspicious: usize,
    pub malicious: usize,
    pub flagged: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ladder() {
        assert_eq!(ReputationTier::from_risk(0.85), ReputationTier::Malicious);
        assert_eq!(ReputationTier::from_risk(0.65), ReputationTier::Suspicious);
        assert_eq!(ReputationTier::from_risk(0.35), ReputationTier::Neutral);
        assert_eq!(ReputationTier::from_risk(0.1), ReputationTier::Good);
        assert_eq!(ReputationTier::from_risk(0.8), ReputationTier::Malicious);
        assert_eq!(ReputationTier::from_risk(0.3), ReputationTier::Neutral);
    }

    #[test]
    fn test_tier_monotonic() {
        let mut last = ReputationTier::Good;
        for i in 0..=100 {
            let tier = ReputationTier::from_risk(i as f64 / 100.0);
            assert!(tier >= last);
            last = tier;
        }
    }

    #[test]
    fn test_set_risk_clamps() {
        let mut rec = IpReputationRecord::new("192.0.2.1", 0.3, Utc::now());
        rec.set_risk(4.2);
        assert_eq!(rec.risk_score, 1.0);
        assert_eq!(rec.tier, ReputationTier::Malicious);
        rec.set_risk(-1.0);
        assert_eq!(rec.risk_score, 0.0);
        assert_eq!(rec.tier, ReputationTier::Good);
    }

    #[test]
    fn test_marks_bounded_and_windowed() {
        let now = Utc::now();
        let mut rec = IpReputationRecord::new("192.0.2.1", 0.3, now);
        let window = Duration::hours(1);

        rec.push_mark(SubmissionMark { at: now - Duration::hours(3), endpoint: "/submit".into() }, 3, window);
        for i in 0..5 {
            rec.push_mark(SubmissionMark { at: now + Duration::seconds(i), endpoint: "/submit".into() }, 3, window);
        }

        assert_eq!(rec.recent.len(), 3);
        assert_eq!(rec.recent_count("/submit", now - Duration::minutes(1)), 3);
        assert_eq!(rec.recent_count("/contact", now - Duration::minutes(1)), 0);
    }
}
