//! Decision Types
//!
//! Data structures only. The aggregation lives in `engine.rs`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::reputation::Outcome;
use crate::logic::rules::{Severity, Trigger};

// ============================================================================
// ACTION
// ============================================================================

/// What the hosting pipeline should do with a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Allow,
    Challenge,
    Quarantine,
    Block,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Challenge => "challenge",
            Action::Quarantine => "quarantine",
            Action::Block => "block",
        }
    }

    pub fn to_outcome(self) -> Outcome {
        match self {
            Action::Allow => Outcome::Allowed,
            Action::Challenge => Outcome::Challenged,
            Action::Quarantine => Outcome::Quarantined,
            Action::Block => Outcome::Blocked,
        }
    }

    /// Block and quarantine are reported to the notifier and persisted
    pub fn is_flagged(&self) -> bool {
        matches!(self, Action::Quarantine | Action::Block)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// DECISION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub submission_id: Uuid,
    pub score: f64,
    pub confidence: f64,
    pub action: Action,
    pub severity: Severity,
    /// Rule triggers plus one `Signal` entry per contributing signal
    pub triggers: Vec<Trigger>,
    pub captcha_required: bool,
    /// Signals that were unavailable for this decision
    pub degraded: Vec<String>,
    pub decided_at: DateTime<Utc>,
    pub policy_version: u64,
    /// Wall time spent in the engine, filled in by the caller of `decide`
    pub processing_time_us: u64,
}

impl DecisionResult {
    pub fn trigger(&self, name: &str) -> Option<&Trigger> {
        self.triggers.iter().find(|t| t.name == name)
    }

    pub fn hard_trigger(&self) -> Option<&Trigger> {
        self.triggers.iter().find(|t| t.hard)
    }
}
