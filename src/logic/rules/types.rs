//! Rule Types
//!
//! Triggers are the audit trail of a decision: every rule hit and every
//! aggregated signal ends up in `DecisionResult::triggers` as one of these.

use serde::{Deserialize, Serialize};

// ============================================================================
// TRIGGER NAMES
// ============================================================================

pub mod names {
    pub const HONEYPOT: &str = "honeypot";
    pub const IP_BLACKLIST: &str = "ip_blacklist";
    pub const FLAGGED_IP: &str = "flagged_ip";
    pub const BLOCKED_KEYWORD: &str = "blocked_keyword";
    pub const BLOCKED_DOMAIN: &str = "blocked_domain";
    pub const MAX_URL_COUNT: &str = "max_url_count";
    pub const EXCESSIVE_CAPS: &str = "excessive_caps";
    pub const SUSPICIOUS_PATTERNS: &str = "suspicious_patterns";
    pub const RATE_LIMIT: &str = "rate_limit";
    pub const BOT_USER_AGENT: &str = "bot_user_agent";
    pub const TYPING_TOO_FAST: &str = "typing_too_fast";
    pub const TYPING_SPEED_INHUMAN: &str = "typing_speed_inhuman";
    pub const NO_INTERACTION_DELAY: &str = "no_interaction_delay";
    pub const NO_MOUSE_MOVEMENT: &str = "no_mouse_movement";
    pub const EXCESSIVE_COPY_PASTE: &str = "excessive_copy_paste";
    pub const CAPTCHA_VERIFIED: &str = "captcha_verified";
    pub const CAPTCHA_FAILED: &str = "captcha_failed";

    // Aggregated signals
    pub const IP_REPUTATION: &str = "ip_reputation";
    pub const BEHAVIORAL: &str = "behavioral";
    pub const CLASSIFIER: &str = "classifier";
}

// ============================================================================
// TRIGGER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Built-in rule
    Rule,
    /// Operator regex rule
    Custom,
    /// CAPTCHA verification outcome
    Captcha,
    /// Weighted model signal (IP reputation, behavior, classifier)
    Signal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub name: String,
    pub kind: TriggerKind,
    pub weight: f64,
    pub hard: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub detail: String,
}

impl Trigger {
    pub fn soft(name: &str, weight: f64, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            kind: TriggerKind::Rule,
            weight,
            hard: false,
            field: None,
            detail: detail.into(),
        }
    }

    /// Hard trigger: forces a block regardless of every other signal
    pub fn hard(name: &str, detail: impl Into<String>) -> Self {
        Self {
            hard: true,
            ..Self::soft(name, 1.0, detail)
        }
    }

    pub fn with_kind(mut self, kind: TriggerKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }

    pub fn severity(&self) -> Severity {
        if self.hard {
            Severity::Critical
        } else {
            Severity::from_score(self.weight)
        }
    }
}

// ============================================================================
// SEVERITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Severity::Critical
        } else if score >= 0.6 {
            Severity::High
        } else if score >= 0.3 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
