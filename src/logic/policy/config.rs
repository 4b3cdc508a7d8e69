//! Policy Configuration
//!
//! Versioned, hot-reloadable policy: thresholds, signal weights, rule lists,
//! detector switches and learning parameters. Loaded from a JSON file or
//! built at runtime; always validated before it becomes active.

use serde::{Deserialize, Serialize};

use crate::logic::features::{NormalizeOptions, DEFAULT_HONEYPOT_FIELDS};

// ============================================================================
// POLICY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub version: u64,
    pub thresholds: Thresholds,
    pub weights: SignalWeights,
    pub confidence_weights: ConfidenceWeights,
    pub detectors: DetectorFlags,
    pub content: ContentRules,
    pub rule_weights: RuleWeights,
    pub custom_rules: Vec<CustomRule>,
    pub rate_limits: RateLimitPolicy,
    pub ip_lists: IpLists,
    pub typing: TypingRules,
    pub reputation: ReputationPolicy,
    pub behavior: BehaviorPolicy,
    pub learning: LearningPolicy,
    pub captcha: CaptchaPolicy,
    pub quarantine: QuarantinePolicy,
    pub notify: NotifyPolicy,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            version: 1,
            thresholds: Thresholds::default(),
            weights: SignalWeights::default(),
            confidence_weights: ConfidenceWeights::default(),
            detectors: DetectorFlags::default(),
            content: ContentRules::default(),
            rule_weights: RuleWeights::default(),
            custom_rules: Vec::new(),
            rate_limits: RateLimitPolicy::default(),
            ip_lists: IpLists::default(),
            typing: TypingRules::default(),
            reputation: ReputationPolicy::default(),
            behavior: BehaviorPolicy::default(),
            learning: LearningPolicy::default(),
            captcha: CaptchaPolicy::default(),
            quarantine: QuarantinePolicy::default(),
            notify: NotifyPolicy::default(),
        }
    }
}

impl Policy {
    /// Strict mode - lower thresholds, heavier rule weights
    pub fn strict() -> Self {
        Self {
            thresholds: Thresholds { block: 0.7, quarantine: 0.5, challenge: 0.25 },
            content: ContentRules { max_url_count: 2, ..Default::default() },
            ..Default::default()
        }
    }

    /// Lenient mode - only clear-cut spam is blocked
    pub fn lenient() -> Self {
        Self {
            thresholds: Thresholds { block: 0.9, quarantine: 0.75, challenge: 0.5 },
            content: ContentRules { max_url_count: 6, ..Default::default() },
            ..Default::default()
        }
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            honeypot_fields: self.content.honeypot_fields.clone(),
            max_url_count: self.content.max_url_count,
        }
    }
}

// ============================================================================
// DECISION PARAMETERS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub block: f64,
    pub quarantine: f64,
    pub challenge: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { block: 0.8, quarantine: 0.6, challenge: 0.3 }
    }
}

/// Aggregation weights. `ip + behavior + ml` sum to 1.0; `rule` scales the
/// per-trigger weights, which are calibrated individually.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalWeights {
    pub rule: f64,
    pub ip: f64,
    pub behavior: f64,
    pub ml: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self { rule: 1.0, ip: 0.2, behavior: 0.3, ml: 0.5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    pub classifier: f64,
    pub behavior: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self { classifier: 0.6, behavior: 0.4 }
    }
}

/// Detector switches. Hard rules (honeypot, IP blacklist, flagged IP) and
/// custom rules ignore these.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorFlags {
    pub content_rules: bool,
    pub client_checks: bool,
    pub rate_limit: bool,
    pub ip_reputation: bool,
    pub behavioral: bool,
    pub classifier: bool,
    pub captcha: bool,
}

impl Default for DetectorFlags {
    fn default() -> Self {
        Self {
            content_rules: true,
            client_checks: true,
            rate_limit: true,
            ip_reputation: true,
            behavioral: true,
            classifier: true,
            captcha: true,
        }
    }
}

// ============================================================================
// RULE CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentRules {
    pub honeypot_fields: Vec<String>,
    pub blocked_keywords: Vec<String>,
    pub blocked_domains: Vec<String>,
    pub max_url_count: usize,
    pub caps_ratio_limit: f64,
}

impl Default for ContentRules {
    fn default() -> Self {
        Self {
            honeypot_fields: DEFAULT_HONEYPOT_FIELDS.iter().map(|s| s.to_string()).collect(),
            blocked_keywords: ["viagra", "casino", "lottery", "porn", "free money", "click here", "urgent"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            blocked_domains: ["spam.com", "tempmail.org", "guerrillamail.com"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_url_count: 3,
            caps_ratio_limit: 0.7,
        }
    }
}

/// Weight each built-in non-hard rule contributes when it fires
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleWeights {
    pub blocked_keyword: f64,
    pub blocked_domain: f64,
    pub max_url_count: f64,
    pub excessive_caps: f64,
    /// Per matched pattern family, capped at `suspicious_patterns_cap`
    pub suspicious_pattern: f64,
    pub suspicious_patterns_cap: f64,
    pub rate_limit: f64,
    pub bot_user_agent: f64,
    pub typing_too_fast: f64,
    pub typing_speed_inhuman: f64,
    pub no_interaction_delay: f64,
    pub no_mouse_movement: f64,
    pub excessive_copy_paste: f64,
}

impl Default for RuleWeights {
    fn default() -> Self {
        Self {
            blocked_keyword: 0.5,
            blocked_domain: 0.6,
            max_url_count: 0.4,
            excessive_caps: 0.2,
            suspicious_pattern: 0.1,
            suspicious_patterns_cap: 0.4,
            rate_limit: 0.5,
            bot_user_agent: 0.4,
            typing_too_fast: 0.3,
            typing_speed_inhuman: 0.4,
            no_interaction_delay: 0.2,
            no_mouse_movement: 0.5,
            excessive_copy_paste: 0.4,
        }
    }
}

/// Operator-defined regex rule. `field == "*"` matches every field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub pattern: String,
    #[serde(default = "all_fields")]
    pub field: String,
    pub weight: f64,
    #[serde(default)]
    pub hard: bool,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

fn all_fields() -> String {
    "*".to_string()
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointLimit {
    /// Endpoint prefix ("" matches everything)
    pub prefix: String,
    pub max_submissions: usize,
    pub window_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitPolicy {
    pub endpoints: Vec<EndpointLimit>,
    pub default: EndpointLimit,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        let limit = |prefix: &str, max_submissions, window_secs| EndpointLimit {
            prefix: prefix.to_string(),
            max_submissions,
            window_secs,
        };
        Self {
            endpoints: vec![
                limit("/submit", 10, 15 * 60),
                limit("/contact", 5, 10 * 60),
                limit("/api/", 100, 3600),
            ],
            default: limit("", 50, 3600),
        }
    }
}

impl RateLimitPolicy {
    /// Longest matching prefix wins; falls back to the default bucket
    pub fn limit_for(&self, endpoint: &str) -> &EndpointLimit {
        self.endpoints
            .iter()
            .filter(|l| endpoint.starts_with(&l.prefix))
            .max_by_key(|l| l.prefix.len())
            .unwrap_or(&self.default)
    }
}

/// Exact IPs or CIDR ranges
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpLists {
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypingRules {
    pub min_typing_secs: f64,
    pub max_typing_cpm: f64,
    pub min_interaction_delay_secs: f64,
    /// Typed characters above which zero pointer movement is suspicious
    pub pointerless_min_chars: usize,
    /// Paste events per typed character
    pub max_paste_ratio: f64,
}

impl Default for TypingRules {
    fn default() -> Self {
        Self {
            min_typing_secs: 2.0,
            max_typing_cpm: 1000.0,
            min_interaction_delay_secs: 0.2,
            pointerless_min_chars: 50,
            max_paste_ratio: 0.5,
        }
    }
}

// ============================================================================
// COMPONENT PARAMETERS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationPolicy {
    /// EMA decay: risk' = alpha·observed + (1 - alpha)·risk
    pub alpha: f64,
    pub initial_risk: f64,
    pub ttl_secs: u64,
    pub honeypot_flag_threshold: u32,
    pub history_len: usize,
    pub history_window_secs: u64,
}

impl Default for ReputationPolicy {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            initial_risk: 0.3,
            ttl_secs: 24 * 3600,
            honeypot_flag_threshold: 3,
            history_len: 100,
            history_window_secs: 24 * 3600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorPolicy {
    pub min_samples_per_metric: u64,
    pub steepness: f64,
    pub midpoint: f64,
    pub anomaly_z: f64,
}

impl Default for BehaviorPolicy {
    fn default() -> Self {
        Self {
            min_samples_per_metric: 30,
            steepness: 1.5,
            midpoint: 2.0,
            anomaly_z: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningPolicy {
    pub min_training_samples: usize,
    pub min_baseline_samples: usize,
    pub min_token_frequency: usize,
    pub window_size: usize,
    pub feature_cache_size: usize,
}

impl Default for LearningPolicy {
    fn default() -> Self {
        Self {
            min_training_samples: 100,
            min_baseline_samples: 30,
            min_token_frequency: 2,
            window_size: 10_000,
            feature_cache_size: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptchaPolicy {
    pub timeout_ms: u64,
    pub min_trust: f64,
    pub failed_weight: f64,
    pub verified_credit: f64,
}

impl Default for CaptchaPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 2_000,
            min_trust: 0.5,
            failed_weight: 0.8,
            verified_credit: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuarantinePolicy {
    pub expiry_secs: u64,
    pub log_blocks: bool,
    pub max_records: usize,
}

impl Default for QuarantinePolicy {
    fn default() -> Self {
        Self {
            expiry_secs: 7 * 24 * 3600,
            log_blocks: true,
            max_records: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyPolicy {
    pub on_block: bool,
    pub on_quarantine: bool,
}

impl Default for NotifyPolicy {
    fn default() -> Self {
        Self { on_block: true, on_quarantine: true }
    }
}

// ============================================================================
// TESTS
// ============================================================================
