//! Policy validation & compilation
//!
//! A policy only becomes active as a `CompiledPolicy`: numbers range-checked,
//! regexes compiled, CIDR lists parsed. Any failure rejects the whole policy.

use regex::Regex;

use crate::logic::error::{ShieldError, ShieldResult};
use crate::logic::features::NormalizeOptions;
use crate::logic::rules::matchers::IpRange;
use super::config::{CustomRule, Policy};

#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: CustomRule,
    pub regex: Regex,
}

/// Validated policy plus everything precomputed from it
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    pub policy: Policy,
    pub custom_rules: Vec<CompiledRule>,
    pub whitelist: Vec<IpRange>,
    pub blacklist: Vec<IpRange>,
    /// Lower-cased
    pub blocked_keywords: Vec<String>,
    /// Lower-cased
    pub blocked_domains: Vec<String>,
    pub normalize: NormalizeOptions,
}

impl CompiledPolicy {
    pub fn compile(policy: Policy) -> ShieldResult<Self> {
        validate_policy(&policy)?;

        let custom_rules = policy
            .custom_rules
            .iter()
            .filter(|r| r.enabled)
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|regex| CompiledRule { rule: rule.clone(), regex })
                    .map_err(|e| ShieldError::Config(format!("custom rule '{}': {}", rule.id, e)))
            })
            .collect::<ShieldResult<Vec<_>>>()?;

        let parse_list = |list: &[String]| {
            list.iter().map(|s| IpRange::parse(s)).collect::<ShieldResult<Vec<_>>>()
        };
        let whitelist = parse_list(&policy.ip_lists.whitelist)?;
        let blacklist = parse_list(&policy.ip_lists.blacklist)?;

        let lower = |list: &[String]| {
            list.iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        };

        Ok(Self {
            custom_rules,
            whitelist,
            blacklist,
            blocked_keywords: lower(&policy.content.blocked_keywords),
            blocked_domains: lower(&policy.content.blocked_domains),
            normalize: policy.normalize_options(),
            policy,
        })
    }

    pub fn version(&self) -> u64 {
        self.policy.version
    }
}

fn unit(name: &str, value: f64) -> ShieldResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ShieldError::Config(format!("{} must be within [0, 1], got {}", name, value)))
    }
}

fn non_negative(name: &str, value: f64) -> ShieldResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ShieldError::Config(format!("{} must be a finite non-negative number, got {}", name, value)))
    }
}

/// Range and consistency checks (no compilation)
pub fn validate_policy(policy: &Policy) -> ShieldResult<()> {
    let t = &policy.thresholds;
    unit("thresholds.block", t.block)?;
    unit("thresholds.quarantine", t.quarantine)?;
    unit("thresholds.challenge", t.challenge)?;
    if t.block <= t.quarantine {
        return Err(ShieldError::Config("block threshold must be greater than quarantine threshold".into()));
    }
    if t.quarantine < t.challenge {
        return Err(ShieldError::Config("quarantine threshold must not be below challenge threshold".into()));
    }

    let w = &policy.weights;
    non_negative("weights.rule", w.rule)?;
    non_negative("weights.ip", w.ip)?;
    non_negative("weights.behavior", w.behavior)?;
    non_negative("weights.ml", w.ml)?;
    non_negative("confidence_weights.classifier", policy.confidence_weights.classifier)?;
    non_negative("confidence_weights.behavior", policy.confidence_weights.behavior)?;

    let rw = &policy.rule_weights;
    for (name, value) in [
        ("blocked_keyword", rw.blocked_keyword),
        ("blocked_domain", rw.blocked_domain),
        ("max_url_count", rw.max_url_count),
        ("excessive_caps", rw.excessive_caps),
        ("suspicious_pattern", rw.suspicious_pattern),
        ("suspicious_patterns_cap", rw.suspicious_patterns_cap),
        ("rate_limit", rw.rate_limit),
        ("bot_user_agent", rw.bot_user_agent),
        ("typing_too_fast", rw.typing_too_fast),
        ("typing_speed_inhuman", rw.typing_speed_inhuman),
        ("no_interaction_delay", rw.no_interaction_delay),
        ("no_mouse_movement", rw.no_mouse_movement),
        ("excessive_copy_paste", rw.excessive_copy_paste),
    ] {
        non_negative(&format!("rule_weights.{}", name), value)?;
    }

    unit("content.caps_ratio_limit", policy.content.caps_ratio_limit)?;
    non_negative("typing.max_paste_ratio", policy.typing.max_paste_ratio)?;

    let r = &policy.reputation;
    if !(r.alpha > 0.0 && r.alpha <= 1.0) {
        return Err(ShieldError::Config(format!("reputation.alpha must be in (0, 1], got {}", r.alpha)));
    }
    unit("reputation.initial_risk", r.initial_risk)?;
    if r.ttl_secs == 0 || r.history_window_secs == 0 || r.history_len == 0 {
        return Err(ShieldError::Config("reputation ttl/history settings must be > 0".into()));
    }
    if r.honeypot_flag_threshold == 0 {
        return Err(ShieldError::Config("reputation.honeypot_flag_threshold must be >= 1".into()));
    }

    for limit in policy.rate_limits.endpoints.iter().chain(std::iter::once(&policy.rate_limits.default)) {
        if limit.max_submissions == 0 || limit.window_secs == 0 {
            return Err(ShieldError::Config(format!("rate limit '{}' needs max_submissions and window_secs > 0", limit.prefix)));
        }
    }

    for rule in &policy.custom_rules {
        if rule.id.trim().is_empty() {
            return Err(ShieldError::Config("custom rule without id".into()));
        }
        non_negative(&format!("custom rule '{}' weight", rule.id), rule.weight)?;
    }

    let b = &policy.behavior;
    non_negative("behavior.steepness", b.steepness)?;
    non_negative("behavior.midpoint", b.midpoint)?;
    non_negative("behavior.anomaly_z", b.anomaly_z)?;

    let l = &policy.learning;
    if l.min_training_samples == 0 || l.min_baseline_samples < 2 || l.window_size == 0 {
        return Err(ShieldError::Config("learning sample minimums and window must be positive (baseline >= 2)".into()));
    }

    let c = &policy.captcha;
    unit("captcha.min_trust", c.min_trust)?;
    non_negative("captcha.failed_weight", c.failed_weight)?;
    non_negative("captcha.verified_credit", c.verified_credit)?;
    if c.timeout_ms == 0 {
        return Err(ShieldError::Config("captcha.timeout_ms must be > 0".into()));
    }

    if policy.quarantine.expiry_secs == 0 || policy.quarantine.max_records == 0 {
        return Err(ShieldError::Config("quarantine expiry and capacity must be > 0".into()));
    }

    Ok(())
}
