//! Rule Engine
//!
//! Stateless `(FeatureSet, IpReputationRecord, CompiledPolicy) → [Trigger]`.
//! Each rule yields zero or one trigger. Never mutates IP state.

use chrono::Duration;

use crate::logic::error::{ShieldError, ShieldResult};
use crate::logic::features::FeatureSet;
use crate::logic::policy::validate::{CompiledPolicy, CompiledRule};
use crate::logic::reputation::IpReputationRecord;
use super::matchers::{contains_phrase, domain_matches, ip_in_any};
use super::types::{names, Trigger, TriggerKind};

// ============================================================================
// CONSTANTS
// ============================================================================

const BOT_UA_INDICATORS: &[&str] = &[
    "bot", "crawler", "spider", "scraper", "automated", "curl", "wget",
    "python-requests", "python-urllib", "go-http-client", "headless",
];

const MIN_UA_LENGTH: usize = 10;

// ============================================================================
// MAIN EVALUATION
// ============================================================================

pub fn evaluate(features: &FeatureSet, ip: &IpReputationRecord, policy: &CompiledPolicy) -> Vec<Trigger> {
    let flags = &policy.policy.detectors;
    let whitelisted = ip_in_any(&features.ip, &policy.whitelist);

    let mut triggers = Vec::new();
    triggers.extend(check_honeypot(features));

    if !whitelisted {
        triggers.extend(check_ip_blacklist(features, policy));
        triggers.extend(check_flagged_ip(ip));
        if flags.rate_limit {
            triggers.extend(check_rate_limit(features, ip, policy));
        }
    }

    if flags.content_rules {
        triggers.extend(check_keywords(features, policy));
        triggers.extend(check_domains(features, policy));
        triggers.extend(check_url_count(features, policy));
        triggers.extend(check_caps(features, policy));
        triggers.extend(check_patterns(features, policy));
    }

    if flags.client_checks {
        triggers.extend(check_user_agent(features, policy));
        triggers.extend(check_typing(features, policy));
    }

    triggers.extend(policy.custom_rules.iter().filter_map(|rule| check_custom(features, rule)));

    triggers
}

/// `Err(HardTrigger)` naming the first hard trigger, if any fired
pub fn ensure_no_hard_trigger(triggers: &[Trigger]) -> ShieldResult<()> {
    match triggers.iter().find(|t| t.hard) {
        Some(t) => Err(ShieldError::HardTrigger(format!("{}: {}", t.name, t.detail))),
        None => Ok(()),
    }
}

// ============================================================================
// HARD RULES
// ============================================================================

fn check_honeypot(features: &FeatureSet) -> Option<Trigger> {
    let (field, _) = features.honeypot_values.iter().next()?;
    Some(
        Trigger::hard(names::HONEYPOT, format!("honeypot field '{}' was filled", field))
            .with_field(field),
    )
}

fn check_ip_blacklist(features: &FeatureSet, policy: &CompiledPolicy) -> Option<Trigger> {
    ip_in_any(&features.ip, &policy.blacklist)
        .then(|| Trigger::hard(names::IP_BLACKLIST, format!("{} is blacklisted", features.ip)))
}

fn check_flagged_ip(ip: &IpReputationRecord) -> Option<Trigger> {
    ip.flagged.then(|| {
        Trigger::hard(
            names::FLAGGED_IP,
            format!("{} flagged malicious ({} honeypot violations)", ip.ip, ip.honeypot_violations),
        )
    })
}

// ============================================================================
// CONTENT RULES
// ============================================================================

fn check_keywords(features: &FeatureSet, policy: &CompiledPolicy) -> Option<Trigger> {
    let text = features.lowered_text();
    let hits: Vec<&str> = policy
        .blocked_keywords
        .iter()
        .filter(|k| contains_phrase(&text, k))
        .map(String::as_str)
        .collect();

    (!hits.is_empty()).then(|| {
        Trigger::soft(
            names::BLOCKED_KEYWORD,
            policy.policy.rule_weights.blocked_keyword,
            format!("blocked keywords: {}", hits.join(", ")),
        )
    })
}

fn check_domains(features: &FeatureSet, policy: &CompiledPolicy) -> Option<Trigger> {
    let hit = features.domains.iter().find(|d| {
        policy.blocked_domains.iter().any(|blocked| domain_matches(d, blocked))
    })?;
    Some(Trigger::soft(
        names::BLOCKED_DOMAIN,
        policy.policy.rule_weights.blocked_domain,
        format!("blocked domain: {}", hit),
    ))
}

fn check_url_count(features: &FeatureSet, policy: &CompiledPolicy) -> Option<Trigger> {
    features.too_many_links.then(|| {
        Trigger::soft(
            names::MAX_URL_COUNT,
            policy.policy.rule_weights.max_url_count,
            format!("{} links (max {})", features.url_count, policy.policy.content.max_url_count),
        )
    })
}

fn check_caps(features: &FeatureSet, policy: &CompiledPolicy) -> Option<Trigger> {
    (features.caps_ratio > policy.policy.content.caps_ratio_limit).then(|| {
        Trigger::soft(
            names::EXCESSIVE_CAPS,
            policy.policy.rule_weights.excessive_caps,
            format!("{:.0}% uppercase", features.caps_ratio * 100.0),
        )
    })
}

fn check_patterns(features: &FeatureSet, policy: &CompiledPolicy) -> Option<Trigger> {
    if features.pattern_hits.is_empty() {
        return None;
    }
    let w = &policy.policy.rule_weights;
    let weight = (w.suspicious_pattern * features.pattern_hits.len() as f64).min(w.suspicious_patterns_cap);
    let families: Vec<&str> = features.pattern_hits.keys().map(String::as_str).collect();
    Some(Trigger::soft(
        names::SUSPICIOUS_PATTERNS,
        weight,
        format!("pattern families: {}", families.join(", ")),
    ))
}

fn check_custom(features: &FeatureSet, compiled: &CompiledRule) -> Option<Trigger> {
    let rule = &compiled.rule;
    let matched = if rule.field == "*" {
        features.fields.iter().find(|(_, v)| compiled.regex.is_match(v))
    } else {
        features.fields.get_key_value(&rule.field).filter(|(_, v)| compiled.regex.is_match(v))
    };
    let (field, _) = matched?;

    let detail = format!("custom rule '{}' ({}) matched", rule.name, rule.id);
    let trigger = if rule.hard {
        Trigger::hard(&rule.id, detail)
    } else {
        Trigger::soft(&rule.id, rule.weight, detail)
    };
    Some(trigger.with_kind(TriggerKind::Custom).with_field(field))
}

// ============================================================================
// CLIENT / RATE RULES
// ============================================================================

fn check_rate_limit(features: &FeatureSet, ip: &IpReputationRecord, policy: &CompiledPolicy) -> Option<Trigger> {
    let limit = policy.policy.rate_limits.limit_for(&features.endpoint);
    let since = features.received_at - Duration::seconds(limit.window_secs as i64);
    let count = ip.recent_count(&limit.prefix, since);

    (count >= limit.max_submissions).then(|| {
        Trigger::soft(
            names::RATE_LIMIT,
            policy.policy.rule_weights.rate_limit,
            format!(
                "{} submissions to '{}' in {}s (max {})",
                count, limit.prefix, limit.window_secs, limit.max_submissions
            ),
        )
    })
}

fn check_user_agent(features: &FeatureSet, policy: &CompiledPolicy) -> Option<Trigger> {
    let weight = policy.policy.rule_weights.bot_user_agent;
    let Some(ua) = features.user_agent.as_deref() else {
        return Some(Trigger::soft(names::BOT_USER_AGENT, weight, "missing user agent"));
    };

    let lower = ua.to_lowercase();
    if let Some(indicator) = BOT_UA_INDICATORS.iter().find(|i| lower.contains(*i)) {
        return Some(Trigger::soft(
            names::BOT_USER_AGENT,
            weight,
            format!("automation user agent ({})", indicator),
        ));
    }
    (ua.chars().count() < MIN_UA_LENGTH)
        .then(|| Trigger::soft(names::BOT_USER_AGENT, weight, "user agent too short"))
}

fn check_typing(features: &FeatureSet, policy: &CompiledPolicy) -> Vec<Trigger> {
    let Some(telemetry) = features.telemetry.as_ref() else {
        return Vec::new();
    };
    let rules = &policy.policy.typing;
    let w = &policy.policy.rule_weights;
    let mut triggers = Vec::new();

    if let Some(secs) = telemetry.typing_duration_secs {
        if secs < rules.min_typing_secs && features.total_text_length > 0 {
            triggers.push(Trigger::soft(
                names::TYPING_TOO_FAST,
                w.typing_too_fast,
                format!("form typed in {:.1}s", secs),
            ));
        }
    }
    if let Some(cpm) = telemetry.typing_speed_cpm {
        if cpm > rules.max_typing_cpm {
            triggers.push(Trigger::soft(
                names::TYPING_SPEED_INHUMAN,
                w.typing_speed_inhuman,
                format!("{:.0} chars/min", cpm),
            ));
        }
    }
    if let Some(delay) = telemetry.interaction_delay_secs {
        if delay < rules.min_interaction_delay_secs {
            triggers.push(Trigger::soft(
                names::NO_INTERACTION_DELAY,
                w.no_interaction_delay,
                format!("first input after {:.2}s", delay),
            ));
        }
    }

    let typed = typed_chars(features);
    if telemetry.pointer_moves == Some(0.0) && typed > rules.pointerless_min_chars as f64 {
        triggers.push(Trigger::soft(
            names::NO_MOUSE_MOVEMENT,
            w.no_mouse_movement,
            format!("no pointer movement over {:.0} typed chars", typed),
        ));
    }
    if let Some(pastes) = telemetry.paste_count.filter(|p| *p > 0.0) {
        if pastes > typed * rules.max_paste_ratio {
            triggers.push(Trigger::soft(
                names::EXCESSIVE_COPY_PASTE,
                w.excessive_copy_paste,
                format!("{:.0} pastes for {:.0} typed chars", pastes, typed),
            ));
        }
    }
    triggers
}

/// Characters actually typed: speed × duration when both are reported,
/// else the submitted text length
fn typed_chars(features: &FeatureSet) -> f64 {
    let telemetry = features.telemetry.as_ref();
    match telemetry.and_then(|t| t.typing_speed_cpm.zip(t.typing_duration_secs)) {
        Some((cpm, secs)) => cpm * secs / 60.0,
        None => features.total_text_length as f64,
    }
}
