//! Normalizer - SubmissionContext → FeatureSet
//!
//! Pure function. Malformed input never fails the pipeline: the offending
//! signal is dropped and noted in `FeatureSet::input_errors`.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use serde_json::Value;

use super::layout::BehaviorMetric;
use super::patterns::{self, EMAIL_RE, PATTERN_FAMILIES, STOP_WORDS, URL_RE};
use super::types::{FeatureSet, SubmissionContext, Telemetry};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Caps ratio is only meaningful past this many characters
const CAPS_MIN_LENGTH: usize = 20;
const MIN_TOKEN_LEN: usize = 2;

pub const DEFAULT_HONEYPOT_FIELDS: &[&str] = &["_honeypot", "_hp", "_bot_check", "_email_confirm"];

// ============================================================================
// OPTIONS
// ============================================================================

/// Policy-derived inputs the normalizer needs
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub honeypot_fields: Vec<String>,
    /// `too_many_links` is set when url_count exceeds this
    pub max_url_count: usize,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            honeypot_fields: DEFAULT_HONEYPOT_FIELDS.iter().map(|s| s.to_string()).collect(),
            max_url_count: 3,
        }
    }
}

impl NormalizeOptions {
    fn is_honeypot(&self, name: &str) -> bool {
        self.honeypot_fields.iter().any(|h| h.eq_ignore_ascii_case(name))
    }
}

// ============================================================================
// NORMALIZE
// ============================================================================

pub fn normalize(ctx: &SubmissionContext, opts: &NormalizeOptions) -> FeatureSet {
    let mut errors = Vec::new();

    let ip = normalize_ip(&ctx.ip, &mut errors);

    let mut fields = BTreeMap::new();
    let mut field_lengths = BTreeMap::new();
    let mut honeypot_values = BTreeMap::new();

    for (name, raw) in &ctx.fields {
        let text = coerce_field(name, raw, &mut errors);
        if opts.is_honeypot(name) {
            if !text.is_empty() {
                honeypot_values.insert(name.clone(), text);
            }
            continue;
        }
        field_lengths.insert(name.clone(), text.chars().count());
        fields.insert(name.clone(), text);
    }

    let missing_fields: Vec<String> = ctx
        .required_fields
        .iter()
        .filter(|name| fields.get(*name).map_or(true, |v: &String| v.is_empty()))
        .cloned()
        .collect();

    let text = fields.values().cloned().collect::<Vec<_>>().join("\n");
    let url_count = URL_RE.find_iter(&text).count();

    FeatureSet {
        submission_id: ctx.submission_id,
        endpoint: ctx.endpoint.trim().to_string(),
        received_at: ctx.received_at,
        ip,
        user_agent: non_empty(ctx.user_agent.as_deref()),
        referrer: non_empty(ctx.referrer.as_deref()),
        max_field_length: field_lengths.values().copied().max().unwrap_or(0),
        total_text_length: field_lengths.values().sum(),
        fields,
        field_lengths,
        honeypot_values,
        missing_fields,
        tokens: tokenize(&URL_RE.replace_all(&text, " ")),
        url_count,
        too_many_links: url_count > opts.max_url_count,
        domains: extract_domains(&text),
        caps_ratio: caps_ratio(&text),
        pattern_hits: pattern_hits(&text),
        telemetry: ctx.telemetry.as_ref().and_then(|raw| parse_telemetry(raw, &mut errors)),
        captcha_token: non_empty(ctx.captcha_token.as_deref()),
        input_errors: errors,
    }
}

/// Lower-case, strip punctuation, drop stop words and short tokens
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_TOKEN_LEN)
        .filter(|w| w.chars().all(|c| c.is_alphabetic()))
        .filter(|w| !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

// ============================================================================
// HELPERS
// ============================================================================

fn normalize_ip(raw: &str, errors: &mut Vec<String>) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        errors.push("missing client ip".to_string());
        return "unknown".to_string();
    }
    match trimmed.parse::<IpAddr>() {
        Ok(addr) => addr.to_string(),
        Err(_) => {
            errors.push(format!("unparseable client ip '{}'", trimmed));
            trimmed.to_string()
        }
    }
}

fn coerce_field(name: &str, raw: &Value, errors: &mut Vec<String>) -> String {
    match raw {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::trim))
            .collect::<Vec<_>>()
            .join(" "),
        Value::Object(_) => {
            errors.push(format!("field '{}' is an object, treated as empty", name));
            String::new()
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn extract_domains(text: &str) -> Vec<String> {
    let mut domains = BTreeSet::new();
    for caps in EMAIL_RE.captures_iter(text) {
        if let Some(domain) = caps.get(1) {
            domains.insert(domain.as_str().to_lowercase());
        }
    }
    for url in URL_RE.find_iter(text) {
        if let Some(host) = patterns::url_host(url.as_str()) {
            domains.insert(host);
        }
    }
    domains.into_iter().collect()
}

fn caps_ratio(text: &str) -> f64 {
    if text.chars().count() <= CAPS_MIN_LENGTH {
        return 0.0;
    }
    let (letters, upper) = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .fold((0usize, 0usize), |(l, u), c| (l + 1, u + c.is_uppercase() as usize));
    if letters == 0 {
        0.0
    } else {
        upper as f64 / letters as f64
    }
}

fn pattern_hits(text: &str) -> BTreeMap<String, usize> {
    PATTERN_FAMILIES
        .iter()
        .filter_map(|(name, re)| {
            let count = re.find_iter(text).count();
            (count > 0).then(|| (name.to_string(), count))
        })
        .collect()
}

fn parse_telemetry(raw: &Value, errors: &mut Vec<String>) -> Option<Telemetry> {
    let map = match raw {
        Value::Null => return None,
        Value::Object(map) => map,
        // Some clients post the blob as a JSON string
        Value::String(s) => {
            return match serde_json::from_str::<Value>(s) {
                Ok(inner @ Value::Object(_)) => parse_telemetry(&inner, errors),
                _ => {
                    errors.push("telemetry string is not a JSON object".to_string());
                    None
                }
            };
        }
        _ => {
            errors.push("telemetry is not an object".to_string());
            return None;
        }
    };

    let mut telemetry = Telemetry::default();
    for metric in BehaviorMetric::ALL {
        let Some(value) = map.get(metric.as_str()) else {
            continue;
        };
        match value.as_f64() {
            Some(v) if v.is_finite() && v >= 0.0 => telemetry.set_metric(metric, v),
            _ => errors.push(format!("telemetry.{} is not a non-negative number", metric)),
        }
    }

    if telemetry.is_empty() {
        errors.push("telemetry carried no usable metrics".to_string());
        None
    } else {
        Some(telemetry)
    }
}
