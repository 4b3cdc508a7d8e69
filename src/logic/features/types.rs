//! Submission & Feature Types
//!
//! `SubmissionContext` is the raw inbound request; `FeatureSet` is the typed
//! view every detector reads. Nothing downstream of the normalizer touches
//! the raw field map.

use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::layout::BehaviorMetric;

// ============================================================================
// SUBMISSION CONTEXT (raw input)
// ============================================================================

/// One inbound form submission plus request metadata.
///
/// Deserialization never fails on a badly typed member: it is treated as
/// absent and the normalizer sees an empty value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionContext {
    #[serde(default = "Uuid::new_v4", deserialize_with = "lenient::id")]
    pub submission_id: Uuid,
    /// Request path, used to pick the rate-limit bucket
    #[serde(default, deserialize_with = "lenient::string")]
    pub endpoint: String,
    /// Raw field map. Values may be any JSON; non-strings are coerced.
    #[serde(default, deserialize_with = "lenient::field_map")]
    pub fields: BTreeMap<String, serde_json::Value>,
    /// Fields the form declares mandatory
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub required_fields: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub ip: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub user_agent: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub referrer: Option<String>,
    /// Optional client telemetry blob (see `layout::METRIC_LAYOUT` for keys)
    #[serde(default)]
    pub telemetry: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub captcha_token: Option<String>,
    #[serde(default = "Utc::now", deserialize_with = "lenient::timestamp")]
    pub received_at: DateTime<Utc>,
}

mod lenient {
    use std::collections::BTreeMap;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use uuid::Uuid;

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(opt_string(d)?.unwrap_or_default())
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            _ => None,
        })
    }

    pub fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        })
    }

    pub fn field_map<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, Value>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Object(map) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        })
    }

    pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<Uuid, D::Error> {
        Ok(opt_string(d)?
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .unwrap_or_else(Uuid::new_v4))
    }

    pub fn timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        Ok(opt_string(d)?
            .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
            .map_or_else(Utc::now, |t| t.with_timezone(&Utc)))
    }
}

impl SubmissionContext {
    pub fn new(ip: &str) -> Self {
        Self {
            submission_id: Uuid::new_v4(),
            endpoint: String::new(),
            fields: BTreeMap::new(),
            required_fields: Vec::new(),
            ip: ip.to_string(),
            user_agent: None,
            referrer: None,
            telemetry: None,
            captcha_token: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), serde_json::Value::String(value.to_string()));
        self
    }

    pub fn with_required(mut self, names: &[&str]) -> Self {
        self.required_fields = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_user_agent(mut self, ua: &str) -> Self {
        self.user_agent = Some(ua.to_string());
        self
    }

    pub fn with_telemetry(mut self, telemetry: serde_json::Value) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn with_captcha_token(mut self, token: &str) -> Self {
        self.captcha_token = Some(token.to_string());
        self
    }

    pub fn at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }
}

// ============================================================================
// TELEMETRY
// ============================================================================

/// Parsed client telemetry. Every metric is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub typing_duration_secs: Option<f64>,
    pub typing_speed_cpm: Option<f64>,
    pub pointer_moves: Option<f64>,
    pub interaction_delay_secs: Option<f64>,
    pub backspace_ratio: Option<f64>,
    pub paste_count: Option<f64>,
}

impl Telemetry {
    pub fn metric(&self, metric: BehaviorMetric) -> Option<f64> {
        match metric {
            BehaviorMetric::TypingDuration => self.typing_duration_secs,
            BehaviorMetric::TypingSpeed => self.typing_speed_cpm,
            BehaviorMetric::PointerMoves => self.pointer_moves,
            BehaviorMetric::InteractionDelay => self.interaction_delay_secs,
            BehaviorMetric::BackspaceRatio => self.backspace_ratio,
            BehaviorMetric::PasteCount => self.paste_count,
        }
    }

    pub fn set_metric(&mut self, metric: BehaviorMetric, value: f64) {
        let slot = match metric {
            BehaviorMetric::TypingDuration => &mut self.typing_duration_secs,
            BehaviorMetric::TypingSpeed => &mut self.typing_speed_cpm,
            BehaviorMetric::PointerMoves => &mut self.pointer_moves,
            BehaviorMetric::InteractionDelay => &mut self.interaction_delay_secs,
            BehaviorMetric::BackspaceRatio => &mut self.backspace_ratio,
            BehaviorMetric::PasteCount => &mut self.paste_count,
        };
        *slot = Some(value);
    }

    pub fn present_count(&self) -> usize {
        BehaviorMetric::ALL.iter().filter(|m| self.metric(**m).is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.present_count() == 0
    }
}

// ============================================================================
// FEATURE SET (normalized output)
// ============================================================================

/// Normalized, typed view of a `SubmissionContext`. Read-only downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub submission_id: Uuid,
    pub endpoint: String,
    pub received_at: DateTime<Utc>,
    pub ip: String,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,

    /// Trimmed text of every non-honeypot field
    pub fields: BTreeMap<String, String>,
    pub field_lengths: BTreeMap<String, usize>,
    /// Non-empty honeypot fields (name → value)
    pub honeypot_values: BTreeMap<String, String>,
    pub missing_fields: Vec<String>,
    pub max_field_length: usize,
    pub total_text_length: usize,

    /// Lower-cased, punctuation-stripped, stop-word-free tokens
    pub tokens: Vec<String>,
    pub url_count: usize,
    pub too_many_links: bool,
    /// Domains from email addresses and URLs, lower-cased, deduplicated
    pub domains: Vec<String>,
    /// Uppercase share of letters (0 when text is too short to judge)
    pub caps_ratio: f64,
    /// Spam pattern family → match count (only families that matched)
    pub pattern_hits: BTreeMap<String, usize>,

    pub telemetry: Option<Telemetry>,
    pub captcha_token: Option<String>,
    /// Signals dropped during normalization
    pub input_errors: Vec<String>,
}

impl FeatureSet {
    /// All field text joined, lower-cased (keyword matching input)
    pub fn lowered_text(&self) -> String {
        self.fields
            .values()
            .map(|v| v.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn has_missing_fields(&self) -> bool {
        !self.missing_fields.is_empty()
    }

    pub fn url_bucket(&self) -> &'static str {
        match self.url_count {
            0 => "0",
            1..=2 => "1-2",
            3..=5 => "3-5",
            _ => "6+",
        }
    }
}
