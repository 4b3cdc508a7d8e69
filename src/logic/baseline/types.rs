use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::features::layout::{layout_hash, BehaviorMetric, METRIC_VERSION};
use crate::logic::features::Telemetry;

// ============================================================================
// BEHAVIORAL BASELINE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub mean: f64,
    /// Sample standard deviation (n - 1)
    pub stddev: f64,
    pub sample_count: u64,
}

impl MetricStats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let n = values.len();
        if n < 2 {
            return None;
        }
        let mean = values.iter().sum::<f64>() / n as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        Some(Self { mean, stddev: variance.sqrt(), sample_count: n as u64 })
    }

    pub fn z_score(&self, value: f64) -> f64 {
        (value - self.mean) / self.stddev
    }
}

/// Learned population statistics per telemetry metric. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralBaseline {
    pub version: u64,
    pub metric_version: u8,
    pub layout_hash: u32,
    pub created_at: DateTime<Utc>,
    /// Keyed by metric name (layout order is not required here)
    pub metrics: BTreeMap<String, MetricStats>,
}

impl BehavioralBaseline {
    pub fn new(version: u64, created_at: DateTime<Utc>) -> Self {
        Self {
            version,
            metric_version: METRIC_VERSION,
            layout_hash: layout_hash(),
            created_at,
            metrics: BTreeMap::new(),
        }
    }

    /// Build statistics from telemetry samples
    pub fn from_samples<'a>(
        version: u64,
        created_at: DateTime<Utc>,
        samples: impl IntoIterator<Item = &'a Telemetry>,
    ) -> Self {
        let mut columns: BTreeMap<BehaviorMetric, Vec<f64>> = BTreeMap::new();
        for telemetry in samples {
            for metric in BehaviorMetric::ALL {
                if let Some(v) = telemetry.metric(metric) {
                    columns.entry(metric).or_default().push(v);
                }
            }
        }

        let mut baseline = Self::new(version, created_at);
        for (metric, values) in columns {
            if let Some(stats) = MetricStats::from_values(&values) {
                baseline.metrics.insert(metric.as_str().to_string(), stats);
            }
        }
        baseline
    }

    pub fn with_metric(mut self, metric: BehaviorMetric, stats: MetricStats) -> Self {
        self.metrics.insert(metric.as_str().to_string(), stats);
        self
    }

    pub fn stats(&self, metric: BehaviorMetric) -> Option<&MetricStats> {
        self.metrics.get(metric.as_str())
    }
}

// ============================================================================
// ANALYSIS RESULT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Allow,
    Challenge,
    Block,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Allow => "allow",
            Recommendation::Challenge => "challenge",
            Recommendation::Block => "block",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralResult {
    pub bot_score: f64,
    pub confidence: f64,
    pub recommendation: Recommendation,
    pub z_scores: BTreeMap<String, f64>,
    /// Metrics with |z| past the anomaly threshold
    pub anomalies: Vec<String>,
    pub baseline_version: Option<u64>,
}

impl BehavioralResult {
    /// No telemetry, or no baseline: contributes nothing
    pub fn unavailable() -> Self {
        Self {
            bot_score: 0.0,
            confidence: 0.0,
            recommendation: Recommendation::Allow,
            z_scores: BTreeMap::new(),
            anomalies: Vec::new(),
            baseline_version: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.confidence > 0.0
    }
}
