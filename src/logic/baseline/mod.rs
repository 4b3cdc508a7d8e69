//! Baseline Module - Behavioral Analysis Engine
//!
//! Compares submission telemetry against learned population baselines and
//! produces a bot-likelihood score + confidence.
//!
//! # Architecture
//! - `types.rs`: `BehavioralBaseline`, `MetricStats`, `BehavioralResult`
//! - `validate.rs`: Layout/statistics validation
//! - `storage.rs`: Persistent storage with validation
//!
//! # Failure Strategy
//! Invalid baseline on load → start without one (analyzer reports confidence 0).
//! The analyzer never mutates a baseline; new versions come from the feedback loop.

pub mod types;
pub mod validate;
pub mod storage;
#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

use crate::logic::features::layout::{BehaviorMetric, METRIC_COUNT};
use crate::logic::features::Telemetry;
use crate::logic::policy::config::BehaviorPolicy;

pub use types::{BehavioralBaseline, BehavioralResult, MetricStats, Recommendation};

// ============================================================================
// CONSTANTS
// ============================================================================

const MIN_STDDEV: f64 = 1e-9;
const BLOCK_SCORE: f64 = 0.8;
const BLOCK_CONFIDENCE: f64 = 0.7;
const CHALLENGE_SCORE: f64 = 0.6;

// ============================================================================
// ANALYSIS
// ============================================================================

pub fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub fn recommend(bot_score: f64, confidence: f64) -> Recommendation {
    if bot_score >= BLOCK_SCORE && confidence >= BLOCK_CONFIDENCE {
        Recommendation::Block
    } else if bot_score >= CHALLENGE_SCORE {
        Recommendation::Challenge
    } else {
        Recommendation::Allow
    }
}

/// Score telemetry against a baseline. Metrics without telemetry or without
/// usable baseline statistics are skipped and lower the confidence.
pub fn analyze(
    telemetry: Option<&Telemetry>,
    baseline: &BehavioralBaseline,
    policy: &BehaviorPolicy,
) -> BehavioralResult {
    let Some(telemetry) = telemetry else {
        return BehavioralResult::unavailable();
    };

    let mut z_scores = BTreeMap::new();
    for metric in BehaviorMetric::ALL {
        let (Some(value), Some(stats)) = (telemetry.metric(metric), baseline.stats(metric)) else {
            continue;
        };
        if stats.sample_count < policy.min_samples_per_metric || stats.stddev < MIN_STDDEV {
            continue;
        }
        let z = stats.z_score(value);
        if z.is_finite() {
            z_scores.insert(metric.as_str().to_string(), z);
        }
    }

    if z_scores.is_empty() {
        return BehavioralResult {
            baseline_version: Some(baseline.version),
            ..BehavioralResult::unavailable()
        };
    }

    let mean_abs_z = z_scores.values().map(|z| z.abs()).sum::<f64>() / z_scores.len() as f64;
    let bot_score = logistic(policy.steepness * (mean_abs_z - policy.midpoint)).clamp(0.0, 1.0);
    let confidence = (z_scores.len() as f64 / METRIC_COUNT as f64).clamp(0.0, 1.0);
    let anomalies = z_scores
        .iter()
        .filter(|(_, z)| z.abs() >= policy.anomaly_z)
        .map(|(name, _)| name.clone())
        .collect();

    BehavioralResult {
        bot_score,
        confidence,
        recommendation: recommend(bot_score, confidence),
        z_scores,
        anomalies,
        baseline_version: Some(baseline.version),
    }
}
