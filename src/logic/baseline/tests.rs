use chrono::Utc;

use super::*;
use super::storage::{load_baseline, save_baseline};
use super::validate::validate_baseline;
use crate::logic::error::ShieldError;
use crate::logic::features::layout::{BehaviorMetric, METRIC_VERSION};
use crate::logic::features::Telemetry;
use crate::logic::policy::config::BehaviorPolicy;

fn uniform_baseline(sample_count: u64) -> BehavioralBaseline {
    BehaviorMetric::ALL.iter().fold(BehavioralBaseline::new(3, Utc::now()), |b, m| {
        b.with_metric(*m, MetricStats { mean: 10.0, stddev: 1.0, sample_count })
    })
}

fn telemetry_at(value: f64) -> Telemetry {
    let mut t = Telemetry::default();
    for m in BehaviorMetric::ALL {
        t.set_metric(m, value);
    }
    t
}

#[test]
fn test_metric_stats_sample_stddev() {
    let stats = MetricStats::from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
    assert_eq!(stats.mean, 5.0);
    assert!((stats.stddev - 2.138).abs() < 1e-3);
    assert_eq!(stats.sample_count, 8);
    assert!(MetricStats::from_values(&[1.0]).is_none());
}

#[test]
fn test_from_samples_skips_sparse_metrics() {
    let samples: Vec<Telemetry> = (0..5)
        .map(|i| Telemetry { typing_speed_cpm: Some(200.0 + i as f64 * 10.0), ..Default::default() })
        .collect();
    let baseline = BehavioralBaseline::from_samples(1, Utc::now(), &samples);

    assert_eq!(baseline.metrics.len(), 1);
    let stats = baseline.stats(BehaviorMetric::TypingSpeed).unwrap();
    assert_eq!(stats.mean, 220.0);
    assert!(baseline.stats(BehaviorMetric::PasteCount).is_none());
}

#[test]
fn test_typical_telemetry_scores_low() {
    let result = analyze(Some(&telemetry_at(10.0)), &uniform_baseline(100), &BehaviorPolicy::default());
    assert!(result.bot_score < 0.1);
    assert_eq!(result.confidence, 1.0);
    assert_eq!(result.recommendation, Recommendation::Allow);
    assert!(result.anomalies.is_empty());
    assert_eq!(result.baseline_version, Some(3));
}

#[test]
fn test_outlier_telemetry_blocks_when_confident() {
    let result = analyze(Some(&telemetry_at(15.0)), &uniform_baseline(100), &BehaviorPolicy::default());
    assert!(result.bot_score > 0.95);
    assert_eq!(result.recommendation, Recommendation::Block);
    assert_eq!(result.anomalies.len(), 6);
}

#[test]
fn test_partial_telemetry_lowers_confidence() {
    let telemetry = Telemetry {
        typing_speed_cpm: Some(15.0),
        paste_count: Some(15.0),
        ..Default::default()
    };
    let result = analyze(Some(&telemetry), &uniform_baseline(100), &BehaviorPolicy::default());
    assert!((result.confidence - 2.0 / 6.0).abs() < 1e-9);
    // high score, but not confident enough to block
    assert_eq!(result.recommendation, Recommendation::Challenge);
}

#[test]
fn test_missing_telemetry_or_thin_baseline_is_unavailable() {
    let policy = BehaviorPolicy::default();
    let result = analyze(None, &uniform_baseline(100), &policy);
    assert_eq!(result.confidence, 0.0);
    assert!(!result.is_available());

    // below min_samples_per_metric every metric is skipped
    let result = analyze(Some(&telemetry_at(50.0)), &uniform_baseline(5), &policy);
    assert_eq!(result.confidence, 0.0);
    assert_eq!(result.bot_score, 0.0);
}

#[test]
fn test_zero_stddev_metric_is_skipped() {
    let baseline = uniform_baseline(100).with_metric(
        BehaviorMetric::PasteCount,
        MetricStats { mean: 0.0, stddev: 0.0, sample_count: 100 },
    );
    let result = analyze(Some(&telemetry_at(10.0)), &baseline, &BehaviorPolicy::default());
    assert!(!result.z_scores.contains_key("paste_count"));
    assert!((result.confidence - 5.0 / 6.0).abs() < 1e-9);
}

#[test]
fn test_reject_layout_mismatch() {
    let mut b = uniform_baseline(100);
    assert!(validate_baseline(&b).is_ok());

    b.metric_version = METRIC_VERSION + 1;
    assert!(matches!(validate_baseline(&b), Err(ShieldError::InvalidSnapshot(_))));
}

#[test]
fn test_reject_bad_statistics() {
    let b = uniform_baseline(100).with_metric(
        BehaviorMetric::PointerMoves,
        MetricStats { mean: f64::NAN, stddev: 1.0, sample_count: 100 },
    );
    assert!(validate_baseline(&b).is_err());

    let b = uniform_baseline(100).with_metric(
        BehaviorMetric::PointerMoves,
        MetricStats { mean: 1.0, stddev: -1.0, sample_count: 100 },
    );
    assert!(validate_baseline(&b).is_err());
}

#[test]
fn test_storage_roundtrip_and_rejects_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("baseline.json");

    let original = uniform_baseline(42);
    save_baseline(&original, &path).unwrap();
    assert_eq!(load_baseline(&path).unwrap(), original);

    std::fs::write(&path, b"{ not json").unwrap();
    assert!(load_baseline(&path).is_err());
    assert!(load_baseline(&dir.path().join("missing.json")).is_err());
}
