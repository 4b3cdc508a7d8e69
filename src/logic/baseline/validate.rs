use crate::logic::error::{ShieldError, ShieldResult};
use crate::logic::features::layout::{is_layout_compatible, layout_hash, BehaviorMetric, METRIC_VERSION};
use super::types::BehavioralBaseline;

/// Validate baseline compatibility with the current metric layout and
/// sanity of its statistics.
pub fn validate_baseline(baseline: &BehavioralBaseline) -> ShieldResult<()> {
    if !is_layout_compatible(baseline.metric_version, baseline.layout_hash) {
        return Err(ShieldError::InvalidSnapshot(format!(
            "baseline layout mismatch: expected v{} ({:x}), got v{} ({:x})",
            METRIC_VERSION,
            layout_hash(),
            baseline.metric_version,
            baseline.layout_hash
        )));
    }

    for (name, stats) in &baseline.metrics {
        if BehaviorMetric::from_name(name).is_none() {
            return Err(ShieldError::InvalidSnapshot(format!("unknown metric '{}'", name)));
        }
        if !stats.mean.is_finite() || !stats.stddev.is_finite() {
            return Err(ShieldError::InvalidSnapshot(format!("non-finite statistics for '{}'", name)));
        }
        if stats.stddev < 0.0 {
            return Err(ShieldError::InvalidSnapshot(format!("negative stddev for '{}'", name)));
        }
    }

    Ok(())
}
