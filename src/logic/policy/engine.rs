//! Decision Engine
//!
//! Logic only. Folds rule triggers, IP reputation, behavioral result and the
//! classifier probability into one score + action. Pure and deterministic:
//! the clock is never read here, `decided_at` comes from the feature set.

use crate::logic::baseline::{BehavioralResult, Recommendation};
use crate::logic::features::FeatureSet;
use crate::logic::model::ClassifierScore;
use crate::logic::reputation::IpReputationRecord;
use crate::logic::rules::{names, Severity, Trigger, TriggerKind};
use super::config::{Policy, Thresholds};
use super::types::{Action, DecisionResult};

// ============================================================================
// MAIN DECISION FUNCTION
// ============================================================================

pub fn decide(
    features: &FeatureSet,
    ip: &IpReputationRecord,
    triggers: &[Trigger],
    behavior: &BehavioralResult,
    classifier: Option<&ClassifierScore>,
    policy: &Policy,
) -> DecisionResult {
    let mut result = DecisionResult {
        submission_id: features.submission_id,
        score: 0.0,
        confidence: 0.0,
        action: Action::Allow,
        severity: Severity::Low,
        triggers: triggers.to_vec(),
        captcha_required: false,
        degraded: Vec::new(),
        decided_at: features.received_at,
        policy_version: policy.version,
        processing_time_us: 0,
    };

    // Hard triggers dominate everything below
    if triggers.iter().any(|t| t.hard) {
        result.score = 1.0;
        result.confidence = 1.0;
        result.action = Action::Block;
        result.severity = Severity::Critical;
        return result;
    }

    let weights = &policy.weights;
    let detectors = &policy.detectors;

    let rule_sum: f64 = triggers.iter().map(|t| t.weight).sum();
    let mut score = weights.rule * rule_sum;

    if detectors.ip_reputation {
        let contribution = weights.ip * ip.risk_score;
        score += contribution;
        result.triggers.push(signal(
            names::IP_REPUTATION,
            contribution,
            format!("risk {:.2} ({})", ip.risk_score, ip.tier),
        ));
    }

    let behavior_included = detectors.behavioral && behavior.is_available();
    if behavior_included {
        let contribution = weights.behavior * behavior.bot_score;
        score += contribution;
        result.triggers.push(signal(
            names::BEHAVIORAL,
            contribution,
            format!(
                "bot score {:.2}, confidence {:.2}, anomalies [{}]",
                behavior.bot_score,
                behavior.confidence,
                behavior.anomalies.join(", ")
            ),
        ));
    } else if detectors.behavioral {
        result.degraded.push(names::BEHAVIORAL.to_string());
    }

    let classifier = classifier.filter(|_| detectors.classifier);
    match classifier {
        Some(c) => {
            let contribution = weights.ml * c.probability;
            score += contribution;
            result.triggers.push(signal(
                names::CLASSIFIER,
                contribution,
                format!("spam probability {:.2} (model v{})", c.probability, c.model_version),
            ));
        }
        None if detectors.classifier => result.degraded.push(names::CLASSIFIER.to_string()),
        None => {}
    }

    let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 1.0 };
    result.score = score;
    result.severity = Severity::from_score(score);

    let mut action = threshold_action(score, &policy.thresholds);
    if action == Action::Allow
        && behavior_included
        && matches!(behavior.recommendation, Recommendation::Challenge | Recommendation::Block)
    {
        action = Action::Challenge;
    }
    if action == Action::Challenge && triggers.iter().any(|t| t.name == names::CAPTCHA_VERIFIED) {
        action = Action::Allow;
    }
    result.action = action;
    result.captcha_required = action == Action::Challenge;

    let behavior_confidence = if behavior_included { behavior.confidence } else { 0.0 };
    result.confidence = confidence(classifier, behavior_confidence, policy);

    result
}

// ============================================================================
// HELPERS
// ============================================================================

pub fn threshold_action(score: f64, thresholds: &Thresholds) -> Action {
    if score >= thresholds.block {
        Action::Block
    } else if score >= thresholds.quarantine {
        Action::Quarantine
    } else if score >= thresholds.challenge {
        Action::Challenge
    } else {
        Action::Allow
    }
}

fn signal(name: &str, contribution: f64, detail: String) -> Trigger {
    Trigger::soft(name, contribution, detail).with_kind(TriggerKind::Signal)
}

/// Classifier sample sufficiency and behavioral confidence, weighted
fn confidence(classifier: Option<&ClassifierScore>, behavior_confidence: f64, policy: &Policy) -> f64 {
    let cw = &policy.confidence_weights;
    let total = cw.classifier + cw.behavior;
    if total <= 0.0 {
        return 0.0;
    }

    let min_samples = policy.learning.min_training_samples.max(1) as f64;
    let sufficiency = classifier
        .map(|c| (c.training_samples as f64 / min_samples).min(1.0))
        .unwrap_or(0.0);

    let value = (cw.classifier * sufficiency + cw.behavior * behavior_confidence) / total;
    if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 }
}

// ============================================================================
// TESTS
// ============================================================================
