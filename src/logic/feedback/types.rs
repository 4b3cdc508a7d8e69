use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::features::FeatureSet;

// ============================================================================
// LABELS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Spam,
    Ham,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Spam => "spam",
            Label::Ham => "ham",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a label came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    Manual,
    Honeypot,
    UserFeedback,
    Automated,
}

impl LabelSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelSource::Manual => "manual",
            LabelSource::Honeypot => "honeypot",
            LabelSource::UserFeedback => "user_feedback",
            LabelSource::Automated => "automated",
        }
    }

    /// Automated labels only feed behavioral baselines
    pub fn trains_classifier(&self) -> bool {
        !matches!(self, LabelSource::Automated)
    }
}

impl fmt::Display for LabelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// TRAINING EXAMPLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub features: FeatureSet,
    pub label: Label,
    pub source: LabelSource,
    pub confidence: f64,
    pub recorded_at: DateTime<Utc>,
}

impl TrainingExample {
    pub fn new(
        features: FeatureSet,
        label: Label,
        source: LabelSource,
        confidence: f64,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            submission_id: features.submission_id,
            features,
            label,
            source,
            confidence: confidence.clamp(0.0, 1.0),
            recorded_at,
        }
    }
}

// ============================================================================
// RETRAINING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainReport {
    /// Installed classifier version, None when the model was left unchanged
    pub classifier_version: Option<u64>,
    pub classifier_samples: usize,
    pub baseline_version: Option<u64>,
    pub baseline_samples: usize,
    pub skipped: Vec<String>,
    pub finished_at: DateTime<Utc>,
}

impl RetrainReport {
    pub fn changed(&self) -> bool {
        self.classifier_version.is_some() || self.baseline_version.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetrainOutcome {
    Completed(RetrainReport),
    AlreadyRunning,
}
