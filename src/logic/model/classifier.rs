//! Naive Bayes spam classifier
//!
//! Multinomial model over `feature_tokens`. Built in one pass by `train` and
//! never modified afterwards; a retrain produces a fresh value that replaces
//! the active snapshot.

use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::features::FeatureSet;
use crate::logic::feedback::types::{Label, TrainingExample};
use super::tokens::feature_tokens;

// ============================================================================
// DATA STRUCTURES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenLikelihood {
    pub spam: f64,
    pub ham: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierModel {
    pub version: u64,
    pub trained_at: DateTime<Utc>,
    pub training_sample_count: usize,
    pub spam_examples: usize,
    pub ham_examples: usize,
    pub log_prior_spam: f64,
    pub log_prior_ham: f64,
    /// ln P(token | class), add-one smoothed over the kept vocabulary
    pub token_log_likelihoods: BTreeMap<String, TokenLikelihood>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierScore {
    pub probability: f64,
    /// Distance from an undecided 0.5, scaled to [0,1]
    pub confidence: f64,
    pub model_version: u64,
    pub training_samples: usize,
}

// ============================================================================
// TRAINING
// ============================================================================

#[derive(Default)]
struct ClassCounts {
    spam: u64,
    ham: u64,
}

impl ClassifierModel {
    pub fn train(
        examples: &[TrainingExample],
        version: u64,
        trained_at: DateTime<Utc>,
        min_token_frequency: usize,
    ) -> Self {
        let mut counts: BTreeMap<String, ClassCounts> = BTreeMap::new();
        let mut spam_examples = 0usize;
        let mut ham_examples = 0usize;

        for example in examples {
            match example.label {
                Label::Spam => spam_examples += 1,
                Label::Ham => ham_examples += 1,
            }
            for token in feature_tokens(&example.features) {
                let entry = counts.entry(token).or_default();
                match example.label {
                    Label::Spam => entry.spam += 1,
                    Label::Ham => entry.ham += 1,
                }
            }
        }

        counts.retain(|_, c| (c.spam + c.ham) as usize >= min_token_frequency.max(1));

        let vocab = counts.len() as f64;
        let spam_total: u64 = counts.values().map(|c| c.spam).sum();
        let ham_total: u64 = counts.values().map(|c| c.ham).sum();
        let spam_denom = (spam_total as f64 + vocab).max(1.0);
        let ham_denom = (ham_total as f64 + vocab).max(1.0);

        let token_log_likelihoods = counts
            .into_iter()
            .map(|(token, c)| {
                let ll = TokenLikelihood {
                    spam: ((c.spam as f64 + 1.0) / spam_denom).ln(),
                    ham: ((c.ham as f64 + 1.0) / ham_denom).ln(),
                };
                (token, ll)
            })
            .collect();

        let n = (spam_examples + ham_examples) as f64;
        Self {
            version,
            trained_at,
            training_sample_count: spam_examples + ham_examples,
            spam_examples,
            ham_examples,
            log_prior_spam: ((spam_examples as f64 + 1.0) / (n + 2.0)).ln(),
            log_prior_ham: ((ham_examples as f64 + 1.0) / (n + 2.0)).ln(),
            token_log_likelihoods,
        }
    }

    // ========================================================================
    // SCORING
    // ========================================================================

    /// P(spam | features). Tokens outside the vocabulary carry no evidence.
    pub fn score(&self, features: &FeatureSet) -> ClassifierScore {
        let mut log_spam = self.log_prior_spam;
        let mut log_ham = self.log_prior_ham;

        for token in feature_tokens(features) {
            if let Some(ll) = self.token_log_likelihoods.get(&token) {
                log_spam += ll.spam;
                log_ham += ll.ham;
            }
        }

        let max = log_spam.max(log_ham);
        let spam = (log_spam - max).exp();
        let ham = (log_ham - max).exp();
        let probability = (spam / (spam + ham)).clamp(0.0, 1.0);
        let probability = if probability.is_finite() { probability } else { 0.5 };

        ClassifierScore {
            probability,
            confidence: ((probability - 0.5).abs() * 2.0).clamp(0.0, 1.0),
            model_version: self.version,
            training_samples: self.training_sample_count,
        }
    }

    pub fn vocabulary_size(&self) -> usize {
        self.token_log_likelihoods.len()
    }

    /// Internal consistency check used when loading a persisted model
    pub fn is_consistent(&self) -> bool {
        self.training_sample_count == self.spam_examples + self.ham_examples
            && self.log_prior_spam.is_finite()
            && self.log_prior_ham.is_finite()
            && self.log_prior_spam <= 0.0
            && self.log_prior_ham <= 0.0
            && self
                .token_log_likelihoods
                .values()
                .all(|ll| ll.spam.is_finite() && ll.ham.is_finite() && ll.spam <= 0.0 && ll.ham <= 0.0)
    }
}
