//! Feedback Module - labels in, new model snapshots out
//!
//! Collects `TrainingExample`s from reviewer verdicts, honeypot hits, end-user
//! feedback and allowed traffic, keeps bounded windows of them and
//! periodically rebuilds the classifier and the behavioral baseline.
//!
//! Classifier-eligible labels and `automated` examples live in separate
//! windows of `window_size` each, so a flood of allowed traffic can never
//! push reviewer or honeypot labels out.
//!
//! Retraining builds complete new values off to the side and installs them
//! with one pointer swap each; scoring never sees a half-built model. Only
//! one retrain runs at a time.

pub mod types;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use uuid::Uuid;

use crate::logic::baseline::BehavioralBaseline;
use crate::logic::dataset::DatasetWriter;
use crate::logic::error::{ShieldError, ShieldResult};
use crate::logic::features::FeatureSet;
use crate::logic::model::ClassifierModel;
use crate::logic::policy::config::LearningPolicy;
use crate::logic::snapshot::SnapshotCell;

pub use types::{Label, LabelSource, RetrainOutcome, RetrainReport, TrainingExample};

// ============================================================================
// RECENT FEATURE CACHE
// ============================================================================

/// Bounded id → FeatureSet map, oldest evicted first
struct FeatureCache {
    entries: HashMap<Uuid, FeatureSet>,
    order: VecDeque<Uuid>,
    capacity: usize,
}

impl FeatureCache {
    fn new(capacity: usize) -> Self {
        Self { entries: HashMap::new(), order: VecDeque::new(), capacity: capacity.max(1) }
    }

    fn insert(&mut self, features: FeatureSet) {
        let id = features.submission_id;
        if self.entries.insert(id, features).is_none() {
            self.order.push_back(id);
        }
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.entries.remove(&old);
            }
        }
    }

    fn get(&self, id: &Uuid) -> Option<&FeatureSet> {
        self.entries.get(id)
    }
}

// ============================================================================
// EXAMPLE WINDOWS
// ============================================================================

#[derive(Default)]
struct Windows {
    labeled: VecDeque<TrainingExample>,
    automated: VecDeque<TrainingExample>,
}

impl Windows {
    fn push(&mut self, example: TrainingExample, capacity: usize) {
        let window = if example.source.trains_classifier() {
            &mut self.labeled
        } else {
            &mut self.automated
        };
        while window.len() >= capacity {
            window.pop_front();
        }
        window.push_back(example);
    }

    fn iter(&self) -> impl Iterator<Item = &TrainingExample> {
        self.labeled.iter().chain(self.automated.iter())
    }

    fn len(&self) -> usize {
        self.labeled.len() + self.automated.len()
    }
}

// ============================================================================
// FEEDBACK LOOP
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedbackStats {
    pub window: usize,
    pub classifier_eligible: usize,
    pub spam: usize,
    pub ham: usize,
    pub with_telemetry: usize,
    pub labels_recorded: u64,
    pub retrains: u64,
}

/// Resets the single-flight flag when a retrain finishes or unwinds
struct RetrainGuard<'a>(&'a AtomicBool);

impl Drop for RetrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct FeedbackLoop {
    windows: RwLock<Windows>,
    window_size: usize,
    recent: Mutex<FeatureCache>,
    writer: Option<Arc<DatasetWriter>>,
    retraining: AtomicBool,
    labels_recorded: AtomicU64,
    retrains: AtomicU64,
}

impl FeedbackLoop {
    pub fn new(learning: &LearningPolicy) -> Self {
        Self {
            windows: RwLock::new(Windows::default()),
            window_size: learning.window_size.max(1),
            recent: Mutex::new(FeatureCache::new(learning.feature_cache_size)),
            writer: None,
            retraining: AtomicBool::new(false),
            labels_recorded: AtomicU64::new(0),
            retrains: AtomicU64::new(0),
        }
    }

    /// Also append every new example to a JSONL dataset
    pub fn with_dataset(mut self, writer: DatasetWriter) -> Self {
        self.writer = Some(Arc::new(writer));
        self
    }

    pub fn dataset(&self) -> Option<&Arc<DatasetWriter>> {
        self.writer.as_ref()
    }

    /// Keep a judged submission's features so a later label can refer to it
    pub fn remember(&self, features: &FeatureSet) {
        self.recent.lock().insert(features.clone());
    }

    /// Label a recently judged submission by id (`RecordLabel`)
    pub fn record_label(
        &self,
        submission_id: Uuid,
        label: Label,
        source: LabelSource,
        confidence: f64,
        now: DateTime<Utc>,
    ) -> ShieldResult<TrainingExample> {
        let features = self
            .recent
            .lock()
            .get(&submission_id)
            .cloned()
            .ok_or_else(|| ShieldError::Input(format!("no recent features for submission {}", submission_id)))?;

        let example = TrainingExample::new(features, label, source, confidence, now);
        self.record_example(example.clone());
        Ok(example)
    }

    /// Admit an example and append it to the dataset
    pub fn record_example(&self, example: TrainingExample) {
        if let Some(writer) = &self.writer {
            append_to_dataset(writer, &example);
        }
        self.admit(example);
    }

    /// Admit an example into the in-memory window only. The caller owns
    /// the dataset append (see `dataset`).
    pub fn admit(&self, example: TrainingExample) {
        log::debug!(
            "[submission {}] Recorded {} label from {}",
            example.submission_id,
            example.label,
            example.source
        );
        self.push(example);
        self.labels_recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Restore examples read back from the dataset (not re-written)
    pub fn preload(&self, examples: Vec<TrainingExample>) {
        let count = examples.len();
        for example in examples {
            self.push(example);
        }
        log::info!("Feedback window preloaded with {} examples", count);
    }

    fn push(&self, example: TrainingExample) {
        self.windows.write().push(example, self.window_size);
    }

    pub fn len(&self) -> usize {
        self.windows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_retraining(&self) -> bool {
        self.retraining.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> FeedbackStats {
        let windows = self.windows.read();
        let mut stats = FeedbackStats {
            window: windows.len(),
            classifier_eligible: windows.labeled.len(),
            labels_recorded: self.labels_recorded.load(Ordering::Relaxed),
            retrains: self.retrains.load(Ordering::Relaxed),
            ..Default::default()
        };
        for e in windows.iter() {
            match e.label {
                Label::Spam => stats.spam += 1,
                Label::Ham => stats.ham += 1,
            }
            if e.features.telemetry.is_some() {
                stats.with_telemetry += 1;
            }
        }
        stats
    }

    // ========================================================================
    // RETRAINING
    // ========================================================================

    /// Rebuild classifier and baseline from the current windows and install
    /// whichever has enough data. Never runs concurrently with itself.
    pub fn retrain(
        &self,
        now: DateTime<Utc>,
        learning: &LearningPolicy,
        classifier: &SnapshotCell<ClassifierModel>,
        baseline: &SnapshotCell<BehavioralBaseline>,
    ) -> RetrainOutcome {
        if self
            .retraining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("Retrain already in progress, skipping");
            return RetrainOutcome::AlreadyRunning;
        }
        let _guard = RetrainGuard(&self.retraining);

        let (labeled, automated): (Vec<TrainingExample>, Vec<TrainingExample>) = {
            let windows = self.windows.read();
            (windows.labeled.iter().cloned().collect(), windows.automated.iter().cloned().collect())
        };
        let mut report = RetrainReport {
            classifier_version: None,
            classifier_samples: 0,
            baseline_version: None,
            baseline_samples: 0,
            skipped: Vec::new(),
            finished_at: now,
        };

        // Classifier
        report.classifier_samples = labeled.len();
        if labeled.len() < learning.min_training_samples {
            report.skipped.push(format!(
                "classifier: {} of {} required samples",
                labeled.len(),
                learning.min_training_samples
            ));
        } else {
            let version = classifier.load().map_or(1, |m| m.version + 1);
            let model = ClassifierModel::train(&labeled, version, now, learning.min_token_frequency);
            log::info!(
                "Classifier v{} trained on {} examples ({} spam / {} ham, {} tokens)",
                version,
                model.training_sample_count,
                model.spam_examples,
                model.ham_examples,
                model.vocabulary_size()
            );
            classifier.store(model);
            report.classifier_version = Some(version);
        }

        // Behavioral baseline: telemetry of legitimate traffic only
        let telemetry: Vec<_> = labeled
            .iter()
            .chain(automated.iter())
            .filter(|e| e.label == Label::Ham)
            .filter_map(|e| e.features.telemetry.as_ref())
            .collect();
        report.baseline_samples = telemetry.len();
        if telemetry.len() < learning.min_baseline_samples {
            report.skipped.push(format!(
                "baseline: {} of {} required telemetry samples",
                telemetry.len(),
                learning.min_baseline_samples
            ));
        } else {
            let version = baseline.load().map_or(1, |b| b.version + 1);
            let next = BehavioralBaseline::from_samples(version, now, telemetry.iter().copied());
            if next.metrics.is_empty() {
                report.skipped.push("baseline: no metric had enough samples".to_string());
            } else {
                log::info!(
                    "Behavioral baseline v{} built from {} samples ({} metrics)",
                    version,
                    telemetry.len(),
                    next.metrics.len()
                );
                baseline.store(next);
                report.baseline_version = Some(version);
            }
        }

        for reason in &report.skipped {
            log::info!("Retrain skipped {}", reason);
        }
        self.retrains.fetch_add(1, Ordering::Relaxed);
        RetrainOutcome::Completed(report)
    }
}

/// Append one example, logging instead of failing
pub fn append_to_dataset(writer: &DatasetWriter, example: &TrainingExample) {
    if let Err(e) = writer.append(example) {
        log::error!("[submission {}] Failed to append to dataset: {}", example.submission_id, e);
    }
}
