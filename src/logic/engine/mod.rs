//! Shield Engine - per-submission orchestration
//!
//! Wires the normalizer, rule engine, reputation tracker, behavioral
//! analyzer, classifier and decision function together, then applies the
//! side effects of a decision (reputation update, quarantine, notification,
//! training examples).
//!
//! # Flow
//! 1. `normalize` → `FeatureSet`
//! 2. IP reputation `get`
//! 3. Rule triggers (+ CAPTCHA trigger)
//! 4. Behavioral analysis against the active baseline snapshot
//! 5. Classifier score from the active model snapshot
//! 6. `decide`
//!
//! Scoring never fails: a missing snapshot or an unreachable CAPTCHA
//! provider is recorded in `DecisionResult::degraded` and scoring goes on.
//! A hard trigger skips the behavioral and classifier stages entirely.
//!
//! Scoring itself only touches memory. `evaluate` hands the quarantine
//! insert and dataset appends to the blocking pool; `judge` performs them
//! inline for synchronous callers.

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::logic::baseline::storage::{load_baseline, save_baseline, BASELINE_FILE};
use crate::logic::baseline::validate::validate_baseline;
use crate::logic::baseline::{analyze, BehavioralBaseline, BehavioralResult};
use crate::logic::captcha::{verify_with_timeout, CaptchaOutcome, CaptchaVerifier};
use crate::logic::error::{ShieldError, ShieldResult};
use crate::logic::events::{DecisionEvent, Notifier};
use crate::logic::features::{normalize, FeatureSet, SubmissionContext};
use crate::logic::dataset::DatasetWriter;
use crate::logic::feedback::{
    append_to_dataset, FeedbackLoop, FeedbackStats, Label, LabelSource, RetrainOutcome, TrainingExample,
};
use crate::logic::model::{load_model, save_model, ClassifierModel, MODEL_FILE};
use crate::logic::policy::{decide, Action, CompiledPolicy, DecisionResult, Policy, PolicyStore};
use crate::logic::quarantine::{QuarantineRecord, QuarantineStats, QuarantineStore, ReviewVerdict};
use crate::logic::reputation::{IpReputationTracker, Observation, ReputationStats};
use crate::logic::rules::{self, ensure_no_hard_trigger};
use crate::logic::snapshot::SnapshotCell;

// ============================================================================
// STATS
// ============================================================================

#[derive(Default)]
struct Counters {
    evaluated: AtomicU64,
    allowed: AtomicU64,
    challenged: AtomicU64,
    quarantined: AtomicU64,
    blocked: AtomicU64,
}

impl Counters {
    fn count(&self, action: Action) {
        self.evaluated.fetch_add(1, Ordering::Relaxed);
        let counter = match action {
            Action::Allow => &self.allowed,
            Action::Challenge => &self.challenged,
            Action::Quarantine => &self.quarantined,
            Action::Block => &self.blocked,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub evaluated: u64,
    pub allowed: u64,
    pub challenged: u64,
    pub quarantined: u64,
    pub blocked: u64,
    pub policy_version: u64,
    pub classifier_version: Option<u64>,
    pub baseline_version: Option<u64>,
    pub reputation: ReputationStats,
    pub feedback: FeedbackStats,
    pub quarantine: Option<QuarantineStats>,
}

// ============================================================================
// DEFERRED WRITES
// ============================================================================

/// Disk writes left behind by one decision
#[derive(Default)]
struct PendingWrites {
    record: Option<QuarantineRecord>,
    examples: Vec<TrainingExample>,
}

impl PendingWrites {
    fn is_empty(&self) -> bool {
        self.record.is_none() && self.examples.is_empty()
    }

    /// Failures are logged, never surfaced
    fn flush(self, quarantine: &dyn QuarantineStore, dataset: Option<&DatasetWriter>) {
        if let Some(record) = self.record {
            let (submission_id, record_id) = (record.decision.submission_id, record.id);
            match quarantine.insert(record) {
                Ok(true) => log::debug!("[submission {}] Stored as quarantine record {}", submission_id, record_id),
                Ok(false) => {
                    log::warn!("[submission {}] Quarantine full of pending records, block not logged", submission_id)
                }
                Err(e) => log::error!("[submission {}] Failed to store quarantine record: {}", submission_id, e),
            }
        }
        if let Some(writer) = dataset {
            for example in &self.examples {
                append_to_dataset(writer, example);
            }
        }
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct ShieldEngine {
    policy: Arc<PolicyStore>,
    reputation: IpReputationTracker,
    classifier: SnapshotCell<ClassifierModel>,
    baseline: SnapshotCell<BehavioralBaseline>,
    quarantine: Arc<dyn QuarantineStore>,
    notifier: Arc<dyn Notifier>,
    captcha: Option<Arc<dyn CaptchaVerifier>>,
    captcha_timeout: Option<std::time::Duration>,
    feedback: FeedbackLoop,
    data_dir: Option<PathBuf>,
    counters: Counters,
}

impl ShieldEngine {
    pub fn new(policy: Arc<PolicyStore>, quarantine: Arc<dyn QuarantineStore>, notifier: Arc<dyn Notifier>) -> Self {
        let feedback = FeedbackLoop::new(&policy.current().policy.learning);
        Self {
            policy,
            reputation: IpReputationTracker::new(),
            classifier: SnapshotCell::empty(),
            baseline: SnapshotCell::empty(),
            quarantine,
            notifier,
            captcha: None,
            captcha_timeout: None,
            feedback,
            data_dir: None,
            counters: Counters::default(),
        }
    }

    pub fn with_captcha(mut self, verifier: Arc<dyn CaptchaVerifier>) -> Self {
        self.captcha = Some(verifier);
        self
    }

    /// Override the policy's CAPTCHA timeout
    pub fn with_captcha_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.captcha_timeout = Some(timeout);
        self
    }

    pub fn with_feedback(mut self, feedback: FeedbackLoop) -> Self {
        self.feedback = feedback;
        self
    }

    /// Directory that holds persisted snapshots
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn policy_store(&self) -> &Arc<PolicyStore> {
        &self.policy
    }

    pub fn current_policy(&self) -> Arc<CompiledPolicy> {
        self.policy.current()
    }

    pub fn reputation(&self) -> &IpReputationTracker {
        &self.reputation
    }

    pub fn quarantine(&self) -> &Arc<dyn QuarantineStore> {
        &self.quarantine
    }

    pub fn feedback(&self) -> &FeedbackLoop {
        &self.feedback
    }

    // ========================================================================
    // EVALUATION
    // ========================================================================

    /// Verify the CAPTCHA token (if any) under the timeout, then judge.
    /// Quarantine and dataset writes run on the blocking pool.
    pub async fn evaluate(&self, ctx: SubmissionContext) -> DecisionResult {
        let outcome = self.verify_captcha(&ctx).await;
        let (decision, writes) = self.score(&ctx, outcome);
        if writes.is_empty() {
            return decision;
        }

        let quarantine = Arc::clone(&self.quarantine);
        let dataset = self.feedback.dataset().cloned();
        let flushed = tokio::task::spawn_blocking(move || writes.flush(quarantine.as_ref(), dataset.as_deref()));
        if let Err(e) = flushed.await {
            log::error!("[submission {}] Write task failed: {}", decision.submission_id, e);
        }
        decision
    }

    async fn verify_captcha(&self, ctx: &SubmissionContext) -> CaptchaOutcome {
        let compiled = self.policy.current();
        let policy = &compiled.policy;

        let token = match ctx.captcha_token.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() && policy.detectors.captcha => t.to_string(),
            _ => return CaptchaOutcome::NotPresented,
        };
        let Some(verifier) = self.captcha.clone() else {
            return CaptchaOutcome::Unverified("no captcha verifier configured".to_string());
        };

        let timeout = self
            .captcha_timeout
            .unwrap_or_else(|| std::time::Duration::from_millis(policy.captcha.timeout_ms));
        match verify_with_timeout(verifier, token, ctx.ip.trim().to_string(), timeout).await {
            Ok(verdict) => CaptchaOutcome::from_verdict(verdict, &policy.captcha),
            Err(e) => {
                log::warn!("[submission {}] CAPTCHA unverified: {}", ctx.submission_id, e);
                CaptchaOutcome::Unverified(e.to_string())
            }
        }
    }

    /// Score one submission and apply every side effect on the calling thread
    pub fn judge(&self, ctx: &SubmissionContext, captcha: CaptchaOutcome) -> DecisionResult {
        let (decision, writes) = self.score(ctx, captcha);
        writes.flush(self.quarantine.as_ref(), self.feedback.dataset().map(Arc::as_ref));
        decision
    }

    /// Decide and apply the in-memory side effects; disk writes are returned
    fn score(&self, ctx: &SubmissionContext, captcha: CaptchaOutcome) -> (DecisionResult, PendingWrites) {
        let started = Instant::now();
        let compiled = self.policy.current();
        let policy = &compiled.policy;

        let features = normalize(ctx, &compiled.normalize);
        let id = features.submission_id;
        for error in &features.input_errors {
            log::debug!("[submission {}] Input signal dropped: {}", id, error);
        }

        let ip = self.reputation.get(&features.ip, features.received_at, &policy.reputation);

        let mut triggers = rules::evaluate(&features, &ip, &compiled);
        if let Some(trigger) = captcha.to_trigger(&policy.captcha) {
            triggers.push(trigger);
        }

        // A hard trigger settles the decision; soft signals are not consulted
        let hard = ensure_no_hard_trigger(&triggers);
        let (behavior, classifier) = match &hard {
            Err(e) => {
                log::info!("[submission {}] {}", id, e);
                (BehavioralResult::unavailable(), None)
            }
            Ok(()) => {
                let classifier = if policy.detectors.classifier {
                    self.classifier.load().map(|model| model.score(&features))
                } else {
                    None
                };
                (self.behavior(&features, policy), classifier)
            }
        };

        let mut decision = decide(&features, &ip, &triggers, &behavior, classifier.as_ref(), policy);
        if let CaptchaOutcome::Unverified(reason) = &captcha {
            if hard.is_ok() {
                log::debug!("[submission {}] CAPTCHA signal dropped: {}", id, reason);
                decision.degraded.push("captcha".to_string());
            }
        }
        if !decision.degraded.is_empty() {
            log::debug!("[submission {}] Degraded signals: {}", id, decision.degraded.join(", "));
        }
        decision.processing_time_us = started.elapsed().as_micros() as u64;

        let writes = self.apply(ctx, &features, &decision, policy);

        log::info!(
            "[submission {}] {} score={:.3} confidence={:.2} triggers={} ({} us)",
            id,
            decision.action,
            decision.score,
            decision.confidence,
            decision.triggers.len(),
            decision.processing_time_us
        );
        (decision, writes)
    }

    fn behavior(&self, features: &FeatureSet, policy: &Policy) -> BehavioralResult {
        if !policy.detectors.behavioral {
            return BehavioralResult::unavailable();
        }
        match self.baseline.load() {
            Some(baseline) => analyze(features.telemetry.as_ref(), &baseline, &policy.behavior),
            None => BehavioralResult::unavailable(),
        }
    }

    /// In-memory side effects of a decision. Returns what still has to be
    /// written to disk.
    fn apply(
        &self,
        ctx: &SubmissionContext,
        features: &FeatureSet,
        decision: &DecisionResult,
        policy: &Policy,
    ) -> PendingWrites {
        let now = decision.decided_at;
        let mut writes = PendingWrites::default();

        if !features.honeypot_values.is_empty() {
            self.reputation.record_honeypot_violation(&features.ip, now, &policy.reputation);
            self.learn(
                TrainingExample::new(features.clone(), Label::Spam, LabelSource::Honeypot, 1.0, now),
                &mut writes,
            );
        }

        self.reputation.update(
            &features.ip,
            &Observation {
                endpoint: features.endpoint.clone(),
                outcome: decision.action.to_outcome(),
                score: decision.score,
                at: now,
            },
            &policy.reputation,
        );

        self.feedback.remember(features);

        writes.record = match decision.action {
            Action::Quarantine => Some(QuarantineRecord::new(
                decision.clone(),
                ctx.clone(),
                features.clone(),
                Duration::seconds(policy.quarantine.expiry_secs as i64),
            )),
            Action::Block if policy.quarantine.log_blocks => {
                Some(QuarantineRecord::logged(decision.clone(), ctx.clone(), features.clone()))
            }
            Action::Block | Action::Allow | Action::Challenge => None,
        };

        let notify = match decision.action {
            Action::Block => policy.notify.on_block,
            Action::Quarantine => policy.notify.on_quarantine,
            Action::Allow | Action::Challenge => false,
        };
        if notify {
            if let Some(event) = DecisionEvent::from_decision(decision, &features.endpoint, &features.ip) {
                self.notifier.notify(event);
            }
        }

        if decision.action == Action::Allow && features.telemetry.is_some() {
            self.learn(
                TrainingExample::new(features.clone(), Label::Ham, LabelSource::Automated, 1.0 - decision.score, now),
                &mut writes,
            );
        }

        self.counters.count(decision.action);
        writes
    }

    fn learn(&self, example: TrainingExample, writes: &mut PendingWrites) {
        if self.feedback.dataset().is_some() {
            writes.examples.push(example.clone());
        }
        self.feedback.admit(example);
    }

    // ========================================================================
    // LABELS & REVIEW
    // ========================================================================

    /// Label a recently judged submission (`RecordLabel`)
    pub fn record_label(
        &self,
        submission_id: Uuid,
        label: Label,
        source: LabelSource,
        confidence: f64,
    ) -> ShieldResult<TrainingExample> {
        self.feedback.record_label(submission_id, label, source, confidence, Utc::now())
    }

    /// Close a quarantine record and feed the verdict back as a label
    pub fn review(
        &self,
        record_id: Uuid,
        verdict: ReviewVerdict,
        reviewer: &str,
        notes: Option<&str>,
    ) -> ShieldResult<QuarantineRecord> {
        let now = Utc::now();
        let record = self.quarantine.review(record_id, verdict, reviewer, notes, now)?;
        if let Some(example) = record.to_training_example(now) {
            self.feedback.record_example(example);
        }
        log::info!(
            "[submission {}] Quarantine record {} reviewed by {}: {}",
            record.decision.submission_id,
            record.id,
            reviewer,
            record.review_status
        );
        Ok(record)
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Expire unreviewed records; each becomes an automated spam example
    pub fn expire_quarantine(&self, now: DateTime<Utc>) -> ShieldResult<usize> {
        let expired = self.quarantine.expire(now)?;
        for record in &expired {
            if let Some(example) = record.to_training_example(now) {
                self.feedback.record_example(example);
            }
        }
        if !expired.is_empty() {
            log::info!("Expired {} unreviewed quarantine records", expired.len());
        }
        Ok(expired.len())
    }

    pub fn sweep_reputation(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.policy.current().policy.reputation.ttl_secs;
        self.reputation.sweep(now, Duration::seconds(ttl as i64))
    }

    pub fn retrain(&self, now: DateTime<Utc>) -> RetrainOutcome {
        let compiled = self.policy.current();
        self.feedback.retrain(now, &compiled.policy.learning, &self.classifier, &self.baseline)
    }

    pub fn reload_policy(&self, policy: Policy) -> ShieldResult<u64> {
        self.policy.reload(policy)
    }

    // ========================================================================
    // SNAPSHOTS
    // ========================================================================

    pub fn classifier(&self) -> Option<Arc<ClassifierModel>> {
        self.classifier.load()
    }

    pub fn baseline(&self) -> Option<Arc<BehavioralBaseline>> {
        self.baseline.load()
    }

    pub fn install_classifier(&self, model: ClassifierModel) -> ShieldResult<()> {
        if !model.is_consistent() {
            return Err(ShieldError::InvalidSnapshot(format!(
                "classifier v{} is inconsistent",
                model.version
            )));
        }
        log::info!("Classifier v{} installed ({} samples)", model.version, model.training_sample_count);
        self.classifier.store(model);
        Ok(())
    }

    pub fn install_baseline(&self, baseline: BehavioralBaseline) -> ShieldResult<()> {
        validate_baseline(&baseline)?;
        log::info!("Behavioral baseline v{} installed ({} metrics)", baseline.version, baseline.metrics.len());
        self.baseline.store(baseline);
        Ok(())
    }

    /// Load persisted snapshots from the data directory. A missing or
    /// invalid file leaves that detector unloaded.
    pub fn load_snapshots(&self) {
        let Some(dir) = self.data_dir.as_deref() else {
            return;
        };

        let model_path = dir.join(MODEL_FILE);
        if model_path.exists() {
            if let Err(e) = load_model(&model_path).and_then(|m| self.install_classifier(m)) {
                log::warn!("Classifier snapshot {} rejected: {}", model_path.display(), e);
            }
        } else {
            log::info!("No classifier snapshot at {}, starting without one", model_path.display());
        }

        let baseline_path = dir.join(BASELINE_FILE);
        if baseline_path.exists() {
            if let Err(e) = load_baseline(&baseline_path).and_then(|b| self.install_baseline(b)) {
                log::warn!("Baseline snapshot {} rejected: {}", baseline_path.display(), e);
            }
        } else {
            log::info!("No baseline snapshot at {}, starting without one", baseline_path.display());
        }
    }

    /// Write the active snapshots to the data directory
    pub fn persist_snapshots(&self) -> ShieldResult<()> {
        let Some(dir) = self.data_dir.as_deref() else {
            return Ok(());
        };
        if let Some(model) = self.classifier.load() {
            save_model(&model, &dir.join(MODEL_FILE))?;
        }
        if let Some(baseline) = self.baseline.load() {
            save_baseline(&baseline, &dir.join(BASELINE_FILE))?;
        }
        Ok(())
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub fn stats(&self) -> EngineStats {
        let quarantine = match self.quarantine.stats() {
            Ok(stats) => Some(stats),
            Err(e) => {
                log::warn!("Quarantine stats unavailable: {}", e);
                None
            }
        };
        EngineStats {
            evaluated: self.counters.evaluated.load(Ordering::Relaxed),
            allowed: self.counters.allowed.load(Ordering::Relaxed),
            challenged: self.counters.challenged.load(Ordering::Relaxed),
            quarantined: self.counters.quarantined.load(Ordering::Relaxed),
            blocked: self.counters.blocked.load(Ordering::Relaxed),
            policy_version: self.policy.version(),
            classifier_version: self.classifier.load().map(|m| m.version),
            baseline_version: self.baseline.load().map(|b| b.version),
            reputation: self.reputation.stats(),
            feedback: self.feedback.stats(),
            quarantine,
        }
    }
}
