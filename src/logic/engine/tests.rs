use std::time::Duration as StdDuration;
use chrono::Duration;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

use super::*;
use crate::logic::baseline::MetricStats;
use crate::logic::captcha::CaptchaVerdict;
use crate::logic::events::{events, ChannelNotifier};
use crate::logic::features::BehaviorMetric;
use crate::logic::policy::config::CustomRule;
use crate::logic::quarantine::{MemoryQuarantineStore, ReviewStatus};
use crate::logic::rules::names;

const UA: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0";

fn engine_with(policy: Policy) -> (ShieldEngine, UnboundedReceiver<DecisionEvent>) {
    let store = Arc::new(PolicyStore::new(policy).unwrap());
    let (notifier, rx) = ChannelNotifier::new();
    let engine = ShieldEngine::new(store, Arc::new(MemoryQuarantineStore::new(100)), Arc::new(notifier));
    (engine, rx)
}

fn engine() -> (ShieldEngine, UnboundedReceiver<DecisionEvent>) {
    engine_with(Policy::default())
}

fn submission(ip: &str, message: &str) -> SubmissionContext {
    SubmissionContext::new(ip)
        .with_endpoint("/contact")
        .with_user_agent(UA)
        .with_field("name", "Dana")
        .with_field("message", message)
}

fn crypto_rule() -> CustomRule {
    CustomRule {
        id: "crypto_wallet".to_string(),
        name: "Crypto wallet pitch".to_string(),
        description: String::new(),
        pattern: "(?i)crypto wallet".to_string(),
        field: "*".to_string(),
        weight: 0.6,
        hard: false,
        enabled: true,
    }
}

struct Slow;

impl CaptchaVerifier for Slow {
    fn verify(&self, _token: &str, _ip: &str) -> ShieldResult<CaptchaVerdict> {
        std::thread::sleep(StdDuration::from_millis(300));
        Ok(CaptchaVerdict { passed: true, trust_score: 1.0 })
    }
}

// ============================================================================
// DECISIONS
// ============================================================================

#[tokio::test]
async fn test_clean_submission_without_snapshots_is_allowed() {
    let (engine, mut rx) = engine();
    let ctx = submission("192.0.2.10", "Hello, could you send pricing details for the team plan?");

    let decision = engine.evaluate(ctx.clone()).await;
    assert_eq!(decision.submission_id, ctx.submission_id);
    assert_eq!(decision.action, Action::Allow);
    assert!((decision.score - 0.06).abs() < 1e-9, "score {}", decision.score);
    assert_eq!(decision.degraded, vec![names::BEHAVIORAL.to_string(), names::CLASSIFIER.to_string()]);
    assert_eq!(decision.confidence, 0.0);
    assert!(rx.try_recv().is_err());
    assert_eq!(engine.stats().allowed, 1);
}

#[tokio::test]
async fn test_honeypot_blocks_logs_and_notifies() {
    let (engine, mut rx) = engine();
    let ctx = submission("198.51.100.7", "Hello there").with_field("_hp", "x");

    let decision = engine.evaluate(ctx).await;
    assert_eq!(decision.action, Action::Block);
    assert_eq!(decision.score, 1.0);
    assert_eq!(decision.confidence, 1.0);
    assert!(decision.degraded.is_empty());
    assert!(decision.trigger(names::HONEYPOT).unwrap().hard);

    let event = rx.try_recv().unwrap();
    assert_eq!(event.event, events::SUBMISSION_BLOCKED);
    assert_eq!(event.submission_id, decision.submission_id);

    // blocks are logged for review
    let held = engine.quarantine().list(None, 10).unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].decision.action, Action::Block);
    assert_eq!(held[0].review_status, ReviewStatus::Logged);

    let ip = engine.reputation().peek("198.51.100.7").unwrap();
    assert_eq!(ip.honeypot_violations, 1);
    assert_eq!(ip.block_count, 1);

    let stats = engine.feedback().stats();
    assert_eq!(stats.spam, 1);
    assert_eq!(stats.classifier_eligible, 1);
}

#[tokio::test]
async fn test_three_honeypot_hits_flag_ip_for_later_clean_submissions() {
    let (engine, _rx) = engine();
    let ip = "203.0.113.5";
    for _ in 0..3 {
        engine.evaluate(submission(ip, "hi").with_field("_hp", "filled")).await;
    }
    assert!(engine.reputation().peek(ip).unwrap().flagged);

    let decision = engine.evaluate(submission(ip, "A perfectly normal question about invoices")).await;
    assert_eq!(decision.action, Action::Block);
    assert!(decision.trigger(names::FLAGGED_IP).is_some());
}

#[tokio::test]
async fn test_blocked_keyword_challenges() {
    let (engine, _rx) = engine();
    let decision = engine.evaluate(submission("192.0.2.20", "Join our casino tonight")).await;
    // 0.5 keyword + 0.2 * 0.3 initial IP risk
    assert!((decision.score - 0.56).abs() < 1e-9, "score {}", decision.score);
    assert_eq!(decision.action, Action::Challenge);
    assert!(decision.captcha_required);
}

#[tokio::test]
async fn test_verified_captcha_satisfies_challenge() {
    let (engine, _rx) = engine();
    let ctx = submission("192.0.2.21", "Join our casino tonight");
    let decision = engine.judge(&ctx, CaptchaOutcome::Verified { trust: 1.0 });

    let credit = decision.trigger(names::CAPTCHA_VERIFIED).unwrap();
    assert!((credit.weight + 0.2).abs() < 1e-9);
    assert_eq!(decision.action, Action::Allow);
    assert!(!decision.captcha_required);
}

#[tokio::test]
async fn test_failed_captcha_adds_weight() {
    let (engine, _rx) = engine();
    let ctx = submission("192.0.2.22", "Just checking in about my order");
    let decision = engine.judge(&ctx, CaptchaOutcome::Failed { trust: 0.1 });
    assert_eq!(decision.trigger(names::CAPTCHA_FAILED).unwrap().weight, 0.8);
    assert_eq!(decision.action, Action::Block);
}

#[tokio::test]
async fn test_captcha_timeout_degrades_instead_of_failing() {
    let store = Arc::new(PolicyStore::new(Policy::default()).unwrap());
    let engine = ShieldEngine::new(
        store,
        Arc::new(MemoryQuarantineStore::new(10)),
        Arc::new(crate::logic::events::LogNotifier),
    )
    .with_captcha(Arc::new(Slow))
    .with_captcha_timeout(StdDuration::from_millis(20));

    let ctx = submission("192.0.2.30", "Question about delivery times").with_captcha_token("tok-123");
    let decision = engine.evaluate(ctx).await;
    assert_eq!(decision.action, Action::Allow);
    assert!(decision.degraded.contains(&"captcha".to_string()));
    assert!(decision.trigger(names::CAPTCHA_VERIFIED).is_none());
}

#[tokio::test]
async fn test_token_without_verifier_is_unverified() {
    let (engine, _rx) = engine();
    let ctx = submission("192.0.2.31", "Question about delivery times").with_captcha_token("tok");
    let decision = engine.evaluate(ctx).await;
    assert!(decision.degraded.contains(&"captcha".to_string()));
}

// ============================================================================
// QUARANTINE & FEEDBACK
// ============================================================================

#[tokio::test]
async fn test_quarantine_review_becomes_ham_example() {
    let mut policy = Policy::default();
    policy.custom_rules.push(crypto_rule());
    let (engine, mut rx) = engine_with(policy);

    let decision = engine.evaluate(submission("192.0.2.40", "Set up your crypto wallet with us")).await;
    assert_eq!(decision.action, Action::Quarantine);
    assert_eq!(rx.try_recv().unwrap().event, events::SUBMISSION_QUARANTINED);

    let pending = engine.quarantine().list(Some(ReviewStatus::Pending), 10).unwrap();
    assert_eq!(pending.len(), 1);

    let record = engine.review(pending[0].id, ReviewVerdict::Approve, "alice", Some("customer")).unwrap();
    assert_eq!(record.review_status, ReviewStatus::Approved);
    assert!(engine.review(record.id, ReviewVerdict::Spam, "bob", None).is_err());

    let stats = engine.feedback().stats();
    assert_eq!(stats.ham, 1);
    assert_eq!(stats.classifier_eligible, 1);
}

#[tokio::test]
async fn test_expired_quarantine_becomes_automated_spam() {
    let mut policy = Policy::default();
    policy.custom_rules.push(crypto_rule());
    let (engine, _rx) = engine_with(policy);

    engine.evaluate(submission("192.0.2.41", "crypto wallet airdrop")).await;
    assert_eq!(engine.expire_quarantine(Utc::now()).unwrap(), 0);
    assert_eq!(engine.expire_quarantine(Utc::now() + Duration::days(8)).unwrap(), 1);

    let stats = engine.feedback().stats();
    assert_eq!(stats.spam, 1);
    assert_eq!(stats.classifier_eligible, 0);
    assert_eq!(engine.quarantine().stats().unwrap().expired, 1);
}

#[tokio::test]
async fn test_allowed_telemetry_feeds_baseline_window() {
    let (engine, _rx) = engine();
    let ctx = submission("192.0.2.50", "When does the workshop start?")
        .with_telemetry(json!({"typing_speed_cpm": 210.0, "interaction_delay_secs": 1.4}));
    let decision = engine.evaluate(ctx).await;
    assert_eq!(decision.action, Action::Allow);

    let stats = engine.feedback().stats();
    assert_eq!(stats.ham, 1);
    assert_eq!(stats.with_telemetry, 1);
    assert_eq!(stats.classifier_eligible, 0);
}

#[tokio::test]
async fn test_record_label_after_judging() {
    let (engine, _rx) = engine();
    let decision = engine.evaluate(submission("192.0.2.60", "Is this the right form?")).await;

    let example = engine
        .record_label(decision.submission_id, Label::Ham, LabelSource::UserFeedback, 1.0)
        .unwrap();
    assert_eq!(example.source, LabelSource::UserFeedback);
    assert!(engine.record_label(Uuid::new_v4(), Label::Spam, LabelSource::Manual, 1.0).is_err());
}

#[tokio::test]
async fn test_block_flood_keeps_pending_quarantine() {
    let mut policy = Policy::default();
    policy.custom_rules.push(crypto_rule());
    let store = Arc::new(PolicyStore::new(policy).unwrap());
    let engine = ShieldEngine::new(
        store,
        Arc::new(MemoryQuarantineStore::new(10)),
        Arc::new(crate::logic::events::LogNotifier),
    );

    let held = engine.evaluate(submission("192.0.2.42", "Set up your crypto wallet with us")).await;
    assert_eq!(held.action, Action::Quarantine);
    for i in 0..10 {
        let blocked = engine.evaluate(submission(&format!("198.51.100.{}", i + 1), "hi").with_field("_hp", "x")).await;
        assert_eq!(blocked.action, Action::Block);
    }

    let pending = engine.quarantine().list(Some(ReviewStatus::Pending), 20).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].decision.submission_id, held.submission_id);

    let stats = engine.quarantine().stats().unwrap();
    assert_eq!(stats.total, 10);
    assert_eq!(stats.logged, 9);

    // logged blocks never expire into training examples
    let before = engine.feedback().stats().labels_recorded;
    assert_eq!(engine.expire_quarantine(Utc::now() + Duration::days(8)).unwrap(), 1);
    assert_eq!(engine.feedback().stats().labels_recorded, before + 1);
}

#[tokio::test]
async fn test_evaluate_writes_are_visible_on_return() {
    let dir = tempfile::tempdir().unwrap();
    let learning = Policy::default().learning;
    let writer = crate::logic::dataset::DatasetWriter::from_path(dir.path().to_path_buf()).unwrap();
    let (engine, _rx) = engine();
    let engine = engine.with_feedback(FeedbackLoop::new(&learning).with_dataset(writer));

    let ctx = submission("192.0.2.51", "When does the workshop start?")
        .with_telemetry(json!({"typing_speed_cpm": 210.0}));
    assert_eq!(engine.evaluate(ctx).await.action, Action::Allow);
    engine.evaluate(submission("192.0.2.52", "hi").with_field("_hp", "x")).await;

    let written = crate::logic::dataset::load_examples(dir.path(), 10).unwrap();
    assert_eq!(written.len(), 2);
    assert_eq!(engine.quarantine().list(None, 10).unwrap().len(), 1);
}

#[tokio::test]
async fn test_hard_trigger_skips_soft_signals() {
    let (engine, _rx) = engine();
    engine.install_classifier(trained_model()).unwrap();
    let stats = MetricStats { mean: 200.0, stddev: 40.0, sample_count: 100 };
    engine
        .install_baseline(BehavioralBaseline::new(2, Utc::now()).with_metric(BehaviorMetric::TypingSpeed, stats))
        .unwrap();

    let ctx = submission("192.0.2.80", "exclusive crypto investment opportunity")
        .with_field("_hp", "x")
        .with_telemetry(json!({"typing_speed_cpm": 205.0}));
    let decision = engine.judge(&ctx, CaptchaOutcome::Unverified("provider down".to_string()));

    assert_eq!(decision.action, Action::Block);
    assert!(decision.degraded.is_empty());
    assert!(decision.trigger(names::CLASSIFIER).is_none());
    assert!(decision.trigger(names::BEHAVIORAL).is_none());
}

// ============================================================================
// SNAPSHOTS & POLICY
// ============================================================================

fn trained_model() -> ClassifierModel {
    let mut examples = Vec::new();
    for (text, label) in [
        ("exclusive crypto investment opportunity", Label::Spam),
        ("meeting schedule project update agenda", Label::Ham),
    ] {
        for _ in 0..60 {
            let features = FeatureSet {
                submission_id: Uuid::new_v4(),
                tokens: crate::logic::features::tokenize(text),
                ..Default::default()
            };
            examples.push(TrainingExample::new(features, label, LabelSource::Manual, 1.0, Utc::now()));
        }
    }
    ClassifierModel::train(&examples, 3, Utc::now(), 2)
}

#[tokio::test]
async fn test_installed_snapshots_contribute() {
    let (engine, _rx) = engine();
    engine.install_classifier(trained_model()).unwrap();
    let stats = MetricStats { mean: 200.0, stddev: 40.0, sample_count: 100 };
    engine
        .install_baseline(BehavioralBaseline::new(2, Utc::now()).with_metric(BehaviorMetric::TypingSpeed, stats))
        .unwrap();

    let ctx = submission("192.0.2.70", "exclusive crypto investment opportunity")
        .with_telemetry(json!({"typing_speed_cpm": 205.0}));
    let decision = engine.evaluate(ctx).await;
    assert!(decision.degraded.is_empty());
    assert!(decision.trigger(names::CLASSIFIER).unwrap().weight > 0.4);
    assert!(decision.trigger(names::BEHAVIORAL).is_some());
    assert!(decision.confidence > 0.6);
}

#[test]
fn test_snapshots_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _rx) = engine();
    let engine = engine.with_data_dir(dir.path());
    engine.install_classifier(trained_model()).unwrap();
    engine.install_baseline(BehavioralBaseline::new(5, Utc::now())).unwrap();
    engine.persist_snapshots().unwrap();

    let (restarted, _rx) = engine_with(Policy::default());
    let restarted = restarted.with_data_dir(dir.path());
    restarted.load_snapshots();
    assert_eq!(restarted.classifier().unwrap().version, 3);
    assert_eq!(restarted.baseline().unwrap().version, 5);
}

#[test]
fn test_corrupt_snapshot_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(MODEL_FILE), b"{\"checksum\":\"00\",\"payload\":\"{}\"}").unwrap();

    let (engine, _rx) = engine();
    let engine = engine.with_data_dir(dir.path());
    engine.load_snapshots();
    assert!(engine.classifier().is_none());
}

#[test]
fn test_invalid_reload_keeps_active_policy() {
    let (engine, _rx) = engine();
    let mut bad = Policy::default();
    bad.thresholds.block = 0.2;

    let err = engine.reload_policy(bad).unwrap_err();
    assert_eq!(err.kind(), "config");
    assert_eq!(engine.stats().policy_version, 1);

    assert_eq!(engine.reload_policy(Policy::strict()).unwrap(), 2);
}

#[tokio::test]
async fn test_concurrent_evaluations() {
    let (engine, _rx) = engine();
    let engine = Arc::new(engine);

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let ip = format!("10.0.0.{}", i % 4);
                engine.evaluate(submission(&ip, "Hello, a quick question about shipping")).await
            })
        })
        .collect();

    for handle in handles {
        let decision = handle.await.unwrap();
        assert!((0.0..=1.0).contains(&decision.score));
        assert!((0.0..=1.0).contains(&decision.confidence));
    }
    assert_eq!(engine.stats().evaluated, 16);
    assert_eq!(engine.reputation().len(), 4);
}
