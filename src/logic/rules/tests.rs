//! Rule engine tests

use chrono::{Duration, Utc};
use serde_json::json;

use super::*;
use crate::logic::features::{normalize, SubmissionContext};
use crate::logic::policy::config::{CustomRule, Policy};
use crate::logic::policy::validate::CompiledPolicy;
use crate::logic::reputation::{IpReputationRecord, SubmissionMark};

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Firefox/128.0";

fn compiled(policy: Policy) -> CompiledPolicy {
    CompiledPolicy::compile(policy).unwrap()
}

fn run(ctx: &SubmissionContext, policy: &CompiledPolicy) -> Vec<Trigger> {
    let features = normalize(ctx, &policy.normalize);
    let record = IpReputationRecord::new(&features.ip, 0.3, Utc::now());
    evaluate(&features, &record, policy)
}

fn names_of(triggers: &[Trigger]) -> Vec<&str> {
    triggers.iter().map(|t| t.name.as_str()).collect()
}

fn clean_ctx() -> SubmissionContext {
    SubmissionContext::new("203.0.113.20")
        .with_endpoint("/contact")
        .with_field("name", "Dana")
        .with_field("message", "Could you send me pricing for the annual plan?")
        .with_user_agent(BROWSER_UA)
}

#[test]
fn test_clean_submission_has_no_triggers() {
    let policy = compiled(Policy::default());
    assert!(run(&clean_ctx(), &policy).is_empty());
}

#[test]
fn test_honeypot_is_hard() {
    let policy = compiled(Policy::default());
    let triggers = run(&clean_ctx().with_field("_hp", "x"), &policy);

    let hp = triggers.iter().find(|t| t.name == names::HONEYPOT).unwrap();
    assert!(hp.hard);
    assert_eq!(hp.field.as_deref(), Some("_hp"));
    assert!(ensure_no_hard_trigger(&triggers).is_err());
}

#[test]
fn test_blacklist_and_whitelist() {
    let mut policy = Policy::default();
    policy.ip_lists.blacklist = vec!["203.0.113.0/24".to_string()];
    let triggers = run(&clean_ctx(), &compiled(policy.clone()));
    assert!(names_of(&triggers).contains(&names::IP_BLACKLIST));

    // whitelist suppresses IP-derived rules, honeypot still applies
    policy.ip_lists.whitelist = vec!["203.0.113.20".to_string()];
    let triggers = run(&clean_ctx().with_field("_hp", "1"), &compiled(policy));
    assert_eq!(names_of(&triggers), vec![names::HONEYPOT]);
}

#[test]
fn test_flagged_ip_is_hard() {
    let policy = compiled(Policy::default());
    let features = normalize(&clean_ctx(), &policy.normalize);
    let mut record = IpReputationRecord::new(&features.ip, 0.3, Utc::now());
    record.flag();

    let triggers = evaluate(&features, &record, &policy);
    assert!(triggers.iter().any(|t| t.name == names::FLAGGED_IP && t.hard));
}

#[test]
fn test_url_count_rule_weight() {
    let policy = compiled(Policy::default());
    let links = (0..10).map(|i| format!("https://site{}.example.com", i)).collect::<Vec<_>>().join(" ");
    let triggers = run(&clean_ctx().with_field("message", &links), &policy);

    let t = triggers.iter().find(|t| t.name == names::MAX_URL_COUNT).unwrap();
    assert!(!t.hard);
    assert_eq!(t.weight, 0.4);
}

#[test]
fn test_keywords_domains_caps_patterns() {
    let policy = compiled(Policy::default());
    let ctx = clean_ctx().with_field(
        "message",
        "CLICK HERE TO WIN THE CASINO JACKPOT!!! EMAIL PROMO@MAIL.SPAM.COM FOR FREE MONEY",
    );
    let triggers = run(&ctx, &policy);
    let found = names_of(&triggers);

    assert!(found.contains(&names::BLOCKED_KEYWORD));
    assert!(found.contains(&names::BLOCKED_DOMAIN));
    assert!(found.contains(&names::EXCESSIVE_CAPS));
    assert!(found.contains(&names::SUSPICIOUS_PATTERNS));
    assert!(triggers.iter().all(|t| !t.hard));

    let patterns = triggers.iter().find(|t| t.name == names::SUSPICIOUS_PATTERNS).unwrap();
    assert!(patterns.weight <= Policy::default().rule_weights.suspicious_patterns_cap);
}

#[test]
fn test_content_rules_can_be_disabled() {
    let mut policy = Policy::default();
    policy.detectors.content_rules = false;
    let triggers = run(&clean_ctx().with_field("message", "casino casino"), &compiled(policy));
    assert!(triggers.is_empty());
}

#[test]
fn test_rate_limit_window() {
    let policy = compiled(Policy::default());
    let now = Utc::now();
    let ctx = clean_ctx().at(now);
    let features = normalize(&ctx, &policy.normalize);

    let mut record = IpReputationRecord::new(&features.ip, 0.3, now);
    for i in 0..5 {
        record.recent.push_back(SubmissionMark { at: now - Duration::minutes(i), endpoint: "/contact".into() });
    }
    let triggers = evaluate(&features, &record, &policy);
    assert!(names_of(&triggers).contains(&names::RATE_LIMIT));

    // same count but outside the 10 minute /contact window
    let mut old = IpReputationRecord::new(&features.ip, 0.3, now);
    for i in 0..5 {
        old.recent.push_back(SubmissionMark { at: now - Duration::minutes(20 + i), endpoint: "/contact".into() });
    }
    assert!(!names_of(&evaluate(&features, &old, &policy)).contains(&names::RATE_LIMIT));
}

#[test]
fn test_bot_user_agents() {
    let policy = compiled(Policy::default());

    let mut ctx = clean_ctx();
    ctx.user_agent = Some("python-requests/2.31".to_string());
    assert!(names_of(&run(&ctx, &policy)).contains(&names::BOT_USER_AGENT));

    ctx.user_agent = Some("x".to_string());
    assert!(names_of(&run(&ctx, &policy)).contains(&names::BOT_USER_AGENT));

    ctx.user_agent = None;
    assert!(names_of(&run(&ctx, &policy)).contains(&names::BOT_USER_AGENT));
}

#[test]
fn test_typing_rules() {
    let policy = compiled(Policy::default());
    let ctx = clean_ctx().with_telemetry(json!({
        "typing_duration_secs": 0.4,
        "typing_speed_cpm": 4000,
        "interaction_delay_secs": 0.01
    }));
    let found = run(&ctx, &policy);
    let found = names_of(&found);
    assert!(found.contains(&names::TYPING_TOO_FAST));
    assert!(found.contains(&names::TYPING_SPEED_INHUMAN));
    assert!(found.contains(&names::NO_INTERACTION_DELAY));
}

#[test]
fn test_pointer_and_paste_rules() {
    let policy = compiled(Policy::default());

    // 300 cpm for 20 s is about 100 typed characters
    let ctx = clean_ctx().with_telemetry(json!({
        "typing_duration_secs": 20.0,
        "typing_speed_cpm": 300,
        "pointer_moves": 0,
        "paste_count": 1
    }));
    let found = run(&ctx, &policy);
    let pointer = found.iter().find(|t| t.name == names::NO_MOUSE_MOVEMENT).unwrap();
    assert_eq!(pointer.weight, 0.5);
    assert!(!names_of(&found).contains(&names::EXCESSIVE_COPY_PASTE));

    // two pastes for two typed characters
    let ctx = clean_ctx().with_telemetry(json!({
        "typing_duration_secs": 4.0,
        "typing_speed_cpm": 30,
        "pointer_moves": 14,
        "paste_count": 2
    }));
    let found = run(&ctx, &policy);
    let paste = found.iter().find(|t| t.name == names::EXCESSIVE_COPY_PASTE).unwrap();
    assert_eq!(paste.weight, 0.4);
    assert!(!names_of(&found).contains(&names::NO_MOUSE_MOVEMENT));

    // no pointer data at all is not evidence of a bot
    let ctx = clean_ctx().with_telemetry(json!({"typing_duration_secs": 20.0, "typing_speed_cpm": 300}));
    assert!(run(&ctx, &policy).is_empty());
}

#[test]
fn test_custom_rules_field_targeting() {
    let mut policy = Policy::default();
    policy.custom_rules = vec![
        CustomRule {
            id: "crypto".into(),
            name: "Crypto pitch".into(),
            description: String::new(),
            pattern: r"(?i)bitcoin|crypto".into(),
            field: "message".into(),
            weight: 0.35,
            hard: false,
            enabled: true,
        },
        CustomRule {
            id: "bad-name".into(),
            name: "Link in name".into(),
            description: String::new(),
            pattern: r"https?://".into(),
            field: "name".into(),
            weight: 1.0,
            hard: true,
            enabled: true,
        },
    ];
    let policy = compiled(policy);

    let triggers = run(&clean_ctx().with_field("message", "Invest in Bitcoin today"), &policy);
    let crypto = triggers.iter().find(|t| t.name == "crypto").unwrap();
    assert_eq!(crypto.kind, TriggerKind::Custom);
    assert_eq!(crypto.field.as_deref(), Some("message"));
    assert_eq!(crypto.weight, 0.35);

    // pattern only checked against its target field
    let triggers = run(&clean_ctx().with_field("message", "see http://x.org"), &policy);
    assert!(!triggers.iter().any(|t| t.name == "bad-name"));

    let triggers = run(&clean_ctx().with_field("name", "http://x.org"), &policy);
    assert!(triggers.iter().any(|t| t.name == "bad-name" && t.hard));
}

#[test]
fn test_evaluation_is_deterministic() {
    let policy = compiled(Policy::default());
    let ctx = clean_ctx().with_field("message", "URGENT casino offer www.spam.com");
    assert_eq!(run(&ctx, &policy), run(&ctx, &policy));
}
