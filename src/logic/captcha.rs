//! CAPTCHA Verification
//!
//! The only blocking external call on the judging path. The verifier runs on
//! the blocking pool under a timeout; a timeout or verifier error leaves the
//! submission "unverified" and never fails the request.

use std::sync::Arc;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::logic::error::{ShieldError, ShieldResult};
use crate::logic::policy::config::CaptchaPolicy;
use crate::logic::rules::{names, Trigger, TriggerKind};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptchaVerdict {
    pub passed: bool,
    /// Provider trust in [0,1] (e.g. a risk-score CAPTCHA), 1.0 if binary
    pub trust_score: f64,
}

/// External CAPTCHA provider
pub trait CaptchaVerifier: Send + Sync {
    fn verify(&self, token: &str, ip: &str) -> ShieldResult<CaptchaVerdict>;
}

// ============================================================================
// OUTCOME
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CaptchaOutcome {
    /// No token supplied, or the CAPTCHA detector is off
    NotPresented,
    Verified { trust: f64 },
    Failed { trust: f64 },
    /// Timeout, verifier error, or no verifier configured
    Unverified(String),
}

impl CaptchaOutcome {
    pub fn from_verdict(verdict: CaptchaVerdict, policy: &CaptchaPolicy) -> Self {
        let trust = verdict.trust_score.clamp(0.0, 1.0);
        if verdict.passed && trust >= policy.min_trust {
            CaptchaOutcome::Verified { trust }
        } else {
            CaptchaOutcome::Failed { trust }
        }
    }

    pub fn to_trigger(&self, policy: &CaptchaPolicy) -> Option<Trigger> {
        let trigger = match self {
            CaptchaOutcome::Verified { trust } => Trigger::soft(
                names::CAPTCHA_VERIFIED,
                -(policy.verified_credit * trust),
                format!("token verified (trust {:.2})", trust),
            ),
            CaptchaOutcome::Failed { trust } => Trigger::soft(
                names::CAPTCHA_FAILED,
                policy.failed_weight,
                format!("token rejected (trust {:.2})", trust),
            ),
            CaptchaOutcome::NotPresented | CaptchaOutcome::Unverified(_) => return None,
        };
        Some(trigger.with_kind(TriggerKind::Captcha))
    }

    pub fn is_unverified(&self) -> bool {
        matches!(self, CaptchaOutcome::Unverified(_))
    }
}

// ============================================================================
// VERIFICATION WITH TIMEOUT
// ============================================================================

/// Run the verifier on the blocking pool, giving up after `timeout`
pub async fn verify_with_timeout(
    verifier: Arc<dyn CaptchaVerifier>,
    token: String,
    ip: String,
    timeout: Duration,
) -> ShieldResult<CaptchaVerdict> {
    let task = tokio::task::spawn_blocking(move || verifier.verify(&token, &ip));
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(ShieldError::DependencyUnavailable(format!("captcha verifier panicked: {}", join))),
        Err(_) => Err(ShieldError::DependencyUnavailable(format!(
            "captcha verifier timed out after {} ms",
            timeout.as_millis()
        ))),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(CaptchaVerdict);

    impl CaptchaVerifier for Fixed {
        fn verify(&self, _token: &str, _ip: &str) -> ShieldResult<CaptchaVerdict> {
            Ok(self.0)
        }
    }

    struct Slow;

    impl CaptchaVerifier for Slow {
        fn verify(&self, _token: &str, _ip: &str) -> ShieldResult<CaptchaVerdict> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(CaptchaVerdict { passed: true, trust_score: 1.0 })
        }
    }

    #[test]
    fn test_outcome_triggers() {
        let policy = CaptchaPolicy::default();

        let verified = CaptchaOutcome::from_verdict(CaptchaVerdict { passed: true, trust_score: 0.9 }, &policy);
        let t = verified.to_trigger(&policy).unwrap();
        assert_eq!(t.name, names::CAPTCHA_VERIFIED);
        assert!((t.weight + 0.18).abs() < 1e-9);
        assert_eq!(t.kind, TriggerKind::Captcha);

        // passed but below the trust floor counts as failed
        let low = CaptchaOutcome::from_verdict(CaptchaVerdict { passed: true, trust_score: 0.2 }, &policy);
        assert_eq!(low.to_trigger(&policy).unwrap().name, names::CAPTCHA_FAILED);
        assert_eq!(low.to_trigger(&policy).unwrap().weight, 0.8);

        assert!(CaptchaOutcome::NotPresented.to_trigger(&policy).is_none());
        assert!(CaptchaOutcome::Unverified("timeout".into()).to_trigger(&policy).is_none());
    }

    #[tokio::test]
    async fn test_verify_within_timeout() {
        let verifier: Arc<dyn CaptchaVerifier> = Arc::new(Fixed(CaptchaVerdict { passed: true, trust_score: 1.0 }));
        let verdict = verify_with_timeout(verifier, "tok".into(), "192.0.2.1".into(), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(verdict.passed);
    }

    #[tokio::test]
    async fn test_slow_verifier_times_out() {
        let verifier: Arc<dyn CaptchaVerifier> = Arc::new(Slow);
        let result = verify_with_timeout(verifier, "tok".into(), "192.0.2.1".into(), Duration::from_millis(20)).await;
        assert!(matches!(result, Err(ShieldError::DependencyUnavailable(_))));
    }
}
