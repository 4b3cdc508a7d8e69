//! Submission Shield - abuse/spam decision engine for form submissions
//!
//! Combines rule triggers, IP reputation, behavioral analysis and a
//! Naive Bayes classifier into one deterministic decision per submission.

pub mod constants;
pub mod logic;

pub use logic::captcha::{CaptchaVerdict, CaptchaVerifier};
pub use logic::engine::{EngineStats, ShieldEngine};
pub use logic::error::{ShieldError, ShieldResult};
pub use logic::events::{ChannelNotifier, DecisionEvent, LogNotifier, Notifier};
pub use logic::features::SubmissionContext;
pub use logic::feedback::{Label, LabelSource};
pub use logic::policy::{Action, DecisionResult, Policy, PolicyStore};
pub use logic::quarantine::{QuarantineStore, ReviewVerdict};
