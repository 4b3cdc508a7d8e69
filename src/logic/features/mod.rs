//! Features Module - Submission Normalizer
//!
//! Turns a raw submission + request metadata into the typed `FeatureSet`
//! shared by the rule engine, behavioral analyzer and classifier.

pub mod layout;
pub mod normalize;
pub mod patterns;
pub mod types;


pub use layout::{BehaviorMetric, METRIC_COUNT};
pub use normalize::{normalize, tokenize, NormalizeOptions, DEFAULT_HONEYPOT_FIELDS};
pub use types::{FeatureSet, SubmissionContext, Telemetry};
