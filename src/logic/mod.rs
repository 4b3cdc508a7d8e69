//! Logic Module - Decision Engines
//!
//! ## Structure
//! - `features/` - Submission normalizer (raw context → `FeatureSet`)
//! - `rules/` - Stateless rule triggers
//! - `reputation/` - Rolling per-IP risk
//! - `baseline/` - Behavioral analysis against learned baselines
//! - `model/` - Naive Bayes spam classifier
//! - `policy/` - Configuration, validation, final decision
//! - `quarantine/`, `feedback/`, `dataset/` - Review and learning loop
//! - `engine/` - Per-submission orchestration

// Core
pub mod error;
pub mod snapshot;
pub mod events;
pub mod captcha;

// Detectors
pub mod features;
pub mod rules;
pub mod reputation;
pub mod baseline;
pub mod model;

// Decision & learning
pub mod policy;
pub mod quarantine;
pub mod feedback;
pub mod dataset;
pub mod engine;
pub mod maintenance;
