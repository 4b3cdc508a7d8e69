//! Model Module - Spam Classifier
//!
//! Token-based Naive Bayes estimator trained from labeled examples.
//! Scoring always reads one immutable snapshot; see `snapshot::SnapshotCell`.

pub mod tokens;
pub mod classifier;
pub mod storage;

// Re-export common types
pub use classifier::{ClassifierModel, ClassifierScore, TokenLikelihood};
pub use storage::{load_model, save_model, MODEL_FILE};
pub use tokens::feature_tokens;
