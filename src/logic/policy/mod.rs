//! Policy Module
//!
//! Configuration and the decision that consumes it. The numeric
//! aggregation lives here; every detector only produces inputs for it.
//!
//! ## Structure
//! - `config`: Policy and its sections (thresholds, weights, rules, learning)
//! - `validate`: range checks + compilation into `CompiledPolicy`
//! - `store`: active policy, hot reload, file watcher
//! - `types`: Action, DecisionResult
//! - `engine`: `decide`
//!
//! ## Usage
//! ```ignore
//! let store = PolicyStore::new(Policy::default())?;
//! let policy = store.current();
//! let result = decide(&features, &ip, &triggers, &behavior, score.as_ref(), &policy.policy);
//! match result.action {
//!     Action::Allow => accept(),
//!     Action::Challenge => ask_for_captcha(),
//!     Action::Quarantine => hold_for_review(),
//!     Action::Block => reject(),
//! }
//! ```

pub mod types;
pub mod config;
pub mod validate;
pub mod store;
pub mod engine;

// Re-export main types for convenience
pub use types::{Action, DecisionResult};

pub use config::Policy;
pub use validate::CompiledPolicy;
pub use store::{load_policy_file, PolicyStore};

pub use engine::{decide, threshold_action};
