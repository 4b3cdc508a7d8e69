//! Rules Module - stateless trigger evaluation
//!
//! ## Structure
//! - `types`: Trigger, TriggerKind, Severity, trigger names
//! - `matchers`: CIDR ranges, domain and phrase matching
//! - `engine`: built-in rules + operator regex rules

pub mod types;
pub mod matchers;
pub mod engine;

#[cfg(test)]
mod tests;

pub use types::{names, Severity, Trigger, TriggerKind};
pub use engine::{ensure_no_hard_trigger, evaluate};
