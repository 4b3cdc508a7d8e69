//! Reputation Module - rolling per-IP trust state
//!
//! - `types`: record, tier ladder, observations
//! - `tracker`: sharded Get/Update store with honeypot flagging and TTL sweep

pub mod types;
pub mod tracker;

pub use types::{IpReputationRecord, Observation, Outcome, ReputationStats, ReputationTier, SubmissionMark};
pub use tracker::IpReputationTracker;
