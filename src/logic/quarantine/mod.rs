//! Quarantine Module - held submissions pending review
//!
//! Flow:
//! 1. Decision = quarantine (or block, when logging blocks) → record stored as pending
//! 2. Reviewer verdict → approved/rejected, becomes a manual training example
//! 3. Nobody reviewed before `expires_at` → expired, becomes an automated spam example
//!
//! Two stores implement `QuarantineStore`: a bounded in-memory queue and SQLite.

pub mod types;
pub mod memory;
pub mod sqlite;

pub use types::{QuarantineRecord, QuarantineStats, QuarantineStore, ReviewStatus, ReviewVerdict};
pub use memory::MemoryQuarantineStore;
pub use sqlite::SqliteQuarantineStore;
