//! Shield Error Taxonomy
//!
//! One error type for the whole engine. Detector failures are absorbed and
//! logged by the engine; only configuration, storage and label APIs hand
//! these back to their callers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShieldError {
    /// Malformed or missing telemetry/fields. The signal is dropped, scoring continues.
    #[error("input error: {0}")]
    Input(String),

    /// Model snapshot not loaded, CAPTCHA verifier timed out, etc.
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// Malformed policy or rule. The reload is rejected as a whole.
    #[error("config error: {0}")]
    Config(String),

    /// A hard rule fired. Always authoritative.
    #[error("hard trigger: {0}")]
    HardTrigger(String),

    /// Persisted snapshot failed validation (layout, checksum, stats)
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl ShieldError {
    pub fn kind(&self) -> &'static str {
        match self {
            ShieldError::Input(_) => "input",
            ShieldError::DependencyUnavailable(_) => "dependency_unavailable",
            ShieldError::Config(_) => "config",
            ShieldError::HardTrigger(_) => "hard_trigger",
            ShieldError::InvalidSnapshot(_) => "invalid_snapshot",
            ShieldError::Storage(_) => "storage",
            ShieldError::Database(_) => "database",
            ShieldError::Serialization(_) => "serialization",
            ShieldError::Watch(_) => "watch",
        }
    }
}

pub type ShieldResult<T> = Result<T, ShieldError>;
